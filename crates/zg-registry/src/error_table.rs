//! Dynamic error table.
//!
//! Two-level lookup built from a metadata snapshot:
//! subsystem index -> error type id -> error index -> entry.
//!
//! The table is immutable once built. A node upgrade that changes the
//! schema is not observed until a fresh client is bootstrapped.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};
use zg_core::ModuleError;
use zg_ws::Transport;

use crate::error::{RegistryError, RegistryResult};
use crate::metadata::{
    PalletsSection, TypesSection, METADATA_METHOD, PALLETS_SECTION, TYPES_SECTION,
};

/// Human-readable error variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorEntry {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone)]
struct PalletRef {
    name: String,
    error_type: Option<u32>,
}

/// Error vocabulary of one node, as of `fetched_at`.
#[derive(Debug, Clone)]
pub struct ErrorTable {
    version: u32,
    /// Subsystem index -> pallet name and error type id.
    pallets: HashMap<u32, PalletRef>,
    /// Error type id -> variants in declaration order.
    error_types: HashMap<u32, Vec<ErrorEntry>>,
    fetched_at: DateTime<Utc>,
}

impl ErrorTable {
    /// Query the node's metadata and build the table.
    ///
    /// Issues two sequential requests (pallets, then types).
    pub async fn populate(transport: &dyn Transport) -> RegistryResult<Self> {
        debug!("Fetching pallet metadata");
        let pallets = transport
            .request(METADATA_METHOD, json!([PALLETS_SECTION]))
            .await?;
        let pallets: PalletsSection = serde_json::from_value(pallets)
            .map_err(|e| RegistryError::Parse(format!("pallets section: {e}")))?;

        debug!("Fetching type registry");
        let types = transport
            .request(METADATA_METHOD, json!([TYPES_SECTION]))
            .await?;
        let types: TypesSection = serde_json::from_value(types)
            .map_err(|e| RegistryError::Parse(format!("types section: {e}")))?;

        let table = Self::from_sections(pallets, types)?;
        info!(
            version = table.version,
            pallets = table.pallet_count(),
            entries = table.len(),
            "Error table populated"
        );
        Ok(table)
    }

    /// Build the table from already-fetched sections.
    pub fn from_sections(pallets: PalletsSection, types: TypesSection) -> RegistryResult<Self> {
        if pallets.version != types.version {
            return Err(RegistryError::VersionMismatch {
                pallets: pallets.version,
                types: types.version,
            });
        }

        let error_types: HashMap<u32, Vec<ErrorEntry>> = types
            .types
            .into_iter()
            .filter(|ty| ty.is_error_set())
            .map(|ty| {
                let entries = ty
                    .variants
                    .iter()
                    .map(|variant| ErrorEntry {
                        name: variant.name.clone(),
                        description: variant.description(),
                    })
                    .collect();
                (ty.id, entries)
            })
            .collect();

        let mut pallet_map = HashMap::with_capacity(pallets.pallets.len());
        for pallet in pallets.pallets {
            if let Some(type_id) = pallet.error {
                if !error_types.contains_key(&type_id) {
                    warn!(
                        pallet = %pallet.name,
                        type_id,
                        "Pallet error type is not an error variant set"
                    );
                }
            }
            pallet_map.insert(
                pallet.index,
                PalletRef {
                    name: pallet.name,
                    error_type: pallet.error,
                },
            );
        }

        Ok(Self {
            version: pallets.version,
            pallets: pallet_map,
            error_types,
            fetched_at: Utc::now(),
        })
    }

    /// Look up an error. Unknown subsystem and unknown error index both
    /// return `None`.
    pub fn get_entry(&self, subsystem: u32, error: u32) -> Option<&ErrorEntry> {
        let type_id = self.pallets.get(&subsystem)?.error_type?;
        self.error_types
            .get(&type_id)?
            .get(usize::try_from(error).ok()?)
    }

    /// Decode a node-reported module error, falling back to raw indices.
    pub fn decode(&self, error: ModuleError) -> DecodedError {
        match self.get_entry(error.pallet_index, error.error_index) {
            Some(entry) => DecodedError::Known {
                pallet: self.pallet_name(error.pallet_index).map(str::to_string),
                entry: entry.clone(),
                raw: error,
            },
            None => DecodedError::Raw(error),
        }
    }

    /// Name of a subsystem.
    pub fn pallet_name(&self, subsystem: u32) -> Option<&str> {
        self.pallets.get(&subsystem).map(|p| p.name.as_str())
    }

    /// Index of a subsystem by name (case-insensitive).
    pub fn pallet_index(&self, name: &str) -> Option<u32> {
        self.pallets
            .iter()
            .find(|(_, p)| p.name.eq_ignore_ascii_case(name))
            .map(|(index, _)| *index)
    }

    /// Metadata version of the snapshot.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// When the snapshot was taken.
    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    pub fn pallet_count(&self) -> usize {
        self.pallets.len()
    }

    /// Total number of resolvable error entries.
    pub fn len(&self) -> usize {
        self.pallets
            .values()
            .filter_map(|p| p.error_type)
            .filter_map(|id| self.error_types.get(&id))
            .map(Vec::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A module error after Error Table lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecodedError {
    /// Found in the table.
    Known {
        pallet: Option<String>,
        entry: ErrorEntry,
        raw: ModuleError,
    },
    /// Not in the table; raw indices only.
    Raw(ModuleError),
}

impl DecodedError {
    /// The raw indices, always available.
    pub fn module_error(&self) -> ModuleError {
        match self {
            Self::Known { raw, .. } => *raw,
            Self::Raw(raw) => *raw,
        }
    }

    pub fn entry(&self) -> Option<&ErrorEntry> {
        match self {
            Self::Known { entry, .. } => Some(entry),
            Self::Raw(_) => None,
        }
    }
}

impl std::fmt::Display for DecodedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Known {
                pallet: Some(pallet),
                entry,
                ..
            } => write!(f, "{pallet}.{}: {}", entry.name, entry.description),
            Self::Known {
                pallet: None,
                entry,
                ..
            } => write!(f, "{}: {}", entry.name, entry.description),
            Self::Raw(raw) => write!(f, "{raw}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{PalletMetadata, TypeMetadata, VariantMetadata};
    use zg_ws::{MockTransport, WsError};

    fn pallets(version: u32) -> PalletsSection {
        PalletsSection {
            version,
            pallets: vec![
                PalletMetadata {
                    name: "System".into(),
                    index: 0,
                    error: Some(10),
                },
                PalletMetadata {
                    name: "PredictionMarkets".into(),
                    index: 57,
                    error: Some(20),
                },
                PalletMetadata {
                    name: "Timestamp".into(),
                    index: 3,
                    error: None,
                },
                PalletMetadata {
                    name: "Broken".into(),
                    index: 8,
                    error: Some(30),
                },
            ],
        }
    }

    fn variant(name: &str, docs: &[&str]) -> VariantMetadata {
        VariantMetadata {
            name: name.into(),
            docs: docs.iter().map(|d| d.to_string()).collect(),
        }
    }

    fn types(version: u32) -> TypesSection {
        TypesSection {
            version,
            types: vec![
                TypeMetadata {
                    id: 10,
                    path: vec!["frame_system".into(), "pallet".into(), "Error".into()],
                    variants: vec![
                        variant("InvalidSpecName", &["The name of specification does not match."]),
                        variant("NonDefaultComposite", &[]),
                    ],
                },
                TypeMetadata {
                    id: 20,
                    path: vec!["zrml_prediction_markets".into(), "pallet".into(), "Error".into()],
                    variants: vec![
                        variant("MarketIsNotActive", &["Market is not active."]),
                        variant("NotEnoughBalance", &["Sender does not have enough", "balance."]),
                    ],
                },
                TypeMetadata {
                    id: 30,
                    path: vec!["broken".into(), "pallet".into(), "Call".into()],
                    variants: vec![variant("DoThing", &[])],
                },
            ],
        }
    }

    fn table() -> ErrorTable {
        ErrorTable::from_sections(pallets(14), types(14)).unwrap()
    }

    #[test]
    fn test_get_entry_by_variant_position() {
        let table = table();
        let entry = table.get_entry(57, 1).unwrap();
        assert_eq!(entry.name, "NotEnoughBalance");
        assert_eq!(entry.description, "Sender does not have enough balance.");
        assert_eq!(table.get_entry(0, 0).unwrap().name, "InvalidSpecName");
        assert_eq!(table.get_entry(0, 1).unwrap().description, "");
    }

    #[test]
    fn test_unknown_indices_not_found() {
        let table = table();
        assert!(table.get_entry(99, 0).is_none());
        assert!(table.get_entry(57, 2).is_none());
        assert!(table.get_entry(3, 0).is_none());
        // Referenced type is not an error set.
        assert!(table.get_entry(8, 0).is_none());
    }

    #[test]
    fn test_lookup_is_stable() {
        let table = table();
        let first = table.get_entry(57, 0).cloned();
        for _ in 0..10 {
            assert_eq!(table.get_entry(57, 0).cloned(), first);
            assert!(table.get_entry(99, 0).is_none());
        }
        assert_eq!(table.len(), 4);
        assert_eq!(table.pallet_count(), 4);
        assert_eq!(table.pallet_index("predictionmarkets"), Some(57));
    }

    #[test]
    fn test_version_mismatch() {
        let result = ErrorTable::from_sections(pallets(14), types(15));
        assert!(matches!(
            result,
            Err(RegistryError::VersionMismatch {
                pallets: 14,
                types: 15
            })
        ));
    }

    #[test]
    fn test_decode_known_and_raw() {
        let table = table();

        let known = table.decode(ModuleError::new(57, 0));
        assert_eq!(known.entry().unwrap().name, "MarketIsNotActive");
        assert_eq!(
            known.to_string(),
            "PredictionMarkets.MarketIsNotActive: Market is not active."
        );

        let raw = table.decode(ModuleError::new(99, 0));
        assert_eq!(raw, DecodedError::Raw(ModuleError::new(99, 0)));
        assert_eq!(raw.module_error(), ModuleError::new(99, 0));
        assert!(raw.entry().is_none());
    }

    #[tokio::test]
    async fn test_populate_issues_two_sequential_queries() {
        let mock = MockTransport::new();
        mock.push_response(
            "state_getMetadata",
            Ok(serde_json::to_value(pallets(14)).unwrap()),
        );
        mock.push_response(
            "state_getMetadata",
            Ok(serde_json::to_value(types(14)).unwrap()),
        );

        let table = ErrorTable::populate(&mock).await.unwrap();
        assert_eq!(table.version(), 14);
        assert_eq!(table.get_entry(57, 0).unwrap().name, "MarketIsNotActive");

        let params = mock.requests_for("state_getMetadata");
        assert_eq!(params, vec![json!(["pallets"]), json!(["types"])]);
    }

    #[tokio::test]
    async fn test_populate_propagates_transport_errors() {
        let mock = MockTransport::new();
        let result = ErrorTable::populate(&mock).await;
        assert!(matches!(
            result,
            Err(RegistryError::Transport(WsError::Rpc(_)))
        ));

        mock.set_response("state_getMetadata", json!({"version": "x"}));
        let result = ErrorTable::populate(&mock).await;
        assert!(matches!(result, Err(RegistryError::Parse(_))));
    }
}
