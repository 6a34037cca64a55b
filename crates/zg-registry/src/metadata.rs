//! Wire types for the `state_getMetadata` sections.

use serde::{Deserialize, Serialize};

/// Metadata method name.
pub const METADATA_METHOD: &str = "state_getMetadata";
/// Section selector for the pallet list.
pub const PALLETS_SECTION: &str = "pallets";
/// Section selector for the type registry.
pub const TYPES_SECTION: &str = "types";

/// `state_getMetadata ["pallets"]` response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PalletsSection {
    pub version: u32,
    pub pallets: Vec<PalletMetadata>,
}

/// One pallet (subsystem) declaration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PalletMetadata {
    pub name: String,
    pub index: u32,
    /// Type id of the pallet's error enumeration, if it declares one.
    #[serde(default)]
    pub error: Option<u32>,
}

/// `state_getMetadata ["types"]` response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TypesSection {
    pub version: u32,
    pub types: Vec<TypeMetadata>,
}

/// One entry of the type registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TypeMetadata {
    pub id: u32,
    #[serde(default)]
    pub path: Vec<String>,
    #[serde(default)]
    pub variants: Vec<VariantMetadata>,
}

impl TypeMetadata {
    /// Whether this type is an error variant set (`path` ends in `Error`).
    pub fn is_error_set(&self) -> bool {
        self.path.last().is_some_and(|segment| segment == "Error")
    }
}

/// One enum variant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VariantMetadata {
    pub name: String,
    #[serde(default)]
    pub docs: Vec<String>,
}

impl VariantMetadata {
    /// Docs joined into a single line.
    pub fn description(&self) -> String {
        self.docs
            .iter()
            .map(|line| line.trim())
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}
