//! Chain specification documents for the embedded light-client scheme.
//!
//! A `light://<chain>` address needs a chain specification (bootnodes and
//! genesis) before any session can start. The embedded client itself is
//! supplied by the embedder through [`LightClientFactory`].

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ResolveError, WsResult};
use crate::transport::PendingSession;

/// Chain specification document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChainSpec {
    pub name: String,
    pub id: String,
    #[serde(default)]
    pub chain_type: Option<String>,
    #[serde(default)]
    pub boot_nodes: Vec<String>,
    #[serde(default)]
    pub genesis: Value,
}

impl ChainSpec {
    /// Parse and validate a chain spec from JSON text.
    pub fn from_json(text: &str) -> Result<Self, ResolveError> {
        let spec: Self = serde_json::from_str(text)
            .map_err(|e| ResolveError::ChainSpec(format!("invalid chain spec JSON: {e}")))?;
        spec.validate()?;
        Ok(spec)
    }

    /// Load a chain spec from a file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ResolveError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            ResolveError::ChainSpec(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_json(&text)
    }

    fn validate(&self) -> Result<(), ResolveError> {
        if self.name.trim().is_empty() || self.id.trim().is_empty() {
            return Err(ResolveError::ChainSpec(
                "chain spec requires non-empty name and id".to_string(),
            ));
        }
        if self.boot_nodes.is_empty() {
            return Err(ResolveError::ChainSpec(format!(
                "chain spec {} has no bootNodes",
                self.id
            )));
        }
        Ok(())
    }

    /// Whether this spec describes the chain named by an address host.
    pub fn matches(&self, chain: &str) -> bool {
        self.id.eq_ignore_ascii_case(chain) || self.name.eq_ignore_ascii_case(chain)
    }
}

/// Starts an embedded light-client session from a chain spec.
pub trait LightClientFactory: Send + Sync {
    fn start(&self, spec: ChainSpec) -> WsResult<PendingSession>;
}
