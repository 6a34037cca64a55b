//! Registry error types.

use thiserror::Error;
use zg_ws::WsError;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Metadata query failed: {0}")]
    Transport(#[from] WsError),

    #[error("Metadata parse error: {0}")]
    Parse(String),

    #[error("Metadata version mismatch: pallets={pallets}, types={types}")]
    VersionMismatch { pallets: u32, types: u32 },

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type RegistryResult<T> = Result<T, RegistryError>;
