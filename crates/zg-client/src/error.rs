//! Client error types.

use thiserror::Error;
use zg_executor::{ExecutorError, KeyError};
use zg_registry::RegistryError;
use zg_telemetry::TelemetryError;
use zg_ws::ResolveError;

/// Bootstrap failures. Every variant is terminal for the call; the caller
/// re-invokes bootstrap to try again.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("Unsupported protocol: {0}")]
    UnsupportedProtocol(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Chain spec error: {0}")]
    ChainSpec(String),

    #[error("Light client error: {0}")]
    LightClient(String),

    #[error("Connect timed out after {timeout_ms}ms")]
    ConnectTimeout { timeout_ms: u64 },

    #[error("Transport failed {attempts} times (max retries exceeded)")]
    RetryExhausted { attempts: u32 },

    #[error("Error table population failed: {0}")]
    Metadata(#[from] RegistryError),
}

impl BootstrapError {
    /// Stable taxonomy tag.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::UnsupportedProtocol(_) => "UnsupportedProtocol",
            Self::InvalidAddress(_) => "InvalidAddress",
            Self::ChainSpec(_) => "ChainSpec",
            Self::LightClient(_) => "LightClient",
            Self::ConnectTimeout { .. } => "ConnectTimeout",
            Self::RetryExhausted { .. } => "RetryExhausted",
            Self::Metadata(_) => "MetadataError",
        }
    }

    /// Metric label.
    pub fn outcome_label(&self) -> &'static str {
        match self {
            Self::UnsupportedProtocol(_) | Self::InvalidAddress(_) => "unsupported",
            Self::ChainSpec(_) | Self::LightClient(_) => "light_client",
            Self::ConnectTimeout { .. } => "timeout",
            Self::RetryExhausted { .. } => "retry_exhausted",
            Self::Metadata(_) => "metadata",
        }
    }
}

impl From<ResolveError> for BootstrapError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::UnsupportedProtocol(s) => Self::UnsupportedProtocol(s),
            ResolveError::InvalidAddress(s) => Self::InvalidAddress(s),
            ResolveError::ChainSpec(s) => Self::ChainSpec(s),
            ResolveError::LightClient(s) => Self::LightClient(s),
        }
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Client handle has been released")]
    Released,

    #[error("Bootstrap failed: {0}")]
    Bootstrap(#[from] BootstrapError),

    #[error(transparent)]
    Executor(#[from] ExecutorError),

    #[error("Signer key error: {0}")]
    Key(#[from] KeyError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
}

impl ClientError {
    /// Stable taxonomy tag.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Released => "Released",
            Self::Bootstrap(e) => e.tag(),
            Self::Executor(e) => e.tag(),
            Self::Key(_) => "KeyError",
            Self::Config(_) => "ConfigError",
            Self::Registry(_) => "RegistryError",
            Self::Telemetry(_) => "TelemetryError",
        }
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_errors_keep_their_tag() {
        let err: BootstrapError = ResolveError::UnsupportedProtocol("http".into()).into();
        assert_eq!(err.tag(), "UnsupportedProtocol");

        let err = ClientError::from(BootstrapError::RetryExhausted { attempts: 6 });
        assert_eq!(err.tag(), "RetryExhausted");
        assert_eq!(
            err.to_string(),
            "Bootstrap failed: Transport failed 6 times (max retries exceeded)"
        );
    }

    #[test]
    fn test_executor_tag_passes_through() {
        let err = ClientError::from(ExecutorError::SubmissionRejected("bad".into()));
        assert_eq!(err.tag(), "SubmissionRejected");
    }
}
