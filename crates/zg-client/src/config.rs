//! Client configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;
use zg_executor::KeySource;
use zg_ws::ConnectionConfig;

use crate::error::{ClientError, ClientResult};

/// Prefix for environment overrides (`ZG_TIMEOUT_MS=...`).
pub const ENV_PREFIX: &str = "ZG";

/// Connection and bootstrap configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Node address (`ws://`, `wss://` or `light://`).
    pub address: String,
    /// Optional auxiliary read-only service (GraphQL over HTTP).
    #[serde(default)]
    pub aux_service_address: Option<String>,
    /// Bootstrap timeout (ms). Default: 15,000.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Transient transport errors tolerated during bootstrap. Default: 5.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Auxiliary service probe timeout (ms). Default: 3,000.
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    /// Chain spec document for `light://` addresses.
    #[serde(default)]
    pub chain_spec_path: Option<PathBuf>,
    /// Per-request response timeout (ms). Default: 30,000.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Reconnect backoff base (ms). Default: 500.
    #[serde(default = "default_reconnect_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,
    /// Reconnect backoff cap (ms). Default: 5,000.
    #[serde(default = "default_reconnect_max_delay_ms")]
    pub reconnect_max_delay_ms: u64,
    /// Idle time before a keep-alive ping (ms). Default: 30,000.
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    /// Pong deadline (ms). Default: 10,000.
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,
    #[serde(default)]
    pub signer: Option<SignerConfig>,
}

fn default_timeout_ms() -> u64 {
    15_000
}

fn default_max_retries() -> u32 {
    5
}

fn default_probe_timeout_ms() -> u64 {
    3_000
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_reconnect_base_delay_ms() -> u64 {
    500
}

fn default_reconnect_max_delay_ms() -> u64 {
    5_000
}

fn default_heartbeat_interval_ms() -> u64 {
    30_000
}

fn default_heartbeat_timeout_ms() -> u64 {
    10_000
}

/// Signing key source. Exactly one of `key_env`, `key_file`, `dev_seed`.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct SignerConfig {
    /// Environment variable holding a hex private key.
    #[serde(default)]
    pub key_env: Option<String>,
    /// File holding a hex private key.
    #[serde(default)]
    pub key_file: Option<PathBuf>,
    /// Development seed phrase. Never use for real funds.
    #[serde(default)]
    pub dev_seed: Option<String>,
    /// Refuse to load a key whose address differs from this (0x hex).
    #[serde(default)]
    pub expected_address: Option<String>,
}

impl std::fmt::Debug for SignerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignerConfig")
            .field("key_env", &self.key_env)
            .field("key_file", &self.key_file)
            .field("dev_seed", &self.dev_seed.as_ref().map(|_| ".."))
            .field("expected_address", &self.expected_address)
            .finish()
    }
}

impl SignerConfig {
    fn source_count(&self) -> usize {
        [
            self.key_env.is_some(),
            self.key_file.is_some(),
            self.dev_seed.is_some(),
        ]
        .into_iter()
        .filter(|set| *set)
        .count()
    }

    pub fn expected_address(&self) -> ClientResult<Option<Address>> {
        self.expected_address
            .as_deref()
            .map(|addr| {
                addr.parse::<Address>()
                    .map_err(|e| ClientError::Config(format!("expected_address {addr}: {e}")))
            })
            .transpose()
    }

    /// Key source named by this table.
    pub fn key_source(&self) -> ClientResult<KeySource> {
        if self.source_count() != 1 {
            return Err(ClientError::Config(
                "signer requires exactly one of key_env, key_file, dev_seed".to_string(),
            ));
        }

        if let Some(var_name) = &self.key_env {
            return Ok(KeySource::EnvVar {
                var_name: var_name.clone(),
            });
        }
        if let Some(path) = &self.key_file {
            return Ok(KeySource::File { path: path.clone() });
        }
        match &self.dev_seed {
            Some(phrase) => Ok(KeySource::DevSeed {
                phrase: Zeroizing::new(phrase.clone()),
            }),
            None => Err(ClientError::Config("signer has no key source".to_string())),
        }
    }
}

impl ClientConfig {
    /// Minimal config for an address, everything else defaulted.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            aux_service_address: None,
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            probe_timeout_ms: default_probe_timeout_ms(),
            chain_spec_path: None,
            request_timeout_ms: default_request_timeout_ms(),
            reconnect_base_delay_ms: default_reconnect_base_delay_ms(),
            reconnect_max_delay_ms: default_reconnect_max_delay_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            heartbeat_timeout_ms: default_heartbeat_timeout_ms(),
            signer: None,
        }
    }

    /// Load a TOML file with `ZG_*` environment overrides on top.
    pub fn load(path: impl AsRef<Path>) -> ClientResult<Self> {
        let path = path.as_ref();
        let config: Self = config::Config::builder()
            .add_source(config::File::from(path).format(config::FileFormat::Toml))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| {
                ClientError::Config(format!("Failed to load {}: {e}", path.display()))
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML string (no environment overrides).
    pub fn from_toml_str(content: &str) -> ClientResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ClientError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ClientResult<()> {
        if self.address.trim().is_empty() {
            return Err(ClientError::Config("address must not be empty".to_string()));
        }
        if self.timeout_ms == 0 {
            return Err(ClientError::Config("timeout_ms must be > 0".to_string()));
        }
        if self.probe_timeout_ms == 0 {
            return Err(ClientError::Config("probe_timeout_ms must be > 0".to_string()));
        }
        if self.request_timeout_ms == 0 {
            return Err(ClientError::Config(
                "request_timeout_ms must be > 0".to_string(),
            ));
        }
        if self.reconnect_base_delay_ms > self.reconnect_max_delay_ms {
            return Err(ClientError::Config(
                "reconnect_base_delay_ms exceeds reconnect_max_delay_ms".to_string(),
            ));
        }
        if let Some(signer) = &self.signer {
            if signer.source_count() > 1 {
                return Err(ClientError::Config(
                    "signer names more than one key source".to_string(),
                ));
            }
            signer.expected_address()?;
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// Session template for socket transports. The resolver fills in `url`.
    pub fn connection(&self) -> ConnectionConfig {
        ConnectionConfig {
            url: self.address.clone(),
            reconnect_base_delay_ms: self.reconnect_base_delay_ms,
            reconnect_max_delay_ms: self.reconnect_max_delay_ms,
            heartbeat_interval_ms: self.heartbeat_interval_ms,
            heartbeat_timeout_ms: self.heartbeat_timeout_ms,
            request_timeout_ms: self.request_timeout_ms,
        }
    }
}
