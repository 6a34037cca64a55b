//! Signer capability and local key management.
//!
//! The submitter only sees the [`Signer`] trait: an address plus an async
//! signature over a 32-byte payload hash. [`LocalSigner`] backs it with a
//! secp256k1 key loaded by [`KeyManager`].

use std::path::PathBuf;
use std::sync::Arc;

use alloy::primitives::{keccak256, Address, PrimitiveSignature, B256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::Signer as AlloySigner;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::Zeroizing;
use zg_ws::BoxFuture;

// =============================================================================
// KeySource and KeyManager
// =============================================================================

/// Source of the private key.
#[derive(Clone)]
pub enum KeySource {
    /// Hex key in an environment variable.
    EnvVar { var_name: String },
    /// Hex key in a file (recommend 0600 permissions).
    File { path: PathBuf },
    /// Development seed phrase; the key is `keccak256(phrase)`.
    DevSeed { phrase: Zeroizing<String> },
}

impl std::fmt::Debug for KeySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EnvVar { var_name } => f
                .debug_struct("EnvVar")
                .field("var_name", var_name)
                .finish(),
            Self::File { path } => f.debug_struct("File").field("path", path).finish(),
            Self::DevSeed { .. } => f.write_str("DevSeed { .. }"),
        }
    }
}

/// Holds one signing key.
///
/// Security notes:
/// - Raw key bytes only live in `Zeroizing` buffers while loading.
/// - Keys are loaded once; no runtime rotation.
/// - Never log private key material.
pub struct KeyManager {
    signer: PrivateKeySigner,
}

impl KeyManager {
    /// Load a key and optionally verify its address.
    ///
    /// # Errors
    /// Returns `KeyError` if:
    /// - Environment variable not found
    /// - File read fails
    /// - Hex decoding fails
    /// - Private key is invalid
    /// - Address mismatch
    pub fn load(source: KeySource, expected_address: Option<Address>) -> Result<Self, KeyError> {
        // Supports 0x prefix and surrounding whitespace.
        fn parse_hex_key(hex_str: &str) -> Result<Zeroizing<Vec<u8>>, KeyError> {
            let trimmed = hex_str.trim().trim_start_matches("0x");
            Ok(Zeroizing::new(hex::decode(trimmed)?))
        }

        let secret_bytes: Zeroizing<Vec<u8>> = match source {
            KeySource::EnvVar { ref var_name } => {
                let hex = Zeroizing::new(
                    std::env::var(var_name)
                        .map_err(|_| KeyError::EnvVarNotFound(var_name.clone()))?,
                );
                parse_hex_key(&hex)?
            }
            KeySource::File { ref path } => {
                let content = Zeroizing::new(std::fs::read_to_string(path)?);
                parse_hex_key(&content)?
            }
            KeySource::DevSeed { ref phrase } => {
                if phrase.trim().is_empty() {
                    return Err(KeyError::InvalidKey("empty seed phrase".to_string()));
                }
                Zeroizing::new(keccak256(phrase.as_bytes()).to_vec())
            }
        };

        Self::from_bytes(&secret_bytes, expected_address)
    }

    /// Load from raw key bytes.
    pub fn from_bytes(
        secret_bytes: &[u8],
        expected_address: Option<Address>,
    ) -> Result<Self, KeyError> {
        let signer = PrivateKeySigner::from_slice(secret_bytes)
            .map_err(|e| KeyError::InvalidKey(e.to_string()))?;

        if let Some(expected) = expected_address {
            if signer.address() != expected {
                return Err(KeyError::AddressMismatch {
                    expected,
                    actual: signer.address(),
                });
            }
        }

        Ok(Self { signer })
    }

    pub fn signer(&self) -> &PrivateKeySigner {
        &self.signer
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }
}

impl std::fmt::Debug for KeyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyManager")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

/// Key management errors.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Failed to decode hex: {0}")]
    HexDecode(#[from] hex::FromHexError),

    #[error("Invalid private key: {0}")]
    InvalidKey(String),

    #[error("Address mismatch: expected {expected}, got {actual}")]
    AddressMismatch { expected: Address, actual: Address },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Signatures
// =============================================================================

/// Recoverable ECDSA signature in wire form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxSignature {
    /// r component (hex with 0x prefix).
    pub r: String,
    /// s component (hex with 0x prefix).
    pub s: String,
    /// Recovery id, 27 or 28.
    pub v: u8,
}

impl TxSignature {
    pub fn from_signature(signature: &PrimitiveSignature) -> Self {
        Self {
            r: format!("0x{}", hex::encode(signature.r().to_be_bytes::<32>())),
            s: format!("0x{}", hex::encode(signature.s().to_be_bytes::<32>())),
            // y_parity (0/1) to recovery id (27/28)
            v: 27 + u8::from(signature.v()),
        }
    }
}

// =============================================================================
// Signer
// =============================================================================

/// Signing errors.
#[derive(Debug, Error)]
pub enum SignerError {
    #[error("Signing failed: {0}")]
    SigningFailed(#[from] alloy::signers::Error),

    #[error("Operation serialization failed: {0}")]
    SerializationFailed(String),
}

/// Signing capability used by the submitter.
pub trait Signer: Send + Sync {
    /// Account the signatures belong to.
    fn address(&self) -> Address;

    /// Sign a 32-byte payload hash.
    fn sign<'a>(&'a self, payload_hash: B256) -> BoxFuture<'a, Result<TxSignature, SignerError>>;
}

/// Signer backed by a locally held key.
#[derive(Debug, Clone)]
pub struct LocalSigner {
    key_manager: Arc<KeyManager>,
}

impl LocalSigner {
    pub fn new(key_manager: Arc<KeyManager>) -> Self {
        Self { key_manager }
    }

    /// Shorthand for `KeyManager::load` + `new`.
    pub fn load(source: KeySource, expected_address: Option<Address>) -> Result<Self, KeyError> {
        Ok(Self::new(Arc::new(KeyManager::load(source, expected_address)?)))
    }
}

impl Signer for LocalSigner {
    fn address(&self) -> Address {
        self.key_manager.address()
    }

    fn sign<'a>(&'a self, payload_hash: B256) -> BoxFuture<'a, Result<TxSignature, SignerError>> {
        Box::pin(async move {
            // Do not log the signature.
            let signature = self.key_manager.signer().sign_hash(&payload_hash).await?;
            Ok(TxSignature::from_signature(&signature))
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
