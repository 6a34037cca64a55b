//! Operations and their signed wire form.

use alloy::primitives::{keccak256, B256};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ExecutorError, ExecutorResult};
use crate::signer::{SignerError, TxSignature};

/// A call into one of the node's subsystems.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub pallet: String,
    pub call: String,
    #[serde(default = "empty_args")]
    pub args: Value,
}

fn empty_args() -> Value {
    Value::Object(Map::new())
}

impl Operation {
    /// Create an operation. `Null` args become an empty object.
    pub fn new(pallet: impl Into<String>, call: impl Into<String>, args: Value) -> Self {
        Self {
            pallet: pallet.into(),
            call: call.into(),
            args: if args.is_null() { empty_args() } else { args },
        }
    }

    /// Local checks done before any network traffic.
    pub fn validate(&self) -> ExecutorResult<()> {
        if self.pallet.trim().is_empty() {
            return Err(ExecutorError::SubmissionRejected(
                "operation has an empty pallet name".to_string(),
            ));
        }
        if self.call.trim().is_empty() {
            return Err(ExecutorError::SubmissionRejected(
                "operation has an empty call name".to_string(),
            ));
        }
        if !self.args.is_object() {
            return Err(ExecutorError::SubmissionRejected(format!(
                "{}.{} args must be an object",
                self.pallet, self.call
            )));
        }
        Ok(())
    }

    /// Hash signed for this operation at `nonce`.
    ///
    /// `keccak256(msgpack_named(operation) || nonce.to_be_bytes())`
    ///
    /// # Errors
    /// Returns `SignerError::SerializationFailed` if msgpack serialization fails.
    pub fn signing_hash(&self, nonce: u64) -> Result<B256, SignerError> {
        let mut data = rmp_serde::to_vec_named(self)
            .map_err(|e| SignerError::SerializationFailed(e.to_string()))?;
        data.extend_from_slice(&nonce.to_be_bytes());
        Ok(keccak256(&data))
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.pallet, self.call)
    }
}

/// Submission payload for `author_submitAndWatchExtrinsic`.
#[derive(Debug, Clone, Serialize)]
pub struct SignedOperation {
    pub call: Operation,
    /// Checksummed signer address.
    pub signer: String,
    pub nonce: u64,
    pub signature: TxSignature,
}
