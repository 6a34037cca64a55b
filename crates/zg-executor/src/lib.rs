//! Signed operation submission and transaction lifecycle tracking.
//!
//! # Key Components
//!
//! - [`Submitter`]: nonce lookup, signing and dispatch, serialised per signer
//! - [`TransactionHandle`]: status stream, terminal outcome and cancellation
//! - [`Lifecycle`]: state machine with a single terminal commit
//! - [`UnsubscribeGuard`]: at-most-once unsubscribe shared by driver and handle
//! - [`CompletionPolicy`]: which finalized event represents the operation
//! - [`Signer`]: signing seam, with a local key implementation

pub mod error;
pub mod guard;
pub mod handle;
pub mod lifecycle;
pub mod operation;
pub mod policy;
pub mod signer;
pub mod submitter;

pub use error::{ExecutorError, ExecutorResult, TransactionError};
pub use guard::UnsubscribeGuard;
pub use handle::{FinalizedTx, TransactionHandle, TransactionOutcome};
pub use lifecycle::{Lifecycle, Step, TxState};
pub use operation::{Operation, SignedOperation};
pub use policy::CompletionPolicy;
pub use signer::{KeyError, KeyManager, KeySource, LocalSigner, Signer, SignerError, TxSignature};
pub use submitter::{Submitter, NONCE_METHOD, SUBMIT_METHOD, UNWATCH_METHOD};
