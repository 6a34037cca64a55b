//! Executor error types.

use thiserror::Error;
use zg_core::StatusTag;
use zg_registry::DecodedError;
use zg_ws::WsError;

use crate::signer::SignerError;

/// Synchronous submission errors. No `TransactionHandle` exists when
/// one of these is returned.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Submission rejected: {0}")]
    SubmissionRejected(String),

    #[error("Signing failed: {0}")]
    Signer(#[from] SignerError),

    #[error("Transport error: {0}")]
    Transport(#[from] WsError),

    #[error("Invalid node response: {0}")]
    InvalidResponse(String),
}

impl ExecutorError {
    /// Stable taxonomy tag.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::SubmissionRejected(_) => "SubmissionRejected",
            Self::Signer(_) => "SignerError",
            Self::Transport(_) => "TransportError",
            Self::InvalidResponse(_) => "InvalidResponse",
        }
    }
}

pub type ExecutorResult<T> = Result<T, ExecutorError>;

/// Asynchronous terminal failures, delivered through the transaction's
/// completion channel.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransactionError {
    #[error("Transaction rejected: {tag}")]
    Rejected { tag: StatusTag },

    #[error("Node reported error: {0}")]
    NodeReported(DecodedError),

    #[error("Status subscription ended before a terminal status")]
    SubscriptionLost,

    #[error("Observation cancelled")]
    Cancelled,
}

impl TransactionError {
    /// Stable taxonomy tag.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Rejected { .. } => "TransactionRejected",
            Self::NodeReported(_) => "NodeReportedError",
            Self::SubscriptionLost => "SubscriptionLost",
            Self::Cancelled => "Cancelled",
        }
    }

    /// Metric label for the outcome.
    pub fn outcome_label(&self) -> &'static str {
        match self {
            Self::Rejected { tag } => tag.as_str(),
            Self::NodeReported(_) => "node_error",
            Self::SubscriptionLost => "subscription_lost",
            Self::Cancelled => "cancelled",
        }
    }
}
