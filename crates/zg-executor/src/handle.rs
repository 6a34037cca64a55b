//! Caller-side view of one in-flight operation.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;
use zg_core::{BlockRef, ChainEvent, StatusUpdate};

use crate::error::TransactionError;
use crate::guard::UnsubscribeGuard;
use crate::lifecycle::{Lifecycle, TxState};

/// Terminal success.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalizedTx {
    pub block: Option<BlockRef>,
    /// Every event of the finalized block, in arrival order, including
    /// those emitted by other extrinsics.
    pub events: Vec<ChainEvent>,
    /// Event chosen by the completion policy.
    pub selected: Option<ChainEvent>,
}

pub type TransactionOutcome = Result<FinalizedTx, TransactionError>;

/// Handle to a submitted operation.
///
/// Status updates are delivered in the order the transport received them.
/// Dropping the handle before a terminal status cancels local observation
/// and unsubscribes; the operation itself stays on the network.
pub struct TransactionHandle {
    id: Uuid,
    lifecycle: Arc<Mutex<Lifecycle>>,
    guard: Arc<UnsubscribeGuard>,
    cancel: CancellationToken,
    statuses: mpsc::UnboundedReceiver<StatusUpdate>,
    completion: Option<oneshot::Receiver<TransactionOutcome>>,
    outcome: Option<TransactionOutcome>,
}

impl TransactionHandle {
    pub(crate) fn new(
        id: Uuid,
        lifecycle: Arc<Mutex<Lifecycle>>,
        guard: Arc<UnsubscribeGuard>,
        cancel: CancellationToken,
        statuses: mpsc::UnboundedReceiver<StatusUpdate>,
        completion: oneshot::Receiver<TransactionOutcome>,
    ) -> Self {
        Self {
            id,
            lifecycle,
            guard,
            cancel,
            statuses,
            completion: Some(completion),
            outcome: None,
        }
    }

    /// Local id for logs and correlation.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Node-assigned subscription id.
    pub fn subscription_id(&self) -> &str {
        self.guard.subscription_id()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TxState {
        self.lifecycle.lock().state().clone()
    }

    /// Next status update; `None` once the stream is finished.
    pub async fn next_status(&mut self) -> Option<StatusUpdate> {
        self.statuses.recv().await
    }

    /// Wait for the terminal outcome. Repeated calls return the same value.
    ///
    /// Status updates not yet read through `next_status` stay buffered.
    pub async fn wait(&mut self) -> TransactionOutcome {
        if let Some(outcome) = &self.outcome {
            return outcome.clone();
        }
        let outcome = match self.completion.take() {
            Some(rx) => rx.await.unwrap_or(Err(TransactionError::SubscriptionLost)),
            None => Err(TransactionError::SubscriptionLost),
        };
        self.outcome = Some(outcome.clone());
        outcome
    }

    /// Stop observing. No-op once a terminal state is committed.
    ///
    /// This only stops local observation; a signed operation that has left
    /// the client cannot be withdrawn.
    pub fn cancel(&self) {
        let abandoned = self.lifecycle.lock().abandon(TxState::Cancelled);
        if abandoned {
            debug!(tx = %self.id, "Cancelling transaction observation");
        }
        self.cancel.cancel();
        self.guard.release();
    }
}

impl Drop for TransactionHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for TransactionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionHandle")
            .field("id", &self.id)
            .field("subscription_id", &self.guard.subscription_id())
            .field("state", &self.state())
            .finish()
    }
}
