//! Transaction lifecycle state machine.
//!
//! ```text
//! Submitted ──queued──▶ Submitted
//!     │ inBlock                       ┌──▶ Finalized
//!     ├──────────▶ InBlock ───────────┤
//!     │                               └──▶ Failed{dropped|invalid|retracted}
//!     └──dropped/invalid/retracted──▶ Failed
//! ```
//!
//! Once a terminal state is committed every further update is ignored, so a
//! redelivered `finalized` cannot complete the transaction twice.

use serde::Serialize;
use zg_core::{BlockRef, StatusTag, StatusUpdate};

/// Observable state of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TxState {
    /// Dispatched; the node has acknowledged the subscription.
    Submitted,
    /// Included in a block that is not final yet.
    InBlock { block: Option<BlockRef> },
    /// Included in a finalized block.
    Finalized { block: Option<BlockRef> },
    /// Terminal failure reported by the node.
    Failed { tag: StatusTag },
    /// The status stream ended before a terminal status.
    Lost,
    /// Local observation was abandoned.
    Cancelled,
}

impl TxState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Submitted | Self::InBlock { .. })
    }
}

/// Result of applying one update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Non-terminal update; keep observing.
    Progress,
    /// Terminal success committed.
    Finalized,
    /// Terminal failure committed.
    Failed(StatusTag),
    /// Update arrived after commit and was dropped.
    Ignored,
}

/// Per-transaction state machine with a single commit flag.
#[derive(Debug)]
pub struct Lifecycle {
    state: TxState,
    committed: bool,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: TxState::Submitted,
            committed: false,
        }
    }

    pub fn state(&self) -> &TxState {
        &self.state
    }

    pub fn is_committed(&self) -> bool {
        self.committed
    }

    /// Apply a status update.
    pub fn apply(&mut self, update: &StatusUpdate) -> Step {
        if self.committed {
            return Step::Ignored;
        }

        match update.tag {
            // Pool states carry no new information once the tx is in a block.
            StatusTag::Queued => Step::Progress,
            StatusTag::InBlock => {
                self.state = TxState::InBlock {
                    block: update.block.clone(),
                };
                Step::Progress
            }
            StatusTag::Finalized => {
                self.state = TxState::Finalized {
                    block: update.block.clone(),
                };
                self.committed = true;
                Step::Finalized
            }
            tag @ (StatusTag::Dropped | StatusTag::Invalid | StatusTag::Retracted) => {
                self.state = TxState::Failed { tag };
                self.committed = true;
                Step::Failed(tag)
            }
        }
    }

    /// Commit a locally decided terminal state (`Lost` or `Cancelled`).
    ///
    /// Returns `false` if a terminal state was already committed.
    pub fn abandon(&mut self, state: TxState) -> bool {
        if self.committed {
            return false;
        }
        debug_assert!(matches!(state, TxState::Lost | TxState::Cancelled));
        self.state = state;
        self.committed = true;
        true
    }
}
