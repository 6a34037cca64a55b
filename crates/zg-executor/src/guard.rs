//! One-shot unsubscribe guard.
//!
//! Shared between a transaction's driver task and its handle. Whichever
//! side releases first issues the unsubscribe call; every later release is
//! a no-op.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, warn};
use zg_telemetry::Metrics;
use zg_ws::DynTransport;

/// Issues at most one unsubscribe call for a subscription.
pub struct UnsubscribeGuard {
    transport: DynTransport,
    method: String,
    subscription_id: String,
    released: AtomicBool,
}

impl UnsubscribeGuard {
    pub fn new(
        transport: DynTransport,
        method: impl Into<String>,
        subscription_id: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            method: method.into(),
            subscription_id: subscription_id.into(),
            released: AtomicBool::new(false),
        }
    }

    /// Unsubscribe if nobody has yet.
    ///
    /// Returns `true` for the single caller that issued the call.
    pub fn release(&self) -> bool {
        if self
            .released
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        if let Err(e) = self.transport.unsubscribe(&self.method, &self.subscription_id) {
            // Local routing is already gone; the node drops the stream on its own.
            warn!(subscription = %self.subscription_id, error = %e, "Unsubscribe failed");
        } else {
            debug!(subscription = %self.subscription_id, "Unsubscribed");
        }
        Metrics::unsubscribed();
        true
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }
}

impl std::fmt::Debug for UnsubscribeGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnsubscribeGuard")
            .field("subscription_id", &self.subscription_id)
            .field("released", &self.is_released())
            .finish()
    }
}
