//! Request correlation and subscription routing.
//!
//! Tracks in-flight requests by id and live subscriptions by node-assigned
//! subscription id. Subscription channels are registered by the read loop
//! itself when the subscribe response arrives, so a notification that
//! immediately follows the response is never lost.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::error::{WsError, WsResult};
use crate::message::{subscription_key, RpcNotification, RpcResponse};
use crate::transport::Subscription;

/// An in-flight request awaiting its response.
enum PendingCall {
    Call(oneshot::Sender<WsResult<Value>>),
    Subscribe {
        tx: oneshot::Sender<WsResult<Subscription>>,
        unsubscribe_method: String,
    },
}

/// A subscription the node acknowledged after its caller went away.
///
/// The node keeps streaming until it is told otherwise, so the session
/// sends `unsubscribe_method` for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrphanedSubscription {
    pub id: String,
    pub unsubscribe_method: String,
}

/// Registry of in-flight requests and live subscriptions.
#[derive(Default)]
pub struct RequestRegistry {
    pending: Mutex<HashMap<u64, PendingCall>>,
    subscriptions: Mutex<HashMap<String, mpsc::UnboundedSender<Value>>>,
}

impl RequestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plain request.
    pub fn register_call(&self, id: u64) -> oneshot::Receiver<WsResult<Value>> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, PendingCall::Call(tx));
        rx
    }

    /// Register a subscribing request.
    pub fn register_subscribe(
        &self,
        id: u64,
        unsubscribe_method: impl Into<String>,
    ) -> oneshot::Receiver<WsResult<Subscription>> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(
            id,
            PendingCall::Subscribe {
                tx,
                unsubscribe_method: unsubscribe_method.into(),
            },
        );
        rx
    }

    /// Forget a request (send failure or timeout).
    pub fn cancel(&self, id: u64) {
        self.pending.lock().remove(&id);
    }

    /// Resolve the request matching a response.
    ///
    /// Responses with unknown ids (fire-and-forget requests, timed-out
    /// calls) are dropped. Returns the subscription to cancel when a
    /// subscribe ack arrives for a caller that is no longer waiting.
    pub fn handle_response(&self, response: RpcResponse) -> Option<OrphanedSubscription> {
        let id = response.id;
        let Some(pending) = self.pending.lock().remove(&id) else {
            debug!(id, "Response for unknown request id");
            return None;
        };

        match pending {
            PendingCall::Call(tx) => {
                let _ = tx.send(response.into_result().map_err(WsError::Rpc));
                None
            }
            PendingCall::Subscribe {
                tx,
                unsubscribe_method,
            } => {
                let result = match response.into_result() {
                    Ok(value) => match subscription_key(&value) {
                        Some(sub_id) => {
                            let (sub_tx, sub_rx) = mpsc::unbounded_channel();
                            self.subscriptions.lock().insert(sub_id.clone(), sub_tx);
                            debug!(id, subscription = %sub_id, "Subscription registered");
                            Ok(Subscription {
                                id: sub_id,
                                unsubscribe_method,
                                notifications: sub_rx,
                            })
                        }
                        None => Err(WsError::ParseError(format!(
                            "subscription id is not a string or number: {value}"
                        ))),
                    },
                    Err(e) => Err(WsError::Rpc(e)),
                };

                match tx.send(result) {
                    Err(Ok(sub)) => {
                        // Caller went away before the ack.
                        self.subscriptions.lock().remove(&sub.id);
                        debug!(id, subscription = %sub.id, "Subscription acked without a caller");
                        Some(OrphanedSubscription {
                            id: sub.id,
                            unsubscribe_method: sub.unsubscribe_method,
                        })
                    }
                    _ => None,
                }
            }
        }
    }

    /// Route a notification to its subscription.
    ///
    /// Returns `true` if it was delivered.
    pub fn handle_notification(&self, notification: RpcNotification) -> bool {
        let Some(key) = notification.subscription_key() else {
            warn!(method = %notification.method, "Notification without subscription id");
            return false;
        };

        let mut subs = self.subscriptions.lock();
        match subs.get(&key) {
            Some(tx) => {
                if tx.send(notification.params.result).is_err() {
                    // Receiver dropped; the subscription is dead locally.
                    subs.remove(&key);
                    return false;
                }
                true
            }
            None => {
                debug!(subscription = %key, "Notification for unknown subscription");
                false
            }
        }
    }

    /// Stop routing a subscription. Returns `true` if it was live.
    pub fn remove_subscription(&self, id: &str) -> bool {
        self.subscriptions.lock().remove(id).is_some()
    }

    /// Fail every in-flight request and close every subscription.
    ///
    /// Called when the socket goes away; nothing registered on the old
    /// socket survives a reconnect.
    pub fn fail_all(&self, reason: &str) {
        let pending: Vec<PendingCall> = self.pending.lock().drain().map(|(_, p)| p).collect();
        let subs = {
            let mut guard = self.subscriptions.lock();
            let count = guard.len();
            guard.clear();
            count
        };

        if !pending.is_empty() || subs > 0 {
            warn!(
                pending = pending.len(),
                subscriptions = subs,
                reason,
                "Failing in-flight requests"
            );
        }

        for call in pending {
            let err = || WsError::ConnectionClosed {
                code: 1006,
                reason: reason.to_string(),
            };
            match call {
                PendingCall::Call(tx) => {
                    let _ = tx.send(Err(err()));
                }
                PendingCall::Subscribe { tx, .. } => {
                    let _ = tx.send(Err(err()));
                }
            }
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().len()
    }
}
