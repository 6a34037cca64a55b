//! Transport abstraction shared by every node connection kind.
//!
//! A resolved address yields a [`PendingSession`]: a transport that is not
//! yet confirmed connected, plus the stream of transport-level signals the
//! bootstrapper races against its timer.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::WsResult;

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Transport-level signal emitted while establishing a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportSignal {
    /// The session is connected and ready for requests.
    Connected,
    /// A transient connection error; the transport keeps retrying.
    Error(String),
}

/// A live subscription on the transport.
///
/// Notifications arrive in the order the transport received them. The
/// channel closes when the transport drops the subscription (disconnect or
/// unsubscribe).
#[derive(Debug)]
pub struct Subscription {
    /// Node-assigned subscription id.
    pub id: String,
    /// Method used to cancel this subscription on the node.
    pub unsubscribe_method: String,
    /// Raw notification payloads (`params.result`).
    pub notifications: mpsc::UnboundedReceiver<Value>,
}

/// Node transport.
///
/// Implementations multiplex concurrent requests and subscriptions over one
/// session and are safe to share behind an `Arc`.
pub trait Transport: Send + Sync {
    /// Issue a request and wait for its response.
    fn request<'a>(&'a self, method: &'a str, params: Value) -> BoxFuture<'a, WsResult<Value>>;

    /// Issue a subscribing request; resolves once the node acknowledges it.
    fn subscribe<'a>(
        &'a self,
        method: &'a str,
        params: Value,
        unsubscribe_method: &'a str,
    ) -> BoxFuture<'a, WsResult<Subscription>>;

    /// Cancel a subscription (fire-and-forget).
    ///
    /// Local routing stops immediately; the cancel request is queued for
    /// the node without waiting for its response.
    fn unsubscribe(&self, method: &str, subscription_id: &str) -> WsResult<()>;

    /// Tear the session down. Pending requests fail, subscriptions close.
    fn close(&self);

    /// Whether `close` has been called.
    fn is_closed(&self) -> bool;
}

/// Arc wrapper for Transport trait objects.
pub type DynTransport = Arc<dyn Transport>;

/// A resolved but not yet confirmed-connected session.
pub struct PendingSession {
    pub transport: DynTransport,
    pub signals: mpsc::UnboundedReceiver<TransportSignal>,
}

impl std::fmt::Debug for PendingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingSession")
            .field("closed", &self.transport.is_closed())
            .finish()
    }
}
