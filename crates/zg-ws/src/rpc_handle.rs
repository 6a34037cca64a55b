//! Cloneable handle for issuing JSON-RPC calls over a session.
//!
//! Outgoing frames are queued on a channel consumed by the session's
//! message loop, which keeps the handle reconnect-safe and free of direct
//! socket lifetimes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

use crate::connection::ConnectionState;
use crate::error::{WsError, WsResult};
use crate::message::RpcRequest;
use crate::subscription::RequestRegistry;
use crate::transport::Subscription;

/// Outbound frame to be written to the socket.
#[derive(Debug)]
pub enum WsOutbound {
    /// Serialized JSON-RPC request.
    Text(String),
}

/// Handle for sending requests on a session.
#[derive(Clone)]
pub struct RpcHandle {
    tx: mpsc::Sender<WsOutbound>,
    state: Arc<RwLock<ConnectionState>>,
    registry: Arc<RequestRegistry>,
    next_id: Arc<AtomicU64>,
    request_timeout: Duration,
}

impl RpcHandle {
    /// Create a new handle.
    pub fn new(
        tx: mpsc::Sender<WsOutbound>,
        state: Arc<RwLock<ConnectionState>>,
        registry: Arc<RequestRegistry>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            tx,
            state,
            registry,
            next_id: Arc::new(AtomicU64::new(1)),
            request_timeout,
        }
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Send a request and wait for the response.
    ///
    /// # Errors
    ///
    /// - `WsError::NotConnected`: socket is not connected
    /// - `WsError::ChannelClosed`: session message loop is gone
    /// - `WsError::Timeout`: no response within the request timeout
    /// - `WsError::Rpc`: the node answered with an error object
    pub async fn call(&self, method: &str, params: Value) -> WsResult<Value> {
        if !self.is_connected() {
            return Err(WsError::NotConnected);
        }

        let id = self.next_id();
        let rx = self.registry.register_call(id);
        self.send(id, method, params).await?;

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(WsError::ChannelClosed),
            Err(_) => {
                self.registry.cancel(id);
                Err(WsError::Timeout(method.to_string()))
            }
        }
    }

    /// Send a subscribing request and wait for the node's acknowledgement.
    pub async fn subscribe(
        &self,
        method: &str,
        params: Value,
        unsubscribe_method: &str,
    ) -> WsResult<Subscription> {
        if !self.is_connected() {
            return Err(WsError::NotConnected);
        }

        let id = self.next_id();
        let rx = self.registry.register_subscribe(id, unsubscribe_method);
        self.send(id, method, params).await?;

        // The pending entry stays registered on timeout: a late ack is then
        // reported as orphaned and unsubscribed by the message loop.
        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(WsError::ChannelClosed),
            Err(_) => Err(WsError::Timeout(method.to_string())),
        }
    }

    /// Cancel a subscription without waiting for the node's response.
    ///
    /// Local routing is removed first. If the socket is down the node has
    /// already forgotten the subscription, so nothing is sent.
    pub fn unsubscribe(&self, method: &str, subscription_id: &str) -> WsResult<()> {
        self.registry.remove_subscription(subscription_id);

        if !self.is_connected() {
            debug!(subscription = %subscription_id, "Not connected, skipping unsubscribe frame");
            return Ok(());
        }

        let request = RpcRequest::new(
            self.next_id(),
            method,
            Value::Array(vec![Value::String(subscription_id.to_string())]),
        );
        let text = serde_json::to_string(&request)?;

        self.tx.try_send(WsOutbound::Text(text)).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                WsError::SendFailed("outbound queue full".to_string())
            }
            mpsc::error::TrySendError::Closed(_) => WsError::ChannelClosed,
        })?;

        debug!(subscription = %subscription_id, method, "Unsubscribe queued");
        Ok(())
    }

    async fn send(&self, id: u64, method: &str, params: Value) -> WsResult<()> {
        let request = RpcRequest::new(id, method, params);
        let text = match serde_json::to_string(&request) {
            Ok(text) => text,
            Err(e) => {
                self.registry.cancel(id);
                return Err(e.into());
            }
        };

        if self.tx.send(WsOutbound::Text(text)).await.is_err() {
            self.registry.cancel(id);
            return Err(WsError::ChannelClosed);
        }

        debug!(id, method, "Request queued");
        Ok(())
    }

    /// Check if the socket is connected and the loop is alive.
    pub fn is_connected(&self) -> bool {
        *self.state.read() == ConnectionState::Connected && !self.tx.is_closed()
    }
}
