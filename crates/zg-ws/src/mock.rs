//! In-memory transport for tests.
//!
//! Scripted responses per method, recorded requests, and subscriptions
//! whose notifications are pushed by the test.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::{WsError, WsResult};
use crate::message::RpcError;
use crate::transport::{BoxFuture, PendingSession, Subscription, Transport, TransportSignal};

/// Error returned for methods without a scripted response.
pub const METHOD_NOT_FOUND: i64 = -32601;

/// Mock transport for testing.
#[derive(Debug)]
pub struct MockTransport {
    /// Sticky responses keyed by method.
    responses: Mutex<HashMap<String, Result<Value, RpcError>>>,
    /// One-shot responses, consumed before the sticky ones.
    queued: Mutex<HashMap<String, VecDeque<Result<Value, RpcError>>>>,
    /// Artificial latency per method.
    delays: Mutex<HashMap<String, Duration>>,
    /// Recorded (method, params) for requests and subscribes.
    requests: Mutex<Vec<(String, Value)>>,
    /// Live subscription senders.
    subscriptions: Mutex<HashMap<String, mpsc::UnboundedSender<Value>>>,
    /// Every subscription id ever created, in order.
    created: Mutex<Vec<String>>,
    subscribe_error: Mutex<Option<RpcError>>,
    unsubscribes: Mutex<Vec<(String, String)>>,
    next_subscription: AtomicU64,
    /// Signals emitted when the transport is turned into a pending session.
    initial_signals: Mutex<Vec<TransportSignal>>,
    signal_tx: Mutex<Option<mpsc::UnboundedSender<TransportSignal>>>,
    closed: AtomicBool,
    close_count: AtomicUsize,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Create a mock that reports `Connected` as soon as it is pending.
    pub fn new() -> Self {
        Self::with_signals(vec![TransportSignal::Connected])
    }

    /// Create a mock that emits the given signals when pending.
    pub fn with_signals(signals: Vec<TransportSignal>) -> Self {
        Self {
            responses: Mutex::new(HashMap::new()),
            queued: Mutex::new(HashMap::new()),
            delays: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
            subscriptions: Mutex::new(HashMap::new()),
            created: Mutex::new(Vec::new()),
            subscribe_error: Mutex::new(None),
            unsubscribes: Mutex::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
            initial_signals: Mutex::new(signals),
            signal_tx: Mutex::new(None),
            closed: AtomicBool::new(false),
            close_count: AtomicUsize::new(0),
        }
    }

    /// Wrap in a pending session. Scripted signals are delivered first.
    pub fn into_pending(self: Arc<Self>) -> PendingSession {
        let (tx, rx) = mpsc::unbounded_channel();
        for signal in self.initial_signals.lock().drain(..) {
            let _ = tx.send(signal);
        }
        *self.signal_tx.lock() = Some(tx);
        PendingSession {
            transport: self,
            signals: rx,
        }
    }

    /// Emit a signal on the pending session's signal stream.
    pub fn signal(&self, signal: TransportSignal) -> bool {
        match self.signal_tx.lock().as_ref() {
            Some(tx) => tx.send(signal).is_ok(),
            None => false,
        }
    }

    /// Always answer `method` with `result`.
    pub fn set_response(&self, method: &str, result: Value) {
        self.responses.lock().insert(method.to_string(), Ok(result));
    }

    /// Always answer `method` with an RPC error.
    pub fn set_error(&self, method: &str, error: RpcError) {
        self.responses.lock().insert(method.to_string(), Err(error));
    }

    /// Answer the next call to `method` with `result`.
    pub fn push_response(&self, method: &str, result: Result<Value, RpcError>) {
        self.queued
            .lock()
            .entry(method.to_string())
            .or_default()
            .push_back(result);
    }

    /// Delay every answer to `method`.
    pub fn set_delay(&self, method: &str, delay: Duration) {
        self.delays.lock().insert(method.to_string(), delay);
    }

    /// Reject every subscribing request with `error`.
    pub fn reject_subscriptions(&self, error: RpcError) {
        *self.subscribe_error.lock() = Some(error);
    }

    /// Deliver a notification to a subscription.
    pub fn push(&self, subscription_id: &str, value: Value) -> bool {
        match self.subscriptions.lock().get(subscription_id) {
            Some(tx) => tx.send(value).is_ok(),
            None => false,
        }
    }

    /// Drop a subscription from the transport side, closing its channel.
    pub fn end_subscription(&self, subscription_id: &str) -> bool {
        self.subscriptions.lock().remove(subscription_id).is_some()
    }

    /// Ids of every subscription created so far.
    pub fn subscription_ids(&self) -> Vec<String> {
        self.created.lock().clone()
    }

    /// Most recently created subscription id.
    pub fn last_subscription(&self) -> Option<String> {
        self.created.lock().last().cloned()
    }

    /// Recorded requests.
    pub fn requests(&self) -> Vec<(String, Value)> {
        self.requests.lock().clone()
    }

    /// Recorded requests for one method.
    pub fn requests_for(&self, method: &str) -> Vec<Value> {
        self.requests
            .lock()
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, params)| params.clone())
            .collect()
    }

    /// Recorded (method, subscription id) unsubscribes.
    pub fn unsubscribes(&self) -> Vec<(String, String)> {
        self.unsubscribes.lock().clone()
    }

    pub fn unsubscribe_count(&self) -> usize {
        self.unsubscribes.lock().len()
    }

    /// Number of unsubscribes issued for one subscription.
    pub fn unsubscribe_count_for(&self, subscription_id: &str) -> usize {
        self.unsubscribes
            .lock()
            .iter()
            .filter(|(_, id)| id == subscription_id)
            .count()
    }

    pub fn close_count(&self) -> usize {
        self.close_count.load(Ordering::SeqCst)
    }

    fn record(&self, method: &str, params: &Value) {
        self.requests
            .lock()
            .push((method.to_string(), params.clone()));
    }

    fn scripted(&self, method: &str) -> Option<Result<Value, RpcError>> {
        if let Some(next) = self
            .queued
            .lock()
            .get_mut(method)
            .and_then(|queue| queue.pop_front())
        {
            return Some(next);
        }
        self.responses.lock().get(method).cloned()
    }

    async fn apply_delay(&self, method: &str) {
        let delay = self.delays.lock().get(method).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

impl Transport for MockTransport {
    fn request<'a>(&'a self, method: &'a str, params: Value) -> BoxFuture<'a, WsResult<Value>> {
        Box::pin(async move {
            if self.is_closed() {
                return Err(WsError::Closed);
            }
            self.record(method, &params);
            self.apply_delay(method).await;

            match self.scripted(method) {
                Some(Ok(value)) => Ok(value),
                Some(Err(error)) => Err(WsError::Rpc(error)),
                None => Err(WsError::Rpc(RpcError::new(
                    METHOD_NOT_FOUND,
                    format!("Method not found: {method}"),
                ))),
            }
        })
    }

    fn subscribe<'a>(
        &'a self,
        method: &'a str,
        params: Value,
        unsubscribe_method: &'a str,
    ) -> BoxFuture<'a, WsResult<Subscription>> {
        Box::pin(async move {
            if self.is_closed() {
                return Err(WsError::Closed);
            }
            self.record(method, &params);
            self.apply_delay(method).await;

            if let Some(error) = self.subscribe_error.lock().clone() {
                return Err(WsError::Rpc(error));
            }
            if let Some(Err(error)) = self.scripted(method) {
                return Err(WsError::Rpc(error));
            }

            let n = self.next_subscription.fetch_add(1, Ordering::SeqCst);
            let id = format!("sub-{n}");
            let (tx, rx) = mpsc::unbounded_channel();
            self.subscriptions.lock().insert(id.clone(), tx);
            self.created.lock().push(id.clone());

            Ok(Subscription {
                id,
                unsubscribe_method: unsubscribe_method.to_string(),
                notifications: rx,
            })
        })
    }

    fn unsubscribe(&self, method: &str, subscription_id: &str) -> WsResult<()> {
        self.subscriptions.lock().remove(subscription_id);
        self.unsubscribes
            .lock()
            .push((method.to_string(), subscription_id.to_string()));
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.close_count.fetch_add(1, Ordering::SeqCst);
        self.subscriptions.lock().clear();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
