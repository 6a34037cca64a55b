//! WebSocket session.
//!
//! Handles the connection lifecycle for a streaming-socket node address:
//! connect attempts with exponential backoff, transport signals for the
//! bootstrapper, the JSON-RPC message loop, and keep-alive.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::{mpsc, Mutex as TokioMutex};
use tokio_tungstenite::{connect_async_tls_with_config, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{WsError, WsResult};
use crate::heartbeat::HeartbeatManager;
use crate::message::IncomingMessage;
use crate::rpc_handle::{RpcHandle, WsOutbound};
use crate::subscription::RequestRegistry;
use crate::transport::{BoxFuture, PendingSession, Subscription, Transport, TransportSignal};

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// WebSocket URL.
    pub url: String,
    /// Base delay for exponential backoff.
    pub reconnect_base_delay_ms: u64,
    /// Maximum delay for exponential backoff.
    pub reconnect_max_delay_ms: u64,
    /// Idle time before a keep-alive ping.
    pub heartbeat_interval_ms: u64,
    /// Pong must arrive within this.
    pub heartbeat_timeout_ms: u64,
    /// Per-request response timeout.
    pub request_timeout_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            reconnect_base_delay_ms: 500,
            reconnect_max_delay_ms: 5_000,
            heartbeat_interval_ms: 30_000,
            heartbeat_timeout_ms: 10_000,
            request_timeout_ms: 30_000,
        }
    }
}

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Closed,
}

/// WebSocket session to a node.
pub struct WsSession {
    config: ConnectionConfig,
    state: Arc<RwLock<ConnectionState>>,
    registry: Arc<RequestRegistry>,
    heartbeat: HeartbeatManager,
    handle: RpcHandle,
    /// Outbound frame receiver (consumed by the message loop).
    outbound_rx: TokioMutex<mpsc::Receiver<WsOutbound>>,
    shutdown_token: CancellationToken,
}

impl WsSession {
    /// Create a new, idle session.
    pub fn new(config: ConnectionConfig) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::channel(256);
        let state = Arc::new(RwLock::new(ConnectionState::Disconnected));
        let registry = Arc::new(RequestRegistry::new());
        let handle = RpcHandle::new(
            outbound_tx,
            state.clone(),
            registry.clone(),
            Duration::from_millis(config.request_timeout_ms),
        );

        Self {
            heartbeat: HeartbeatManager::new(
                config.heartbeat_interval_ms,
                config.heartbeat_timeout_ms,
            ),
            config,
            state,
            registry,
            handle,
            outbound_rx: TokioMutex::new(outbound_rx),
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Spawn the connection loop and return the pending session.
    ///
    /// Must be called within a tokio runtime. Signals are emitted for every
    /// failed attempt and every successful connect until `close` is called.
    pub fn start(config: ConnectionConfig) -> PendingSession {
        let session = Arc::new(Self::new(config));
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();

        let runner = session.clone();
        tokio::spawn(async move {
            runner.run(signal_tx).await;
        });

        PendingSession {
            transport: session,
            signals: signal_rx,
        }
    }

    async fn run(&self, signals: mpsc::UnboundedSender<TransportSignal>) {
        let mut attempt = 0u32;

        loop {
            if self.shutdown_token.is_cancelled() {
                break;
            }

            *self.state.write() = if attempt == 0 {
                ConnectionState::Connecting
            } else {
                ConnectionState::Reconnecting
            };

            let result = self.try_connect(&signals).await;
            self.registry.fail_all("socket closed");

            if self.shutdown_token.is_cancelled() {
                break;
            }

            let reason = match result {
                Ok(()) => {
                    info!(url = %self.config.url, "WebSocket connection closed");
                    "stream ended".to_string()
                }
                Err(e) => {
                    error!(url = %self.config.url, error = %e, "WebSocket connection error");
                    e.to_string()
                }
            };

            attempt = if *self.state.read() == ConnectionState::Connected {
                1
            } else {
                attempt.saturating_add(1)
            };
            *self.state.write() = ConnectionState::Reconnecting;

            // Nobody may be listening once bootstrap has finished.
            let _ = signals.send(TransportSignal::Error(reason));

            let delay = self.calculate_backoff_delay(attempt);
            warn!(attempt, delay_ms = delay.as_millis() as u64, "Reconnecting");

            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = self.shutdown_token.cancelled() => break,
            }
        }

        *self.state.write() = ConnectionState::Closed;
        self.registry.fail_all("transport closed");
        debug!(url = %self.config.url, "Connection loop exited");
    }

    async fn try_connect(&self, signals: &mpsc::UnboundedSender<TransportSignal>) -> WsResult<()> {
        info!(url = %self.config.url, "Connecting to node");

        let connect = connect_async_tls_with_config(&self.config.url, None, true, None);
        let (ws_stream, _response) = tokio::select! {
            result = connect => result?,
            () = self.shutdown_token.cancelled() => return Ok(()),
        };
        let (mut write, mut read) = ws_stream.split();

        // Hold the outbound receiver for the lifetime of this socket.
        let mut outbound = self.outbound_rx.lock().await;
        // Frames queued while disconnected belong to requests that already failed.
        while outbound.try_recv().is_ok() {}

        self.heartbeat.reset();
        *self.state.write() = ConnectionState::Connected;
        info!(url = %self.config.url, "Node connected");
        let _ = signals.send(TransportSignal::Connected);

        loop {
            tokio::select! {
                biased;

                () = self.shutdown_token.cancelled() => {
                    info!("Shutdown signal received in message loop");
                    if let Err(e) = write.send(Message::Close(None)).await {
                        warn!(?e, "Failed to send Close frame during shutdown");
                    }
                    return Ok(());
                }

                msg = read.next() => {
                    self.heartbeat.record_message();
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.handle_text_message(&text);
                        }
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Pong(_))) => {
                            self.heartbeat.record_pong();
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let (code, reason) = frame
                                .map(|f| (f.code.into(), f.reason.to_string()))
                                .unwrap_or((1000, "Normal close".to_string()));
                            warn!(code, %reason, "WebSocket closed by node");
                            return Err(WsError::ConnectionClosed { code, reason });
                        }
                        Some(Err(e)) => {
                            return Err(e.into());
                        }
                        None => {
                            warn!("WebSocket stream ended");
                            return Ok(());
                        }
                        _ => {}
                    }
                }

                frame = outbound.recv() => {
                    match frame {
                        Some(WsOutbound::Text(text)) => {
                            write.send(Message::Text(text)).await?;
                        }
                        // All handles dropped; the session is unreachable.
                        None => return Ok(()),
                    }
                }

                () = self.heartbeat.wait_for_check() => {
                    if self.heartbeat.is_timed_out() {
                        error!("Heartbeat timeout");
                        return Err(WsError::HeartbeatTimeout);
                    }
                    if self.heartbeat.should_send_heartbeat() {
                        write.send(Message::Ping(Vec::new())).await?;
                        self.heartbeat.record_ping();
                        debug!("Sent keep-alive ping");
                    }
                }
            }
        }
    }

    fn handle_text_message(&self, text: &str) {
        match serde_json::from_str::<IncomingMessage>(text) {
            Ok(IncomingMessage::Response(response)) => {
                if let Some(orphan) = self.registry.handle_response(response) {
                    if let Err(e) = self.handle.unsubscribe(&orphan.unsubscribe_method, &orphan.id) {
                        warn!(subscription = %orphan.id, error = %e, "Failed to cancel orphaned subscription");
                    }
                }
            }
            Ok(IncomingMessage::Notification(notification)) => {
                self.registry.handle_notification(notification);
            }
            Err(e) => {
                warn!(error = %e, len = text.len(), "Unparseable frame from node");
            }
        }
    }

    fn calculate_backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.config.reconnect_base_delay_ms;
        let max = self.config.reconnect_max_delay_ms;

        // base * 2^(attempt-1), capped
        let exponent = attempt.saturating_sub(1).min(10);
        let delay = base.saturating_mul(1u64 << exponent).min(max);

        Duration::from_millis(delay + rand_jitter(base))
    }
}

impl Transport for WsSession {
    fn request<'a>(&'a self, method: &'a str, params: Value) -> BoxFuture<'a, WsResult<Value>> {
        Box::pin(async move {
            if self.is_closed() {
                return Err(WsError::Closed);
            }
            self.handle.call(method, params).await
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
            self.handle
                .subscribe(method, params, unsubscribe_method)
                .await
        })
    }

    fn unsubscribe(&self, method: &str, subscription_id: &str) -> WsResult<()> {
        self.handle.unsubscribe(method, subscription_id)
    }

    fn close(&self) {
        if !self.shutdown_token.is_cancelled() {
            info!(url = %self.config.url, "Closing node session");
            self.shutdown_token.cancel();
        }
    }

    fn is_closed(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }
}

/// Random jitter in `[0, base/4]` ms.
fn rand_jitter(base_ms: u64) -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    let span = (base_ms / 4).max(1);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    u64::from(nanos) % span
}
