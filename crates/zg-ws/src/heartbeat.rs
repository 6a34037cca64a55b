//! Keep-alive management for WebSocket sessions.
//!
//! Sends protocol-level pings when the socket has been idle and detects
//! missing pongs.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug)]
struct HeartbeatState {
    last_ping: Option<Instant>,
    last_message: Instant,
    waiting_for_pong: bool,
}

/// Heartbeat manager for WebSocket connection health.
pub struct HeartbeatManager {
    /// Idle time before a ping is sent.
    interval: Duration,
    /// How long to wait for the pong.
    timeout: Duration,
    state: Mutex<HeartbeatState>,
}

impl HeartbeatManager {
    /// Create a new heartbeat manager.
    pub fn new(interval_ms: u64, timeout_ms: u64) -> Self {
        Self {
            interval: Duration::from_millis(interval_ms),
            timeout: Duration::from_millis(timeout_ms),
            state: Mutex::new(HeartbeatState {
                last_ping: None,
                last_message: Instant::now(),
                waiting_for_pong: false,
            }),
        }
    }

    /// Reset heartbeat state (called on connection).
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.last_ping = None;
        state.last_message = Instant::now();
        state.waiting_for_pong = false;
    }

    /// Record that a ping was sent.
    pub fn record_ping(&self) {
        let mut state = self.state.lock();
        state.last_ping = Some(Instant::now());
        state.waiting_for_pong = true;
    }

    /// Record that a pong was received.
    pub fn record_pong(&self) {
        let now = Instant::now();
        let mut state = self.state.lock();
        state.last_message = now;
        state.waiting_for_pong = false;

        if let Some(ping) = state.last_ping {
            debug!(rtt_ms = now.duration_since(ping).as_millis() as u64, "Received pong");
        }
    }

    /// Record that any frame was received.
    pub fn record_message(&self) {
        self.state.lock().last_message = Instant::now();
    }

    /// Check if the outstanding ping has gone unanswered too long.
    pub fn is_timed_out(&self) -> bool {
        let state = self.state.lock();
        match (state.waiting_for_pong, state.last_ping) {
            (true, Some(ping)) => ping.elapsed() > self.timeout,
            _ => false,
        }
    }

    /// Check if a ping should be sent now.
    pub fn should_send_heartbeat(&self) -> bool {
        let state = self.state.lock();
        !state.waiting_for_pong && state.last_message.elapsed() >= self.interval
    }

    /// Wait for the next heartbeat check.
    pub async fn wait_for_check(&self) {
        let step = (self.interval / 2).min(self.timeout / 2).max(Duration::from_millis(10));
        tokio::time::sleep(step).await;
    }

}
