//! Prometheus metrics for zg clients.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. If registration fails,
//! it indicates a fatal configuration error (e.g., duplicate metric names)
//! that should cause an immediate crash at startup rather than silent failure.
//! These panics only occur during static initialization, never at runtime.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_int_counter, register_int_gauge, CounterVec, Encoder,
    IntCounter, IntGauge, TextEncoder,
};

use crate::error::{TelemetryError, TelemetryResult};

/// Bootstrap attempts by outcome.
/// Labels: outcome (success/unsupported_protocol/connect_timeout/retry_exhausted/...)
pub static BOOTSTRAP_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "zg_bootstrap_total",
        "Bootstrap attempts by outcome",
        &["outcome"]
    )
    .unwrap()
});

/// Transient transport errors observed while bootstrapping.
pub static TRANSPORT_ERRORS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "zg_transport_errors_total",
        "Transient transport errors observed during bootstrap"
    )
    .unwrap()
});

/// Operations accepted into a status stream.
pub static TX_SUBMITTED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "zg_tx_submitted_total",
        "Operations accepted by the node into a status stream"
    )
    .unwrap()
});

/// Terminal transaction outcomes.
/// Labels: outcome (finalized/node_error/dropped/invalid/retracted/subscription_lost/cancelled)
pub static TX_OUTCOME_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "zg_tx_outcome_total",
        "Terminal transaction outcomes",
        &["outcome"]
    )
    .unwrap()
});

/// Transactions currently being observed.
pub static TX_INFLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("zg_tx_inflight", "Transactions currently being observed").unwrap()
});

/// Unsubscribe calls issued for status streams.
pub static UNSUBSCRIBE_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "zg_unsubscribe_total",
        "Unsubscribe calls issued for transaction status streams"
    )
    .unwrap()
});

/// Auxiliary service availability (1 = available).
pub static AUX_AVAILABLE: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "zg_aux_available",
        "Auxiliary read service availability (1=available)"
    )
    .unwrap()
});

/// Metrics facade for easy access.
pub struct Metrics;

impl Metrics {
    /// Record a bootstrap outcome.
    pub fn bootstrap(outcome: &str) {
        BOOTSTRAP_TOTAL.with_label_values(&[outcome]).inc();
    }

    /// Record a transient transport error.
    pub fn transport_error() {
        TRANSPORT_ERRORS_TOTAL.inc();
    }

    /// Record an operation entering its status stream.
    pub fn tx_submitted() {
        TX_SUBMITTED_TOTAL.inc();
        TX_INFLIGHT.inc();
    }

    /// Record a terminal outcome for an observed transaction.
    pub fn tx_outcome(outcome: &str) {
        TX_OUTCOME_TOTAL.with_label_values(&[outcome]).inc();
        TX_INFLIGHT.dec();
    }

    /// Record an unsubscribe call.
    pub fn unsubscribed() {
        UNSUBSCRIBE_TOTAL.inc();
    }

    /// Set auxiliary service availability.
    pub fn aux_available(available: bool) {
        AUX_AVAILABLE.set(i64::from(available));
    }

    /// Render every registered metric in the Prometheus text format.
    pub fn render() -> TelemetryResult<String> {
        let families = prometheus::gather();
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&families, &mut buffer)
            .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| TelemetryError::Metrics(e.to_string()))
    }
}
