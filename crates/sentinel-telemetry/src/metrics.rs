//! Prometheus metrics for the sentinel execution core.
//!
//! Exposed for an external observability collaborator:
//! - Trade accept/reject counts with reasons
//! - Endpoint health states
//! - Current drawdown and exposure fraction
//! - Submission outcomes and latency
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. If registration
//! fails it indicates a fatal configuration error (e.g., duplicate
//! metric names) that should crash at startup rather than fail
//! silently. These panics only occur during static initialization.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, register_histogram_vec,
    register_int_gauge, CounterVec, Gauge, GaugeVec, HistogramVec, IntGauge,
};

/// Total trade candidates accepted by the risk gate.
pub static TRADES_ACCEPTED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "sentinel_trades_accepted_total",
        "Total trade candidates accepted by the risk gate",
        &["token", "side"]
    )
    .unwrap()
});

/// Total trade candidates rejected, by gate and reason.
pub static TRADES_REJECTED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "sentinel_trades_rejected_total",
        "Total trade candidates rejected by the risk gate",
        &["reason", "token"]
    )
    .unwrap()
});

/// Endpoint health state (0=healthy, 1=degraded, 2=blacklisted).
pub static ENDPOINT_STATE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "sentinel_endpoint_state",
        "RPC endpoint health state (0=healthy, 1=degraded, 2=blacklisted)",
        &["endpoint"]
    )
    .unwrap()
});

/// Total submissions, by endpoint and outcome.
pub static SUBMISSIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "sentinel_submissions_total",
        "Total RPC submissions by outcome",
        &["endpoint", "outcome"]
    )
    .unwrap()
});

/// Submission latency in milliseconds.
pub static SUBMISSION_LATENCY_MS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "sentinel_submission_latency_ms",
        "RPC submission latency in milliseconds",
        &["endpoint"],
        vec![10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0]
    )
    .unwrap()
});

/// Current drawdown from peak equity (fraction).
pub static DRAWDOWN: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "sentinel_drawdown",
        "Current drawdown from peak equity (fraction)"
    )
    .unwrap()
});

/// Current exposure as a fraction of balance.
pub static EXPOSURE_FRACTION: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "sentinel_exposure_fraction",
        "Open exposure as a fraction of balance"
    )
    .unwrap()
});

/// Circuit breaker state (1=halted, 0=running).
pub static CIRCUIT_HALTED: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "sentinel_circuit_halted",
        "Circuit breaker state (1=halted, 0=running)"
    )
    .unwrap()
});

/// Total circuit breaker halts by reason.
pub static CIRCUIT_HALTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "sentinel_circuit_halts_total",
        "Total circuit breaker halts by reason",
        &["reason"]
    )
    .unwrap()
});

/// Total rate admission rejections by scope.
pub static ADMISSION_REJECTED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "sentinel_admission_rejected_total",
        "Total rate admission rejections by scope",
        &["scope"]
    )
    .unwrap()
});

/// Open position count.
pub static OPEN_POSITIONS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("sentinel_open_positions", "Number of open positions").unwrap()
});

/// Realized PnL per closed position.
pub static POSITION_PNL: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "sentinel_position_pnl",
        "Realized PnL per closed position (quote currency)",
        &["token", "close_reason"],
        vec![-100.0, -50.0, -20.0, -10.0, -5.0, 0.0, 5.0, 10.0, 20.0, 50.0, 100.0, 200.0]
    )
    .unwrap()
});

/// Metrics facade for easy access.
pub struct Metrics;

impl Metrics {
    /// Record an accepted candidate.
    pub fn trade_accepted(token: &str, side: &str) {
        TRADES_ACCEPTED_TOTAL.with_label_values(&[token, side]).inc();
    }

    /// Record a rejected candidate with its structured reason.
    pub fn trade_rejected(reason: &str, token: &str) {
        TRADES_REJECTED_TOTAL
            .with_label_values(&[reason, token])
            .inc();
    }

    /// Update an endpoint's health state gauge.
    pub fn endpoint_state(endpoint: &str, state: u8) {
        ENDPOINT_STATE
            .with_label_values(&[endpoint])
            .set(state as f64);
    }

    /// Record a submission outcome.
    pub fn submission(endpoint: &str, outcome: &str) {
        SUBMISSIONS_TOTAL
            .with_label_values(&[endpoint, outcome])
            .inc();
    }

    /// Record submission latency.
    pub fn submission_latency(endpoint: &str, latency_ms: f64) {
        SUBMISSION_LATENCY_MS
            .with_label_values(&[endpoint])
            .observe(latency_ms);
    }

    /// Update the drawdown gauge.
    pub fn drawdown(fraction: f64) {
        DRAWDOWN.set(fraction);
    }

    /// Update the exposure fraction gauge.
    pub fn exposure_fraction(fraction: f64) {
        EXPOSURE_FRACTION.set(fraction);
    }

    /// Set circuit breaker state.
    pub fn circuit_halted(halted: bool) {
        CIRCUIT_HALTED.set(if halted { 1 } else { 0 });
    }

    /// Record a circuit breaker halt.
    pub fn circuit_halt(reason: &str) {
        CIRCUIT_HALTS_TOTAL.with_label_values(&[reason]).inc();
    }

    /// Record a rate admission rejection.
    pub fn admission_rejected(scope: &str) {
        ADMISSION_REJECTED_TOTAL.with_label_values(&[scope]).inc();
    }

    /// Update the open position count.
    pub fn open_positions(count: i64) {
        OPEN_POSITIONS.set(count);
    }

    /// Record realized PnL for a closed position.
    pub fn position_pnl(token: &str, close_reason: &str, pnl: f64) {
        POSITION_PNL
            .with_label_values(&[token, close_reason])
            .observe(pnl);
    }
}
