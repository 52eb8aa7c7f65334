//! Prometheus metrics for the puddle world server.
//!
//! Tracks protocol traffic, session churn and episode outcomes across all
//! connected agents.

use lazy_static::lazy_static;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Once;
use tracing::warn;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // ========== Protocol Metrics ==========

    /// Requests handled, by message kind
    pub static ref REQUESTS: IntCounterVec = IntCounterVec::new(
        Opts::new("puddle_requests_total", "Protocol requests handled"),
        &["kind"]
    ).expect("valid metric definition");

    /// Error responses sent, by error kind
    pub static ref ERRORS: IntCounterVec = IntCounterVec::new(
        Opts::new("puddle_errors_total", "Error responses sent"),
        &["kind"]
    ).expect("valid metric definition");

    /// Request handling latency by message kind
    pub static ref REQUEST_LATENCY: HistogramVec = HistogramVec::new(
        HistogramOpts::new("puddle_request_duration_seconds", "Protocol request latency")
            .buckets(vec![0.00001, 0.0001, 0.001, 0.01, 0.1]),
        &["kind"]
    ).expect("valid metric definition");

    // ========== Session Metrics ==========

    /// Sessions created since start
    pub static ref SESSIONS_CREATED: IntCounter = IntCounter::with_opts(
        Opts::new("puddle_sessions_created_total", "Agent sessions created")
    ).expect("valid metric definition");

    /// Currently registered sessions
    pub static ref SESSIONS_ACTIVE: IntGauge = IntGauge::with_opts(
        Opts::new("puddle_sessions_active", "Currently registered agent sessions")
    ).expect("valid metric definition");

    // ========== Episode Metrics ==========

    /// Actions applied across all sessions
    pub static ref STEPS_TAKEN: IntCounter = IntCounter::with_opts(
        Opts::new("puddle_steps_total", "Actions applied across all sessions")
    ).expect("valid metric definition");

    /// Episodes concluded across all sessions
    pub static ref EPISODES_COMPLETED: IntCounter = IntCounter::with_opts(
        Opts::new("puddle_episodes_completed_total", "Episodes concluded")
    ).expect("valid metric definition");

    /// Episodes whose cumulative reward met the success threshold
    pub static ref EPISODES_SUCCESSFUL: IntCounter = IntCounter::with_opts(
        Opts::new("puddle_episodes_successful_total", "Episodes that met the success threshold")
    ).expect("valid metric definition");
}

static INIT: Once = Once::new();

/// Initialize and register all metrics with the registry.
/// Safe to call multiple times - only initializes once.
pub fn init_metrics() {
    INIT.call_once(|| {
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(REQUESTS.clone()),
            Box::new(ERRORS.clone()),
            Box::new(REQUEST_LATENCY.clone()),
            Box::new(SESSIONS_CREATED.clone()),
            Box::new(SESSIONS_ACTIVE.clone()),
            Box::new(STEPS_TAKEN.clone()),
            Box::new(EPISODES_COMPLETED.clone()),
            Box::new(EPISODES_SUCCESSFUL.clone()),
        ];
        for collector in collectors {
            if let Err(e) = REGISTRY.register(collector) {
                warn!("Failed to register metric: {}", e);
            }
        }
    });
}

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!("Failed to encode metrics: {}", e);
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_init() {
        init_metrics();
        init_metrics();
    }

    #[test]
    fn test_encode_metrics() {
        init_metrics();
        SESSIONS_CREATED.inc();
        REQUESTS.with_label_values(&["get_state"]).inc();
        let output = encode_metrics();
        assert!(output.contains("puddle_sessions_created_total"));
        assert!(output.contains("puddle_requests_total"));
    }
}
