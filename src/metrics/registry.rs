// Prometheus metrics registry and collectors
// Author: kelexine (https://github.com/kelexine)

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec_with_registry, register_gauge_with_registry,
    register_histogram_vec_with_registry, CounterVec, Encoder, Gauge, HistogramVec, Opts,
    Registry, TextEncoder,
};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // ============================================================================
    // REQUEST METRICS
    // ============================================================================

    /// Total number of API requests
    pub static ref REQUESTS_TOTAL: CounterVec = register_counter_vec_with_registry!(
        Opts::new("requests_total", "Total number of API requests"),
        &["endpoint", "status_code", "model"],
        REGISTRY
    ).expect("requests_total registers once");

    /// Request duration histogram
    pub static ref REQUEST_DURATION: HistogramVec = register_histogram_vec_with_registry!(
        prometheus::HistogramOpts::new("request_duration_seconds", "Request duration in seconds")
            .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["endpoint", "status_code"],
        REGISTRY
    ).expect("request_duration_seconds registers once");

    /// Rejected authentication attempts
    pub static ref AUTH_FAILURES: CounterVec = register_counter_vec_with_registry!(
        Opts::new("auth_failures_total", "Total rejected API key checks"),
        &["reason"], // reason: missing, invalid, permission
        REGISTRY
    ).expect("auth_failures_total registers once");

    // ============================================================================
    // GEMINI METRICS
    // ============================================================================

    /// Gemini web calls
    pub static ref GEMINI_CALLS: CounterVec = register_counter_vec_with_registry!(
        Opts::new("gemini_calls_total", "Total Gemini web generate calls"),
        &["model", "outcome"], // outcome: success, failure
        REGISTRY
    ).expect("gemini_calls_total registers once");

    /// Gemini web call duration
    pub static ref GEMINI_DURATION: HistogramVec = register_histogram_vec_with_registry!(
        prometheus::HistogramOpts::new("gemini_call_duration_seconds", "Gemini web call duration")
            .buckets(vec![0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 60.0]),
        &["model"],
        REGISTRY
    ).expect("gemini_call_duration_seconds registers once");

    /// Estimated tokens
    pub static ref TOKENS_TOTAL: CounterVec = register_counter_vec_with_registry!(
        Opts::new("tokens_estimated_total", "Estimated tokens processed"),
        &["model", "type"], // type: prompt, completion
        REGISTRY
    ).expect("tokens_estimated_total registers once");

    /// Cookie rotations
    pub static ref COOKIE_REFRESHES: CounterVec = register_counter_vec_with_registry!(
        Opts::new("cookie_refreshes_total", "Total Gemini cookie rotations"),
        &["status"], // status: success, failure
        REGISTRY
    ).expect("cookie_refreshes_total registers once");

    // ============================================================================
    // SESSION & STREAMING METRICS
    // ============================================================================

    /// Conversations currently held by the session store
    pub static ref ACTIVE_SESSIONS: Gauge = register_gauge_with_registry!(
        Opts::new("sessions_active", "Conversations held in the session store"),
        REGISTRY
    ).expect("sessions_active registers once");

    /// SSE stream lifecycle
    pub static ref SSE_STREAMS: CounterVec = register_counter_vec_with_registry!(
        Opts::new("sse_streams_total", "Total SSE streams"),
        &["status"], // status: opened, completed, error
        REGISTRY
    ).expect("sse_streams_total registers once");
}

/// Gather all metrics and return as Prometheus text format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
