// Metrics module for Prometheus observability
// Author: kelexine (https://github.com/kelexine)

mod registry;

use std::time::Duration;

pub use registry::{
    gather_metrics, ACTIVE_SESSIONS, AUTH_FAILURES, COOKIE_REFRESHES, GEMINI_CALLS,
    GEMINI_DURATION, REQUESTS_TOTAL, REQUEST_DURATION, SSE_STREAMS, TOKENS_TOTAL,
};

/// Helper to record request metrics
pub fn record_request(endpoint: &str, status_code: u16, model: &str, duration: Duration) {
    let status = status_code.to_string();
    REQUESTS_TOTAL
        .with_label_values(&[endpoint, &status, model])
        .inc();

    REQUEST_DURATION
        .with_label_values(&[endpoint, &status])
        .observe(duration.as_secs_f64());
}

/// Helper to record Gemini web call metrics
pub fn record_gemini_call(model: &str, success: bool, duration: Duration) {
    let outcome = if success { "success" } else { "failure" };
    GEMINI_CALLS.with_label_values(&[model, outcome]).inc();
    GEMINI_DURATION
        .with_label_values(&[model])
        .observe(duration.as_secs_f64());
}

/// Helper to record estimated token usage
pub fn record_tokens(model: &str, prompt: u32, completion: u32) {
    if prompt > 0 {
        TOKENS_TOTAL
            .with_label_values(&[model, "prompt"])
            .inc_by(prompt as f64);
    }
    if completion > 0 {
        TOKENS_TOTAL
            .with_label_values(&[model, "completion"])
            .inc_by(completion as f64);
    }
}

pub fn record_auth_failure(reason: &str) {
    AUTH_FAILURES.with_label_values(&[reason]).inc();
}

pub fn record_cookie_refresh(success: bool) {
    let status = if success { "success" } else { "failure" };
    COOKIE_REFRESHES.with_label_values(&[status]).inc();
}

pub fn set_active_sessions(count: usize) {
    ACTIVE_SESSIONS.set(count as f64);
}

pub fn record_sse_stream(status: &str) {
    SSE_STREAMS.with_label_values(&[status]).inc();
}
