//! Structured logging and secret-masking trace utilities.
//!
//! This module configures the `tracing` ecosystem for the application,
//! supporting multiple output formats and providing utilities to prevent
//! Gemini session cookies and client API keys from leaking into logs.
//!
//! Author: kelexine (<https://github.com/kelexine>)

use crate::config::LoggingConfig;
use crate::error::{ProxyError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static SANITIZE_ENABLED: AtomicBool = AtomicBool::new(true);

/// `__Secure-1PSID` values look like `g.a000...`.
static PSID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"g\.a0[0-9A-Za-z_\-\.]+").expect("valid PSID regex"));

/// `__Secure-1PSIDTS` values look like `sidts-...`.
static PSIDTS_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"sidts-[0-9A-Za-z_\-]+").expect("valid PSIDTS regex"));

/// Client API keys.
static API_KEY_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"sk-[0-9A-Za-z_\-]{4}[0-9A-Za-z_\-]*").expect("valid key regex"));

/// Initializes the global tracing subscriber for the application.
///
/// Supports three output formats:
/// - `json`: Structured JSON logs for production ingestion.
/// - `compact`: Single-line human-readable output.
/// - `pretty` (default): Multi-line, colorized output for development.
///
/// Log levels are controlled via the `RUST_LOG` environment variable or
/// the provided `LoggingConfig`.
pub fn init(config: &LoggingConfig) -> Result<()> {
    SANITIZE_ENABLED.store(config.sanitize_tokens, Ordering::Relaxed);

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.level.to_ascii_lowercase()))
        .map_err(|e| ProxyError::Config(format!("Invalid log level '{}': {}", config.level, e)))?;

    let registry = tracing_subscriber::registry().with(env_filter);

    let result = match config.format.as_str() {
        "json" => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
        "compact" => registry
            .with(tracing_subscriber::fmt::layer().compact())
            .try_init(),
        _ => registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init(),
    };

    result.map_err(|e| ProxyError::Internal(format!("Failed to install tracing subscriber: {}", e)))
}

/// Masks Gemini cookies and client API keys in a log message.
///
/// PSID and PSIDTS cookie values are replaced entirely. API keys keep their
/// first seven characters so operators can tell keys apart.
pub fn sanitize(input: &str) -> String {
    if !SANITIZE_ENABLED.load(Ordering::Relaxed) {
        return input.to_string();
    }

    let result = PSID_PATTERN.replace_all(input, "[REDACTED_PSID]");
    let result = PSIDTS_PATTERN.replace_all(&result, "[REDACTED_PSIDTS]");
    let result = API_KEY_PATTERN.replace_all(&result, |caps: &regex::Captures| {
        format!("{}...", &caps[0][..7])
    });

    result.into_owned()
}

/// Short preview of a secret for logs: the first `n` characters.
pub fn preview(secret: &str, n: usize) -> String {
    let head: String = secret.chars().take(n).collect();
    format!("{}...", head)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_psid() {
        let input = "Cookie: __Secure-1PSID=g.a000xQiABCdef-123_x.y; other=1";
        let output = sanitize(input);
        assert!(output.contains("[REDACTED_PSID]"));
        assert!(!output.contains("g.a000xQiABCdef"));
        assert!(output.contains("other=1"));
    }

    #[test]
    fn test_sanitize_psidts() {
        let input = "rotated __Secure-1PSIDTS=sidts-CjIB5H03abc_def";
        let output = sanitize(input);
        assert!(output.contains("[REDACTED_PSIDTS]"));
        assert!(!output.contains("CjIB5H03"));
    }

    #[test]
    fn test_sanitize_api_key_keeps_prefix() {
        let input = "Unknown API key: sk-demo1234567890abcdef";
        let output = sanitize(input);
        assert!(output.contains("sk-demo..."));
        assert!(!output.contains("1234567890abcdef"));
    }

    #[test]
    fn test_preview() {
        assert_eq!(preview("sidts-abcdefgh", 6), "sidts-...");
        assert_eq!(preview("ab", 6), "ab...");
    }
}
