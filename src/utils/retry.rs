// Bounded retry with exponential backoff for upstream session calls
// Author: kelexine (https://github.com/kelexine)

use backoff::{backoff::Backoff, ExponentialBackoff};
use std::time::Duration;
use tracing::debug;

/// Failure of a single attempt: HTTP status (0 for transport errors) and a
/// short description.
pub type AttemptError = (u16, String);

/// Create exponential backoff configuration for retries
pub fn create_backoff() -> ExponentialBackoff {
    ExponentialBackoff {
        current_interval: Duration::from_millis(250),
        initial_interval: Duration::from_millis(250),
        randomization_factor: 0.3,
        multiplier: 2.0,
        max_interval: Duration::from_secs(5),
        max_elapsed_time: Some(Duration::from_secs(30)),
        ..Default::default()
    }
}

/// Determine if an attempt failure is worth repeating.
///
/// Transport errors (status 0) and server-side statuses are retried;
/// 401/403 mean the cookies are stale and retrying the same call cannot help.
pub fn is_retryable(status: u16) -> bool {
    matches!(status, 0 | 429 | 500 | 502 | 503 | 504)
}

/// Execute `operation` up to `max_attempts` times.
pub async fn with_retry<F, Fut, T>(
    operation_name: &str,
    max_attempts: u32,
    mut operation: F,
) -> Result<T, AttemptError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, AttemptError>>,
{
    let mut backoff = create_backoff();
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    debug!("{} succeeded on attempt {}", operation_name, attempt);
                }
                return Ok(result);
            }
            Err((status, error_body)) => {
                if !is_retryable(status) || attempt >= max_attempts {
                    return Err((status, error_body));
                }

                let delay = backoff.next_backoff().unwrap_or(Duration::from_secs(5));
                debug!(
                    "{} failed with {} (attempt {}), retrying after {}ms",
                    operation_name,
                    status,
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
