//! Bounded retry with exponential backoff for transient external failures.

use std::future::Future;
use std::time::Duration;

/// Maximum number of attempts made for a single external call.
pub(crate) const MAX_ATTEMPTS: u32 = 3;

/// Base delay before the first retry; doubles on each subsequent attempt.
pub(crate) const BASE_DELAY: Duration = Duration::from_millis(250);

/// Run `operation` up to `max_attempts` times, sleeping between attempts.
///
/// `is_transient` classifies errors; a non-transient error aborts immediately.
/// The final error is returned unchanged once attempts are exhausted.
pub(crate) async fn retry_with_backoff<T, E, F, Fut, P>(
    max_attempts: u32,
    base_delay: Duration,
    mut operation: F,
    is_transient: P,
) -> Result<T, E>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let mut delay = base_delay;
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) if attempt < max_attempts && is_transient(&error) => {
                tracing::warn!(attempt, error = %error, "Transient failure; retrying");
                tokio::time::sleep(delay).await;
                delay *= 2;
                attempt += 1;
            }
            Err(error) => return Err(error),
        }
    }
}
