//! Bounded retry with linear backoff.

use std::future::Future;
use std::time::Duration;

/// Run `op` up to `attempts` times, sleeping `attempt * base` between tries.
///
/// Returns the first success, or the last error once the bound is reached.
/// `attempts` of zero is treated as one.
pub async fn retry_n<T, E, F, Fut>(attempts: u32, base: Duration, what: &str, mut op: F) -> Result<T, E>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(error) if attempt >= attempts => {
                tracing::warn!(what, attempt, %error, "Giving up");
                return Err(error);
            }
            Err(error) => {
                tracing::warn!(what, attempt, attempts, %error, "Error, pausing and trying again");
                tokio::time::sleep(base * attempt).await;
                attempt += 1;
            }
        }
    }
}
