#[cfg(feature = "async")]
use std::time::{Duration, Instant};

/// Poll `check` every `interval` until it returns true or `timeout` elapses.
///
/// Returns whether the condition was met. The first check runs immediately.
#[cfg(feature = "async")]
pub async fn poll_until<F>(mut check: F, interval: Duration, timeout: Duration, what: &str) -> bool
where
    F: FnMut() -> bool,
{
    let started = Instant::now();
    let mut polls = 0u32;

    loop {
        polls += 1;
        if check() {
            tracing::debug!(
                what,
                polls,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Condition met"
            );
            return true;
        }
        if started.elapsed() >= timeout {
            tracing::warn!(what, polls, timeout_ms = timeout.as_millis() as u64, "Gave up waiting");
            return false;
        }
        tokio::time::sleep(interval).await;
    }
}
