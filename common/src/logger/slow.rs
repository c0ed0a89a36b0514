use std::future::Future;
use std::time::Duration;

/// Times `fut` and logs a `warn` if it took longer than `max`. Used to
/// wrap every external oracle/store call so a slow collaborator is
/// visible without making the call itself fail.
pub async fn warn_if_slow<F, T>(label: &'static str, max: Duration, fut: F) -> T
where
    F: Future<Output = T>,
{
    let start = std::time::Instant::now();
    let out = fut.await;
    let elapsed = start.elapsed();
    if elapsed > max {
        tracing::warn!(
            target: "performance",
            label = label,
            elapsed_ms = elapsed.as_millis() as u64,
            "slow operation detected"
        );
    }
    out
}
