//! Cancellation-propagation helper shared by the admission paths.
//!
//! spec.md §5 requires every external I/O call to carry a propagated
//! deadline/cancellation token, and singles out §4.3 step 4 and §4.4
//! step 5 as the windows where a cancellation can leave a committed
//! increment/insert uncompensated (`MeterError::StoreIncomplete`).
//! Earlier, read-only steps surface a plain cancellation as a
//! `MeterError::StoreError` instead, since nothing has been committed
//! yet that could be left inconsistent.
//!
//! A token that is already cancelled is checked up front rather than
//! left to race `fut` in `select!`: against an in-memory store whose
//! future resolves on its first poll, an unbiased race between an
//! already-ready `token.cancelled()` and an already-ready `fut` is a
//! coin flip. The upfront check makes the already-cancelled case
//! deterministic; `biased` ordering (favoring the cancellation branch)
//! covers the remaining window where cancellation lands while `fut` is
//! still suspended.

use std::future::Future;

use domain::MeterError;
use tokio_util::sync::CancellationToken;

/// Races `fut` against `token`; a cancellation before `fut` resolves is
/// reported as a transport-level failure.
pub(crate) async fn cancellable<T>(
    token: &CancellationToken,
    fut: impl Future<Output = Result<T, MeterError>>,
) -> Result<T, MeterError> {
    if token.is_cancelled() {
        return Err(MeterError::StoreError(anyhow::anyhow!("request cancelled")));
    }
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(MeterError::StoreError(anyhow::anyhow!("request cancelled"))),
        res = fut => res,
    }
}

/// Races `fut` against `token` at a commit point (spec.md §4.3 step 4 /
/// §4.4 step 5) where a cancellation may leave accounting state
/// undefined rather than merely aborted.
pub(crate) async fn cancellable_incomplete<T>(
    token: &CancellationToken,
    context: &str,
    fut: impl Future<Output = Result<T, MeterError>>,
) -> Result<T, MeterError> {
    if token.is_cancelled() {
        return Err(MeterError::StoreIncomplete(context.to_string()));
    }
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(MeterError::StoreIncomplete(context.to_string())),
        res = fut => res,
    }
}
