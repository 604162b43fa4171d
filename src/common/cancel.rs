//! Shutdown-aware wrappers for outward I/O.

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::common::error::{RelayError, RelayResult};

/// Run `fut` unless `cancel` fires first.
///
/// Every outward send goes through this so a shutdown is observed while a
/// request is still in flight.
pub async fn until_cancelled<T, F>(cancel: &CancellationToken, fut: F) -> RelayResult<T>
where
    F: Future<Output = RelayResult<T>>,
{
    if cancel.is_cancelled() {
        return Err(RelayError::Cancelled);
    }

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(RelayError::Cancelled),
        result = fut => result,
    }
}
