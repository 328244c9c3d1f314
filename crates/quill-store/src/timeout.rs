//! Upper bound on store round trips.

use crate::{StoreError, StoreResult};
use std::future::Future;
use std::time::Duration;

/// Wraps a store operation with a timeout.
pub async fn with_timeout<F, Fut, T>(duration: Duration, f: F) -> StoreResult<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = StoreResult<T>>,
{
    tokio::time::timeout(duration, f())
        .await
        .map_err(|_| StoreError::Timeout(duration))?
}
