//! Deadline for wrapper calls
//!
//! The native side cannot be interrupted. On timeout the caller stops
//! waiting, but the call keeps running on the blocking pool until it
//! finishes and its result is dropped.

use std::time::Duration;
use crate::host::HostError;

/// Run `f` on tokio's blocking pool and wait at most `limit` for it
pub async fn call_with_timeout<T, F>(limit: Duration, f: F) -> Result<T, HostError>
where
    F: FnOnce() -> Result<T, HostError> + Send + 'static,
    T: Send + 'static,
{
    let task = tokio::task::spawn_blocking(f);
    match tokio::time::timeout(limit, task).await {
        Ok(joined) => joined?,
        Err(_) => Err(HostError::Timeout(limit)),
    }
}
