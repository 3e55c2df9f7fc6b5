//! Deadline wrapper for suspension points in the query path.

use mitra_core::{AppError, AppResult};
use std::future::Future;
use std::time::Duration;

/// Run `fut` with a deadline of `seconds`.
///
/// On expiry the future is dropped (cancelling any in-flight request) and
/// `AppError::Timeout` is returned.
pub async fn with_timeout<T, F>(operation: &str, seconds: u64, fut: F) -> AppResult<T>
where
    F: Future<Output = AppResult<T>>,
{
    match tokio::time::timeout(Duration::from_secs(seconds), fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!("{} timed out after {}s", operation, seconds);
            Err(AppError::Timeout {
                operation: operation.to_string(),
                seconds,
            })
        }
    }
}
