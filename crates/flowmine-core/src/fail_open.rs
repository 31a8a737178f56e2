//! Fail-open utilities for graceful degradation
//!
//! Some operations should degrade instead of aborting the caller: loading a
//! history document that was truncated by a crash, or asking an executor
//! for an optional checkpoint signal.
//!
//! DO NOT use fail-open for:
//! - Persisting history or workflow state (writes are fatal)
//! - Step execution (handled by the failure strategy)

use std::future::Future;
use tracing::warn;

use crate::Result;

/// Execute an operation that should fail open.
///
/// Logs the error via `tracing::warn!` on failure and returns `None`.
///
/// # Usage
///
/// ```no_run
/// use flowmine_core::fail_open::fail_open;
/// use flowmine_core::Result;
///
/// async fn load_history() -> Result<String> {
///     Ok("{}".to_string())
/// }
///
/// async fn example() {
///     let doc = fail_open("load history", || load_history()).await;
///     // doc is None if load_history() failed
/// }
/// ```
pub async fn fail_open<F, Fut, T>(operation_name: &str, f: F) -> Option<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    f().await
        .map_err(|e| warn!("{} failed, continuing without it: {}", operation_name, e))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FlowError;

    #[tokio::test]
    async fn test_value_passes_through() {
        let signal = fail_open("checkpoint signal", || async {
            Ok::<_, FlowError>(Some("abc123".to_string()))
        })
        .await;
        assert_eq!(signal.flatten().as_deref(), Some("abc123"));
    }

    #[tokio::test]
    async fn test_error_becomes_none() {
        let loaded = fail_open("load history", || async {
            Err::<u32, _>(FlowError::Storage("truncated document".to_string()))
        })
        .await;
        assert!(loaded.is_none());
    }
}
