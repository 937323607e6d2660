//! Async helpers
//!
//! Deadline handling for operations that depend on an external persistence
//! layer: a blocked backend call surfaces as a `Timeout` error instead of
//! hanging the caller.

use crate::error::{AuthGateError, AuthGateResult, ErrorContext};
use tokio::time::{timeout, Duration};

/// Timeout wrapper for async operations
pub async fn with_timeout<F, T>(
    future: F,
    timeout_ms: u64,
    operation_name: &str,
) -> AuthGateResult<T>
where
    F: std::future::Future<Output = T>,
{
    match timeout(Duration::from_millis(timeout_ms), future).await {
        Ok(result) => Ok(result),
        Err(_) => Err(AuthGateError::Timeout {
            operation: operation_name.to_string(),
            duration_ms: timeout_ms,
            context: ErrorContext::new("async_utils")
                .with_operation(operation_name)
                .with_metadata("timeout_ms", &timeout_ms.to_string())
                .with_suggestion("Increase store_op_timeout_ms")
                .with_suggestion("Check the persistence backend availability"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn completes_within_deadline() {
        let result = with_timeout(async { 42 }, 1_000, "fast_op").await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn maps_elapsed_deadline_to_timeout() {
        let result = with_timeout(
            tokio::time::sleep(Duration::from_millis(200)),
            10,
            "slow_op",
        )
        .await;

        match result {
            Err(AuthGateError::Timeout {
                operation,
                duration_ms,
                ..
            }) => {
                assert_eq!(operation, "slow_op");
                assert_eq!(duration_ms, 10);
            }
            other => panic!("expected timeout, got {:?}", other.map(|_| ())),
        }
    }
}
