//! Per-operation execution with exponential backoff.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::time::Instant;

use crate::context::RollbackResult;
use crate::operation::RollbackOperation;

/// Delay before retry number `attempt` (1-based): `base * 2^(attempt - 1)`.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    base.saturating_mul(factor)
}

/// Runs the executor once. Panics become failures.
pub(crate) async fn attempt_once(
    operation: &RollbackOperation,
) -> Result<Option<serde_json::Value>, String> {
    match AssertUnwindSafe(operation.executor.execute())
        .catch_unwind()
        .await
    {
        Ok(Ok(data)) => Ok(data),
        Ok(Err(e)) => Err(e.to_string()),
        Err(panic) => Err(format!("undo executor panicked: {}", panic_message(&*panic))),
    }
}

/// Runs an operation with a single attempt and no retry.
pub(crate) async fn execute_once(operation: &RollbackOperation) -> RollbackResult {
    let started = Instant::now();
    match attempt_once(operation).await {
        Ok(data) => RollbackResult::succeeded(operation.id.clone(), started.elapsed(), 0, data),
        Err(reason) => {
            metrics::counter!("rollback_operations_failed_total").increment(1);
            RollbackResult::failed(operation.id.clone(), reason, started.elapsed(), 0)
        }
    }
}

/// Runs an operation up to `max_retries + 1` times, sleeping with exponential
/// backoff between attempts.
pub(crate) async fn execute_with_retry(operation: &RollbackOperation) -> RollbackResult {
    let started = Instant::now();
    let mut retries = 0;

    loop {
        match attempt_once(operation).await {
            Ok(data) => {
                return RollbackResult::succeeded(
                    operation.id.clone(),
                    started.elapsed(),
                    retries,
                    data,
                );
            }
            Err(reason) if retries < operation.max_retries => {
                retries += 1;
                let delay = backoff_delay(operation.retry_delay, retries);
                metrics::counter!("rollback_operation_retries_total").increment(1);
                tracing::warn!(
                    operation_id = %operation.id,
                    attempt = retries,
                    error = %reason,
                    ?delay,
                    "rollback operation failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(reason) => {
                metrics::counter!("rollback_operations_failed_total").increment(1);
                tracing::warn!(
                    operation_id = %operation.id,
                    retries,
                    error = %reason,
                    "rollback operation exhausted retries"
                );
                return RollbackResult::failed(
                    operation.id.clone(),
                    reason,
                    started.elapsed(),
                    retries,
                );
            }
        }
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::undo::{ExecutionLog, ScriptedUndo};

    fn operation(undo: &ScriptedUndo, max_retries: u32, delay_ms: u64) -> RollbackOperation {
        RollbackOperation::builder("op-1", "txn-1", undo.executor())
            .retries(max_retries, Duration::from_millis(delay_ms))
            .build()
    }

    #[test]
    fn test_backoff_doubles_each_attempt() {
        let base = Duration::from_millis(100);
        assert_eq!(backoff_delay(base, 1), Duration::from_millis(100));
        assert_eq!(backoff_delay(base, 2), Duration::from_millis(200));
        assert_eq!(backoff_delay(base, 3), Duration::from_millis(400));
    }

    #[test]
    fn test_backoff_saturates() {
        assert_eq!(
            backoff_delay(Duration::from_secs(1), 200),
            Duration::from_secs(1).saturating_mul(u32::MAX)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_failure_exhausts_retries_with_backoff() {
        let log = ExecutionLog::new();
        let undo = ScriptedUndo::new("op-1", &log).always_failing();
        let op = operation(&undo, 3, 100);

        let started = Instant::now();
        let result = execute_with_retry(&op).await;

        assert!(!result.success);
        assert_eq!(result.retry_count, 3);
        assert_eq!(undo.calls(), 4);
        // 100 + 200 + 400
        assert!(started.elapsed() >= Duration::from_millis(700));
        assert!(result.execution_time_ms >= 700);
        assert_eq!(result.error.as_deref(), Some("op-1 failed"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_recovers() {
        let log = ExecutionLog::new();
        let undo = ScriptedUndo::new("op-1", &log)
            .failing_times(2)
            .with_compensation_data(serde_json::json!({"rows": 1}));
        let op = operation(&undo, 3, 10);

        let result = execute_with_retry(&op).await;

        assert!(result.success);
        assert_eq!(result.retry_count, 2);
        assert_eq!(result.compensation_data, Some(serde_json::json!({"rows": 1})));
    }

    #[tokio::test]
    async fn test_zero_retries_means_single_attempt() {
        let log = ExecutionLog::new();
        let undo = ScriptedUndo::new("op-1", &log).always_failing();
        let op = operation(&undo, 0, 10);

        let result = execute_with_retry(&op).await;

        assert!(!result.success);
        assert_eq!(result.retry_count, 0);
        assert_eq!(undo.calls(), 1);
    }

    #[tokio::test]
    async fn test_panicking_executor_becomes_failure() {
        let log = ExecutionLog::new();
        let undo = ScriptedUndo::new("op-1", &log).panicking();
        let op = operation(&undo, 0, 0);

        let result = execute_once(&op).await;

        assert!(!result.success);
        assert_eq!(
            result.error.as_deref(),
            Some("undo executor panicked: op-1 panicked")
        );
    }
}
