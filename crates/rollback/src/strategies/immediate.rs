//! IMMEDIATE: sequential, highest priority first, aborting on critical failure.

use common::OperationId;

use crate::context::RollbackResult;
use crate::error::{Result, RollbackError};
use crate::events::{OperationFailedData, RollbackEvent};
use crate::execution::RollbackExecution;
use crate::operation::RollbackOperation;
use crate::retry;

/// Results of a sequential run and the critical failure that stopped it.
pub(crate) struct SequenceOutcome {
    pub results: Vec<RollbackResult>,
    pub aborted: Option<(OperationId, String)>,
}

/// Runs operations one at a time in descending priority. Equal priorities
/// keep their input order.
pub(crate) async fn run_sequence(
    exec: &RollbackExecution,
    mut operations: Vec<RollbackOperation>,
) -> SequenceOutcome {
    operations.sort_by(|a, b| b.priority.cmp(&a.priority));
    let mut results = Vec::with_capacity(operations.len());

    for op in &operations {
        let result = retry::execute_with_retry(op).await;
        exec.record_processed(1);

        if !result.success && exec.is_critical(op) {
            let reason = result.error.clone().unwrap_or_default();
            tracing::error!(
                operation_id = %op.id,
                error = %reason,
                "critical rollback operation failed, aborting"
            );
            exec.emit(RollbackEvent::CriticalFailure(OperationFailedData {
                transaction_id: op.transaction_id.clone(),
                operation_id: op.id.clone(),
                error: reason.clone(),
            }));
            results.push(result);
            return SequenceOutcome {
                results,
                aborted: Some((op.id.clone(), reason)),
            };
        }

        results.push(result);
    }

    SequenceOutcome {
        results,
        aborted: None,
    }
}

#[tracing::instrument(skip_all, fields(operations = operations.len()))]
pub(crate) async fn run(
    exec: &RollbackExecution,
    operations: Vec<RollbackOperation>,
) -> Result<Vec<RollbackResult>> {
    let outcome = run_sequence(exec, operations).await;
    match outcome.aborted {
        Some((operation_id, reason)) => Err(RollbackError::CriticalOperationFailed {
            operation_id,
            reason,
        }),
        None => Ok(outcome.results),
    }
}
