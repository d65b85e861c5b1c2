//! CHECKPOINT: undo only the operations after the most recent checkpoint.

use crate::context::RollbackResult;
use crate::error::Result;
use crate::events::{CheckpointRestoreData, RollbackEvent};
use crate::execution::RollbackExecution;
use crate::operation::RollbackOperation;
use crate::retry;
use crate::strategies::immediate;

/// Falls back to IMMEDIATE when the transaction has no checkpoint.
#[tracing::instrument(skip_all, fields(operations = operations.len()))]
pub(crate) async fn run(
    exec: &RollbackExecution,
    operations: Vec<RollbackOperation>,
) -> Result<Vec<RollbackResult>> {
    let Some(checkpoint) = exec.latest_checkpoint().await else {
        tracing::info!("no checkpoint recorded, falling back to immediate rollback");
        return immediate::run(exec, operations).await;
    };

    let total = operations.len();
    let to_rollback: Vec<RollbackOperation> = operations
        .into_iter()
        .filter(|op| {
            exec.input_index(&op.id)
                .is_none_or(|index| index as u64 > checkpoint.operation_index)
        })
        .collect();
    exec.record_processed(total - to_rollback.len());

    tracing::info!(
        checkpoint_id = %checkpoint.id,
        operation_index = checkpoint.operation_index,
        operations_to_rollback = to_rollback.len(),
        "rolling back from checkpoint"
    );
    exec.emit(RollbackEvent::CheckpointRestore(CheckpointRestoreData {
        transaction_id: exec.transaction_id().clone(),
        checkpoint_id: checkpoint.id,
        operation_index: checkpoint.operation_index,
        operations_to_rollback: to_rollback.len(),
    }));

    let mut results = Vec::with_capacity(to_rollback.len());
    for op in &to_rollback {
        results.push(retry::execute_with_retry(op).await);
        exec.record_processed(1);
    }

    Ok(results)
}
