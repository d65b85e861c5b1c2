//! COMPENSATION: reverse order, one attempt each, never aborting.

use crate::context::RollbackResult;
use crate::events::{OperationFailedData, RollbackEvent};
use crate::execution::RollbackExecution;
use crate::operation::RollbackOperation;
use crate::retry;

#[tracing::instrument(skip_all, fields(operations = operations.len()))]
pub(crate) async fn run(
    exec: &RollbackExecution,
    operations: Vec<RollbackOperation>,
) -> Vec<RollbackResult> {
    let mut results = Vec::with_capacity(operations.len());

    for op in operations.iter().rev() {
        let result = retry::execute_once(op).await;
        exec.record_processed(1);

        if let Some(error) = result.error.as_ref()
            && !result.success
        {
            tracing::warn!(operation_id = %op.id, %error, "compensation failed, continuing");
            exec.emit(RollbackEvent::CompensationFailed(OperationFailedData {
                transaction_id: op.transaction_id.clone(),
                operation_id: op.id.clone(),
                error: error.clone(),
            }));
        }

        results.push(result);
    }

    results
}
