//! HYBRID: partition operations by sub-strategy and run each partition.

use common::OperationId;

use crate::context::RollbackResult;
use crate::error::Result;
use crate::events::{GroupFailedData, RollbackEvent};
use crate::execution::RollbackExecution;
use crate::operation::RollbackOperation;
use crate::strategies::{checkpoint, compensation, immediate};
use crate::strategy::{FailureScenario, OperationType, RollbackStrategy};

/// Picks the sub-strategy for one operation of a HYBRID rollback.
///
/// Compensating actions always compensate. Critical operations and operations
/// with dependencies run immediately. The rest follow the failure scenario.
pub fn hybrid_strategy_for(
    operation: &RollbackOperation,
    scenario: FailureScenario,
    is_critical: bool,
) -> RollbackStrategy {
    if operation.operation_type == OperationType::Compensate {
        RollbackStrategy::Compensation
    } else if is_critical || operation.has_dependencies() {
        RollbackStrategy::Immediate
    } else {
        scenario.hybrid_strategy()
    }
}

#[tracing::instrument(skip_all, fields(operations = operations.len()))]
pub(crate) async fn run(
    exec: &RollbackExecution,
    operations: Vec<RollbackOperation>,
) -> Result<Vec<RollbackResult>> {
    let scenario = exec.context().failure_scenario;
    let mut immediate_ops = Vec::new();
    let mut checkpoint_ops = Vec::new();
    let mut compensation_ops = Vec::new();

    for op in operations {
        match hybrid_strategy_for(&op, scenario, exec.is_critical(&op)) {
            RollbackStrategy::Compensation => compensation_ops.push(op),
            RollbackStrategy::Checkpoint => checkpoint_ops.push(op),
            _ => immediate_ops.push(op),
        }
    }

    tracing::debug!(
        immediate = immediate_ops.len(),
        checkpoint = checkpoint_ops.len(),
        compensation = compensation_ops.len(),
        "partitioned hybrid rollback"
    );

    let mut results = Vec::new();

    if !immediate_ops.is_empty() {
        let outcome = immediate::run_sequence(exec, immediate_ops).await;
        if let Some((operation_id, reason)) = outcome.aborted {
            group_failed(exec, RollbackStrategy::Immediate, vec![operation_id], reason);
        }
        results.extend(outcome.results);
    }

    if !checkpoint_ops.is_empty() {
        let ids: Vec<OperationId> = checkpoint_ops.iter().map(|op| op.id.clone()).collect();
        match checkpoint::run(exec, checkpoint_ops).await {
            Ok(partition) => results.extend(partition),
            Err(e) => group_failed(exec, RollbackStrategy::Checkpoint, ids, e.to_string()),
        }
    }

    if !compensation_ops.is_empty() {
        results.extend(compensation::run(exec, compensation_ops).await);
    }

    Ok(results)
}

fn group_failed(
    exec: &RollbackExecution,
    partition: RollbackStrategy,
    failed_operations: Vec<OperationId>,
    error: String,
) {
    tracing::warn!(%partition, %error, "hybrid partition failed, continuing");
    exec.emit(RollbackEvent::GroupFailed(GroupFailedData {
        transaction_id: exec.transaction_id().clone(),
        group: partition.as_str().to_string(),
        failed_operations,
        error: Some(error),
    }));
}
