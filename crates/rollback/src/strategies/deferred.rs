//! DEFERRED: dependency-ordered batches, each batch run concurrently.

use std::collections::HashSet;

use common::OperationId;
use futures_util::future::join_all;

use crate::context::RollbackResult;
use crate::error::{Result, RollbackError};
use crate::events::{GroupFailedData, RollbackEvent};
use crate::execution::RollbackExecution;
use crate::operation::RollbackOperation;
use crate::retry;

/// Operations grouped into batches whose dependencies are all met by earlier
/// batches.
#[derive(Debug, Default)]
pub struct BatchPlan {
    pub batches: Vec<Vec<RollbackOperation>>,
    /// Operations left on a dependency cycle. When non-empty they form the
    /// final batch.
    pub cyclic: Vec<OperationId>,
}

/// Groups operations into dependency batches, preserving input order inside
/// each batch.
///
/// Dependencies on ids outside `operations` count as satisfied. Operations
/// that can never become ready are collected into one final batch and listed
/// in [`BatchPlan::cyclic`].
pub fn dependency_batches(operations: Vec<RollbackOperation>) -> BatchPlan {
    let known: HashSet<OperationId> = operations.iter().map(|op| op.id.clone()).collect();
    let mut done: HashSet<OperationId> = HashSet::new();
    let mut plan = BatchPlan::default();
    let mut remaining = operations;

    while !remaining.is_empty() {
        let (ready, blocked): (Vec<_>, Vec<_>) = remaining.into_iter().partition(|op| {
            op.dependencies
                .iter()
                .all(|dep| done.contains(dep) || !known.contains(dep))
        });

        if ready.is_empty() {
            plan.cyclic = blocked.iter().map(|op| op.id.clone()).collect();
            plan.batches.push(blocked);
            break;
        }

        done.extend(ready.iter().map(|op| op.id.clone()));
        plan.batches.push(ready);
        remaining = blocked;
    }

    plan
}

#[tracing::instrument(skip_all, fields(operations = operations.len()))]
pub(crate) async fn run(
    exec: &RollbackExecution,
    operations: Vec<RollbackOperation>,
) -> Result<Vec<RollbackResult>> {
    let plan = dependency_batches(operations);

    if !plan.cyclic.is_empty() {
        if exec.config().reject_dependency_cycles {
            return Err(RollbackError::DependencyCycle(plan.cyclic));
        }
        tracing::warn!(
            operations = ?plan.cyclic,
            "dependency cycle detected, running remaining operations as a final batch"
        );
    }

    let mut results = Vec::new();

    for (index, batch) in plan.batches.iter().enumerate() {
        tracing::debug!(batch = index + 1, size = batch.len(), "running rollback batch");
        let batch_results = join_all(batch.iter().map(retry::execute_with_retry)).await;
        exec.record_processed(batch_results.len());

        let failed: Vec<OperationId> = batch_results
            .iter()
            .filter(|r| !r.success)
            .map(|r| r.operation_id.clone())
            .collect();

        if !failed.is_empty() {
            exec.emit(RollbackEvent::GroupFailed(GroupFailedData {
                transaction_id: exec.transaction_id().clone(),
                group: format!("batch-{}", index + 1),
                failed_operations: failed,
                error: None,
            }));
        }

        results.extend(batch_results);
    }

    Ok(results)
}
