//! Strategy engine for a single rollback.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use checkpoint_store::{CheckpointData, CheckpointStore};
use common::{OperationId, TransactionId};
use futures_util::FutureExt;

use crate::config::RollbackConfig;
use crate::context::{RollbackContext, RollbackResult};
use crate::error::{Result, RollbackError};
use crate::events::{EventBus, RollbackEvent};
use crate::operation::RollbackOperation;
use crate::retry::panic_message;
use crate::strategies;
use crate::strategy::RollbackStrategy;

/// Runs one [`RollbackContext`] with the algorithm its strategy selects.
///
/// Progress is tracked as operations are resolved so that the manager can
/// report it while the rollback is still running.
pub struct RollbackExecution {
    context: RollbackContext,
    config: Arc<RollbackConfig>,
    checkpoints: Arc<CheckpointStore>,
    events: EventBus,
    input_index: HashMap<OperationId, usize>,
    processed: AtomicUsize,
    finished: AtomicBool,
}

impl RollbackExecution {
    /// Creates an execution; nothing runs until [`RollbackExecution::run`].
    pub fn new(
        context: RollbackContext,
        config: Arc<RollbackConfig>,
        checkpoints: Arc<CheckpointStore>,
        events: EventBus,
    ) -> Self {
        let input_index = context
            .operations
            .iter()
            .enumerate()
            .map(|(index, op)| (op.id.clone(), index))
            .collect();

        Self {
            context,
            config,
            checkpoints,
            events,
            input_index,
            processed: AtomicUsize::new(0),
            finished: AtomicBool::new(false),
        }
    }

    /// Returns the transaction being rolled back.
    pub fn transaction_id(&self) -> &TransactionId {
        &self.context.transaction_id
    }

    /// Returns the selected strategy.
    pub fn strategy(&self) -> RollbackStrategy {
        self.context.strategy
    }

    /// Returns the rollback context.
    pub fn context(&self) -> &RollbackContext {
        &self.context
    }

    /// Fraction of operations resolved so far; 1.0 with no operations.
    pub fn progress(&self) -> f64 {
        let total = self.context.operations.len();
        if total == 0 {
            return 1.0;
        }
        let processed = self.processed.load(Ordering::SeqCst).min(total);
        processed as f64 / total as f64
    }

    /// Returns true once [`RollbackExecution::run`] has returned.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    /// Executes the strategy and returns one result per attempted operation.
    ///
    /// Individual operation failures are reported in the results. An error
    /// means the rollback as a whole was aborted or could not run.
    #[tracing::instrument(
        skip(self),
        fields(
            transaction_id = %self.context.transaction_id,
            strategy = %self.context.strategy,
            operations = self.context.operations.len()
        )
    )]
    pub async fn run(&self) -> Result<Vec<RollbackResult>> {
        let outcome = AssertUnwindSafe(self.dispatch()).catch_unwind().await;
        self.finished.store(true, Ordering::SeqCst);

        match outcome {
            Ok(result) => result,
            Err(panic) => Err(RollbackError::Internal(format!(
                "rollback dispatch panicked: {}",
                panic_message(&*panic)
            ))),
        }
    }

    /// Marks the execution as over when its run future was dropped early.
    pub(crate) fn mark_finished(&self) {
        self.finished.store(true, Ordering::SeqCst);
    }

    async fn dispatch(&self) -> Result<Vec<RollbackResult>> {
        let operations = self.context.operations.clone();

        match self.context.strategy {
            RollbackStrategy::Immediate => strategies::immediate::run(self, operations).await,
            RollbackStrategy::Deferred => strategies::deferred::run(self, operations).await,
            RollbackStrategy::Checkpoint => strategies::checkpoint::run(self, operations).await,
            RollbackStrategy::Compensation => {
                Ok(strategies::compensation::run(self, operations).await)
            }
            RollbackStrategy::Hybrid => strategies::hybrid::run(self, operations).await,
        }
    }

    pub(crate) fn config(&self) -> &RollbackConfig {
        &self.config
    }

    pub(crate) fn is_critical(&self, operation: &RollbackOperation) -> bool {
        self.config.is_critical(&operation.id) || self.config.is_critical(&operation.operation_id)
    }

    /// Position of the operation in the context's input order.
    pub(crate) fn input_index(&self, id: &OperationId) -> Option<usize> {
        self.input_index.get(id).copied()
    }

    pub(crate) fn record_processed(&self, count: usize) {
        self.processed.fetch_add(count, Ordering::SeqCst);
    }

    pub(crate) fn emit(&self, event: RollbackEvent) {
        self.events.emit(event);
    }

    /// Highest-index checkpoint from the store or the context.
    pub(crate) async fn latest_checkpoint(&self) -> Option<CheckpointData> {
        let stored = self
            .checkpoints
            .latest_checkpoint(&self.context.transaction_id)
            .await;

        stored
            .into_iter()
            .chain(self.context.checkpoints.values().cloned())
            .max_by_key(|c| c.operation_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::FailureScenario;
    use crate::undo::{ExecutionLog, ScriptedUndo, undo_fn};
    use std::time::Duration;

    fn execution(context: RollbackContext) -> RollbackExecution {
        RollbackExecution::new(
            context,
            Arc::new(RollbackConfig::default()),
            Arc::new(CheckpointStore::default()),
            EventBus::default(),
        )
    }

    #[tokio::test]
    async fn test_progress_is_one_without_operations() {
        let exec = execution(RollbackContext::new(
            "txn-1",
            FailureScenario::OperationFailure,
            RollbackStrategy::Immediate,
        ));

        assert_eq!(exec.progress(), 1.0);
        assert!(exec.run().await.unwrap().is_empty());
        assert!(exec.is_finished());
    }

    #[tokio::test]
    async fn test_progress_reaches_one_after_run() {
        let log = ExecutionLog::new();
        let ops = ["a", "b"].map(|name| {
            RollbackOperation::builder(name, "txn-1", ScriptedUndo::new(name, &log).executor())
                .build()
        });
        let exec = execution(
            RollbackContext::new(
                "txn-1",
                FailureScenario::OperationFailure,
                RollbackStrategy::Compensation,
            )
            .with_operations(ops),
        );

        assert_eq!(exec.progress(), 0.0);
        exec.run().await.unwrap();
        assert_eq!(exec.progress(), 1.0);
    }

    #[tokio::test]
    async fn test_executor_panic_is_recorded_as_failure() {
        let op = RollbackOperation::builder(
            "op-1",
            "txn-1",
            undo_fn(|| async { panic!("executor exploded") }),
        )
        .retries(0, Duration::ZERO)
        .build();
        let exec = execution(
            RollbackContext::new(
                "txn-1",
                FailureScenario::SystemFailure,
                RollbackStrategy::Immediate,
            )
            .with_operation(op),
        );

        let results = exec.run().await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(!results[0].success);
        assert!(results[0].error.as_deref().unwrap().contains("executor exploded"));
    }

    #[tokio::test]
    async fn test_latest_checkpoint_considers_context_checkpoints() {
        let store = Arc::new(CheckpointStore::default());
        let tx = TransactionId::new("txn-1");
        store
            .create_checkpoint(&tx, 1, &serde_json::json!({}), Default::default())
            .await
            .unwrap();

        let held = CheckpointData::new(tx.clone(), 4, serde_json::json!({}), Default::default());
        let exec = RollbackExecution::new(
            RollbackContext::new(
                "txn-1",
                FailureScenario::Timeout,
                RollbackStrategy::Checkpoint,
            )
            .with_checkpoint(held.clone()),
            Arc::new(RollbackConfig::default()),
            store,
            EventBus::default(),
        );

        assert_eq!(exec.latest_checkpoint().await, Some(held));
    }
}
