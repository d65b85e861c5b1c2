//! Entry point for executing rollbacks and managing checkpoints.

use std::sync::{Arc, Mutex, PoisonError};

use checkpoint_store::{CheckpointData, CheckpointError, CheckpointStore, Metadata};
use chrono::Utc;
use common::{CheckpointId, TransactionId};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::RollbackConfig;
use crate::context::{RollbackContext, RollbackResult, RollbackStatus};
use crate::error::{Result, RollbackError};
use crate::events::{
    CheckpointEventData, EventBus, RollbackCompletedData, RollbackEvent, RollbackStartedData,
};
use crate::execution::RollbackExecution;
use crate::registry::RollbackRegistry;

/// Error reported in `rollback:completed` when the caller abandons a rollback.
pub const ROLLBACK_CANCELLED: &str = "rollback cancelled before completion";

/// Executes rollbacks, tracks their progress and records their results.
///
/// A manager owns its checkpoint store, its registry of active executions and
/// its event bus. When created inside a tokio runtime it also starts the
/// checkpoint retention sweep, which runs until [`RollbackManager::shutdown`]
/// is called or the manager is dropped.
pub struct RollbackManager {
    config: Arc<RollbackConfig>,
    checkpoints: Arc<CheckpointStore>,
    registry: Arc<RollbackRegistry>,
    events: EventBus,
    sweep_task: Mutex<Option<JoinHandle<()>>>,
}

impl RollbackManager {
    /// Creates a manager with an in-memory checkpoint store.
    pub fn new(config: RollbackConfig) -> Self {
        let checkpoints = Arc::new(CheckpointStore::new(config.checkpoints.clone()));
        Self::with_checkpoint_store(config, checkpoints)
    }

    /// Creates a manager around an existing checkpoint store, e.g. one with a
    /// durable persistence backend attached.
    pub fn with_checkpoint_store(config: RollbackConfig, checkpoints: Arc<CheckpointStore>) -> Self {
        let sweep_task = tokio::runtime::Handle::try_current()
            .ok()
            .map(|_| checkpoints.spawn_retention_sweep());
        if sweep_task.is_none() {
            tracing::warn!("no tokio runtime, checkpoint retention sweep not started");
        }

        Self {
            events: EventBus::new(config.event_capacity),
            config: Arc::new(config),
            checkpoints,
            registry: Arc::new(RollbackRegistry::new()),
            sweep_task: Mutex::new(sweep_task),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &RollbackConfig {
        &self.config
    }

    /// Returns the checkpoint store.
    pub fn checkpoint_store(&self) -> &Arc<CheckpointStore> {
        &self.checkpoints
    }

    /// Subscribes to rollback and checkpoint events emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<RollbackEvent> {
        self.events.subscribe()
    }

    /// Rolls back one transaction with the context's strategy.
    ///
    /// Results are appended to the transaction's history only when the
    /// rollback as a whole succeeds. The execution stays visible through
    /// [`RollbackManager::get_rollback_status`] for the configured retention
    /// period after it finishes, whatever the outcome.
    #[tracing::instrument(
        skip(self, context),
        fields(
            transaction_id = %context.transaction_id,
            strategy = %context.strategy,
            scenario = %context.failure_scenario
        )
    )]
    pub async fn execute_rollback(&self, context: RollbackContext) -> Result<Vec<RollbackResult>> {
        metrics::counter!("rollback_executions_total").increment(1);
        let started = Instant::now();

        let transaction_id = context.transaction_id.clone();
        let started_data = RollbackStartedData {
            transaction_id: transaction_id.clone(),
            strategy: context.strategy,
            failure_scenario: context.failure_scenario,
            operation_count: context.operations.len(),
            started_at: Utc::now(),
        };

        let execution = Arc::new(RollbackExecution::new(
            context,
            Arc::clone(&self.config),
            Arc::clone(&self.checkpoints),
            self.events.clone(),
        ));
        self.registry.register(Arc::clone(&execution)).await;
        let mut guard = ExecutionGuard {
            manager: self,
            execution: Arc::clone(&execution),
            started,
            completed: false,
        };

        tracing::info!(operations = started_data.operation_count, "rollback started");
        self.events.emit(RollbackEvent::RollbackStarted(started_data));

        let outcome = match self.config.rollback_timeout {
            Some(limit) => match tokio::time::timeout(limit, execution.run()).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    execution.mark_finished();
                    Err(RollbackError::Timeout {
                        transaction_id: transaction_id.clone(),
                        timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                    })
                }
            },
            None => execution.run().await,
        };

        let elapsed = started.elapsed();
        metrics::histogram!("rollback_duration_seconds").record(elapsed.as_secs_f64());
        let duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);

        let completed = match &outcome {
            Ok(results) => {
                self.registry.record_history(&transaction_id, results).await;
                metrics::counter!("rollback_completed_total").increment(1);
                tracing::info!(
                    results = results.len(),
                    failed = results.iter().filter(|r| !r.success).count(),
                    duration_ms,
                    "rollback completed"
                );
                RollbackCompletedData {
                    transaction_id: transaction_id.clone(),
                    success: true,
                    results: Some(results.clone()),
                    error: None,
                    duration_ms,
                }
            }
            Err(e) => {
                metrics::counter!("rollback_failed_total").increment(1);
                tracing::error!(error = %e, duration_ms, "rollback failed");
                RollbackCompletedData {
                    transaction_id: transaction_id.clone(),
                    success: false,
                    results: None,
                    error: Some(e.to_string()),
                    duration_ms,
                }
            }
        };
        self.events.emit(RollbackEvent::RollbackCompleted(completed));

        guard.completed = true;
        outcome
    }

    fn schedule_removal(&self, execution: Arc<RollbackExecution>) {
        let registry = Arc::clone(&self.registry);
        let retention = self.config.active_retention;

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(
                transaction_id = %execution.transaction_id(),
                "no tokio runtime, rollback execution stays tracked"
            );
            return;
        };

        handle.spawn(async move {
            tokio::time::sleep(retention).await;
            if registry.remove(&execution).await {
                tracing::debug!(
                    transaction_id = %execution.transaction_id(),
                    "rollback execution released"
                );
            }
        });
    }

    /// Records a checkpoint and emits `checkpoint:created`.
    #[tracing::instrument(skip(self, state, metadata))]
    pub async fn create_checkpoint<T: Serialize + ?Sized + Sync>(
        &self,
        transaction_id: &TransactionId,
        operation_index: u64,
        state: &T,
        metadata: Metadata,
    ) -> Result<CheckpointData> {
        self.ensure_checkpoints_enabled()?;

        let checkpoint = self
            .checkpoints
            .create_checkpoint(transaction_id, operation_index, state, metadata)
            .await?;

        self.events
            .emit(RollbackEvent::CheckpointCreated(CheckpointEventData {
                transaction_id: checkpoint.transaction_id.clone(),
                checkpoint_id: checkpoint.id,
                operation_index: checkpoint.operation_index,
            }));

        Ok(checkpoint)
    }

    /// Looks up a checkpoint and emits `checkpoint:restored`. The caller
    /// applies the returned state.
    #[tracing::instrument(skip(self))]
    pub async fn restore_from_checkpoint(
        &self,
        transaction_id: &TransactionId,
        checkpoint_id: CheckpointId,
    ) -> Result<CheckpointData> {
        self.ensure_checkpoints_enabled()?;

        let checkpoint = self
            .checkpoints
            .restore_from_checkpoint(transaction_id, checkpoint_id)
            .await?;

        tracing::info!(operation_index = checkpoint.operation_index, "checkpoint restored");
        self.events
            .emit(RollbackEvent::CheckpointRestored(CheckpointEventData {
                transaction_id: checkpoint.transaction_id.clone(),
                checkpoint_id: checkpoint.id,
                operation_index: checkpoint.operation_index,
            }));

        Ok(checkpoint)
    }

    fn ensure_checkpoints_enabled(&self) -> Result<()> {
        if self.checkpoints.is_enabled() {
            Ok(())
        } else {
            Err(CheckpointError::CheckpointsDisabled.into())
        }
    }

    /// Returns the checkpoints of a transaction in creation order.
    pub async fn checkpoints(&self, transaction_id: &TransactionId) -> Vec<CheckpointData> {
        self.checkpoints.checkpoints(transaction_id).await
    }

    /// Returns every result recorded for a transaction; empty when none.
    pub async fn get_rollback_history(&self, transaction_id: &TransactionId) -> Vec<RollbackResult> {
        self.registry.history(transaction_id).await
    }

    /// Reports the state of a transaction's most recent tracked rollback.
    pub async fn get_rollback_status(&self, transaction_id: &TransactionId) -> RollbackStatus {
        self.registry.status(transaction_id).await
    }

    /// Returns the transactions whose rollback is still running.
    pub async fn active_transactions(&self) -> Vec<TransactionId> {
        self.registry.active_transactions().await
    }

    /// Stops background maintenance. Safe to call more than once.
    pub fn shutdown(&self) {
        let task = self
            .sweep_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
            tracing::info!("rollback manager shut down");
        }
    }
}

/// Releases a registered execution however `execute_rollback` ends.
///
/// When the caller drops the rollback future before it completes, the
/// execution is marked finished and `rollback:completed` is emitted with
/// `success: false`.
struct ExecutionGuard<'a> {
    manager: &'a RollbackManager,
    execution: Arc<RollbackExecution>,
    started: Instant,
    completed: bool,
}

impl Drop for ExecutionGuard<'_> {
    fn drop(&mut self) {
        if !self.completed {
            self.execution.mark_finished();
            let duration_ms = u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX);
            metrics::counter!("rollback_failed_total").increment(1);
            tracing::warn!(
                transaction_id = %self.execution.transaction_id(),
                duration_ms,
                "rollback cancelled before completion"
            );
            self.manager
                .events
                .emit(RollbackEvent::RollbackCompleted(RollbackCompletedData {
                    transaction_id: self.execution.transaction_id().clone(),
                    success: false,
                    results: None,
                    error: Some(ROLLBACK_CANCELLED.to_string()),
                    duration_ms,
                }));
        }
        self.manager.schedule_removal(Arc::clone(&self.execution));
    }
}

impl Drop for RollbackManager {
    fn drop(&mut self) {
        if let Some(task) = self
            .sweep_task
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::{FailureScenario, RollbackStrategy};
    use crate::undo::{ExecutionLog, ScriptedUndo};
    use crate::{ErrorKind, RollbackOperation};
    use checkpoint_store::CheckpointConfig;
    use std::time::Duration;

    #[tokio::test]
    async fn test_sweep_task_started_and_stopped() {
        let manager = RollbackManager::new(RollbackConfig::default());
        assert!(manager.sweep_task.lock().unwrap().is_some());

        manager.shutdown();
        manager.shutdown();
        assert!(manager.sweep_task.lock().unwrap().is_none());
    }

    #[test]
    fn test_new_outside_runtime_skips_sweep() {
        let manager = RollbackManager::new(RollbackConfig::default());
        assert!(manager.sweep_task.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_checkpoints_disabled_is_business_rule() {
        let manager = RollbackManager::new(RollbackConfig::default().with_checkpoints_enabled(false));
        let tx = TransactionId::new("txn-1");

        let err = manager
            .create_checkpoint(&tx, 0, &serde_json::json!({}), Metadata::new())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::BusinessRule);
        assert!(manager.checkpoints(&tx).await.is_empty());
    }

    #[tokio::test]
    async fn test_checkpoint_gate_follows_store_config() {
        let store = Arc::new(CheckpointStore::new(CheckpointConfig::disabled()));
        let manager = RollbackManager::with_checkpoint_store(RollbackConfig::default(), store);
        let tx = TransactionId::new("txn-1");

        let err = manager
            .create_checkpoint(&tx, 0, &serde_json::json!({}), Metadata::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BusinessRule);

        let err = manager
            .restore_from_checkpoint(&tx, CheckpointId::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BusinessRule);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retention_sweep_purges_manager_checkpoints() {
        let config = RollbackConfig {
            checkpoints: CheckpointConfig {
                enabled: true,
                retention: Duration::ZERO,
                sweep_interval: Duration::from_secs(60),
            },
            ..RollbackConfig::default()
        };
        let manager = RollbackManager::new(config);
        let tx = TransactionId::new("txn-1");
        manager
            .create_checkpoint(&tx, 0, &serde_json::json!({}), Metadata::new())
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(manager.checkpoints(&tx).await.len(), 1);

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(manager.checkpoints(&tx).await.is_empty());
        assert_eq!(manager.checkpoint_store().transaction_count().await, 0);

        manager.shutdown();
        manager
            .create_checkpoint(&tx, 1, &serde_json::json!({}), Metadata::new())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(manager.checkpoints(&tx).await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_fails_rollback() {
        let config = RollbackConfig {
            rollback_timeout: Some(Duration::from_secs(1)),
            ..RollbackConfig::default()
        };
        let manager = RollbackManager::new(config);
        let log = ExecutionLog::new();
        let slow = ScriptedUndo::new("slow", &log).with_delay(Duration::from_secs(10));
        let context = RollbackContext::new(
            "txn-1",
            FailureScenario::Timeout,
            RollbackStrategy::Immediate,
        )
        .with_operation(RollbackOperation::builder("slow", "txn-1", slow.executor()).build());

        let err = manager.execute_rollback(context).await.unwrap_err();

        assert!(matches!(err, RollbackError::Timeout { timeout_ms: 1000, .. }));
        assert_eq!(err.kind(), ErrorKind::Internal);
        let status = manager.get_rollback_status(&"txn-1".into()).await;
        assert!(!status.is_active);
        assert!(manager.get_rollback_history(&"txn-1".into()).await.is_empty());
    }
}
