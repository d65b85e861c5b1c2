//! Active rollback executions and per-transaction result history.

use std::collections::HashMap;
use std::sync::Arc;

use common::TransactionId;
use tokio::sync::RwLock;

use crate::context::{RollbackResult, RollbackStatus};
use crate::execution::RollbackExecution;

/// In-memory tracking owned by one [`RollbackManager`](crate::RollbackManager).
#[derive(Default)]
pub struct RollbackRegistry {
    active: RwLock<HashMap<TransactionId, Arc<RollbackExecution>>>,
    history: RwLock<HashMap<TransactionId, Vec<RollbackResult>>>,
}

impl RollbackRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracks an execution, replacing any earlier one for the same transaction.
    pub async fn register(&self, execution: Arc<RollbackExecution>) {
        self.active
            .write()
            .await
            .insert(execution.transaction_id().clone(), execution);
    }

    /// Stops tracking `execution`. A newer execution registered for the same
    /// transaction is left in place.
    pub async fn remove(&self, execution: &Arc<RollbackExecution>) -> bool {
        let mut active = self.active.write().await;
        match active.get(execution.transaction_id()) {
            Some(current) if Arc::ptr_eq(current, execution) => {
                active.remove(execution.transaction_id());
                true
            }
            _ => false,
        }
    }

    /// Returns the tracked execution for a transaction.
    pub async fn get(&self, transaction_id: &TransactionId) -> Option<Arc<RollbackExecution>> {
        self.active.read().await.get(transaction_id).cloned()
    }

    /// Reports whether a rollback is running and how far it got.
    pub async fn status(&self, transaction_id: &TransactionId) -> RollbackStatus {
        match self.get(transaction_id).await {
            Some(execution) => RollbackStatus {
                is_active: !execution.is_finished(),
                strategy: Some(execution.strategy()),
                progress: Some(execution.progress()),
            },
            None => RollbackStatus::inactive(),
        }
    }

    /// Returns the transactions whose rollback is still running.
    pub async fn active_transactions(&self) -> Vec<TransactionId> {
        let mut running: Vec<TransactionId> = self
            .active
            .read()
            .await
            .values()
            .filter(|execution| !execution.is_finished())
            .map(|execution| execution.transaction_id().clone())
            .collect();
        running.sort();
        running
    }

    /// Appends results to a transaction's history.
    pub async fn record_history(&self, transaction_id: &TransactionId, results: &[RollbackResult]) {
        self.history
            .write()
            .await
            .entry(transaction_id.clone())
            .or_default()
            .extend_from_slice(results);
    }

    /// Returns every recorded result for a transaction, oldest first.
    pub async fn history(&self, transaction_id: &TransactionId) -> Vec<RollbackResult> {
        self.history
            .read()
            .await
            .get(transaction_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RollbackConfig;
    use crate::context::RollbackContext;
    use crate::events::EventBus;
    use crate::strategy::{FailureScenario, RollbackStrategy};
    use checkpoint_store::CheckpointStore;
    use std::time::Duration;

    fn execution(tx: &str) -> Arc<RollbackExecution> {
        Arc::new(RollbackExecution::new(
            RollbackContext::new(tx, FailureScenario::Deadlock, RollbackStrategy::Deferred),
            Arc::new(RollbackConfig::default()),
            Arc::new(CheckpointStore::default()),
            EventBus::default(),
        ))
    }

    #[tokio::test]
    async fn test_unknown_transaction_is_inactive() {
        let registry = RollbackRegistry::new();
        assert_eq!(
            registry.status(&"txn-x".into()).await,
            RollbackStatus::inactive()
        );
    }

    #[tokio::test]
    async fn test_registered_execution_reports_status() {
        let registry = RollbackRegistry::new();
        registry.register(execution("txn-1")).await;

        let status = registry.status(&"txn-1".into()).await;
        assert!(status.is_active);
        assert_eq!(status.strategy, Some(RollbackStrategy::Deferred));
        assert_eq!(status.progress, Some(1.0));
        assert_eq!(registry.active_transactions().await, vec![TransactionId::from("txn-1")]);
    }

    #[tokio::test]
    async fn test_remove_ignores_replaced_execution() {
        let registry = RollbackRegistry::new();
        let first = execution("txn-1");
        let second = execution("txn-1");

        registry.register(Arc::clone(&first)).await;
        registry.register(Arc::clone(&second)).await;

        assert!(!registry.remove(&first).await);
        assert!(registry.get(&"txn-1".into()).await.is_some());
        assert!(registry.remove(&second).await);
        assert!(registry.get(&"txn-1".into()).await.is_none());
    }

    #[tokio::test]
    async fn test_history_accumulates() {
        let registry = RollbackRegistry::new();
        let tx = TransactionId::from("txn-1");
        let result = RollbackResult::succeeded("op-1".into(), Duration::ZERO, 0, None);

        assert!(registry.history(&tx).await.is_empty());
        registry.record_history(&tx, std::slice::from_ref(&result)).await;
        registry.record_history(&tx, std::slice::from_ref(&result)).await;

        assert_eq!(registry.history(&tx).await.len(), 2);
    }
}
