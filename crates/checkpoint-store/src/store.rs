use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::{
    CheckpointConfig, CheckpointData, CheckpointError, CheckpointId, CheckpointPersistence,
    Metadata, Result, TransactionId,
};

/// In-memory, per-transaction ordered checkpoint storage.
///
/// Checkpoints for a transaction are kept in creation order. Every created
/// checkpoint is also handed to the optional [`CheckpointPersistence`]
/// backend; a failed write is logged and counted but never returned to the
/// caller. Expired checkpoints are purged by [`CheckpointStore::sweep_expired`],
/// normally driven by [`CheckpointStore::spawn_retention_sweep`].
pub struct CheckpointStore {
    config: CheckpointConfig,
    checkpoints: RwLock<HashMap<TransactionId, Vec<CheckpointData>>>,
    persistence: Option<Arc<dyn CheckpointPersistence>>,
}

impl CheckpointStore {
    /// Creates an empty store with no durable backend.
    pub fn new(config: CheckpointConfig) -> Self {
        Self {
            config,
            checkpoints: RwLock::new(HashMap::new()),
            persistence: None,
        }
    }

    /// Attaches a best-effort write-through backend.
    pub fn with_persistence(mut self, persistence: Arc<dyn CheckpointPersistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// Returns the store configuration.
    pub fn config(&self) -> &CheckpointConfig {
        &self.config
    }

    /// Returns true when checkpoint creation is allowed.
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Records a structural copy of `state` as the newest checkpoint of a transaction.
    ///
    /// Fails with [`CheckpointError::CheckpointsDisabled`] when the feature
    /// flag is off, and with [`CheckpointError::NonMonotonicIndex`] when
    /// `operation_index` is lower than the transaction's latest checkpoint.
    /// In both cases the store is left untouched.
    #[tracing::instrument(skip(self, state, metadata))]
    pub async fn create_checkpoint<T: Serialize + ?Sized + Sync>(
        &self,
        transaction_id: &TransactionId,
        operation_index: u64,
        state: &T,
        metadata: Metadata,
    ) -> Result<CheckpointData> {
        if !self.config.enabled {
            return Err(CheckpointError::CheckpointsDisabled);
        }

        let checkpoint =
            CheckpointData::from_state(transaction_id.clone(), operation_index, state, metadata)?;

        {
            let mut store = self.checkpoints.write().await;
            let entries = store.entry(transaction_id.clone()).or_default();

            if let Some(latest) = entries.iter().map(|c| c.operation_index).max()
                && operation_index < latest
            {
                return Err(CheckpointError::NonMonotonicIndex {
                    transaction_id: transaction_id.clone(),
                    operation_index,
                    latest,
                });
            }

            entries.push(checkpoint.clone());
        }

        metrics::counter!("checkpoints_created_total").increment(1);
        tracing::debug!(checkpoint_id = %checkpoint.id, "checkpoint created");

        if let Some(persistence) = &self.persistence
            && let Err(e) = persistence.persist(&checkpoint).await
        {
            metrics::counter!("checkpoint_persist_failures_total").increment(1);
            tracing::warn!(
                checkpoint_id = %checkpoint.id,
                error = %e,
                "failed to persist checkpoint, keeping in-memory copy only"
            );
        }

        Ok(checkpoint)
    }

    /// Looks up a checkpoint by id. The caller applies the returned state.
    pub async fn restore_from_checkpoint(
        &self,
        transaction_id: &TransactionId,
        checkpoint_id: CheckpointId,
    ) -> Result<CheckpointData> {
        let store = self.checkpoints.read().await;
        let entries = store
            .get(transaction_id)
            .ok_or_else(|| CheckpointError::TransactionNotFound(transaction_id.clone()))?;

        entries
            .iter()
            .find(|c| c.id == checkpoint_id)
            .cloned()
            .ok_or_else(|| CheckpointError::CheckpointNotFound {
                transaction_id: transaction_id.clone(),
                checkpoint_id,
            })
    }

    /// Returns the checkpoints of a transaction in creation order.
    pub async fn checkpoints(&self, transaction_id: &TransactionId) -> Vec<CheckpointData> {
        self.checkpoints
            .read()
            .await
            .get(transaction_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Returns the checkpoint with the highest operation index, if any.
    pub async fn latest_checkpoint(&self, transaction_id: &TransactionId) -> Option<CheckpointData> {
        self.checkpoints
            .read()
            .await
            .get(transaction_id)
            .and_then(|entries| entries.iter().max_by_key(|c| c.operation_index).cloned())
    }

    /// Returns the number of transactions with at least one checkpoint.
    pub async fn transaction_count(&self) -> usize {
        self.checkpoints.read().await.len()
    }

    /// Returns the total number of checkpoints held.
    pub async fn checkpoint_count(&self) -> usize {
        self.checkpoints.read().await.values().map(Vec::len).sum()
    }

    /// Purges checkpoints older than the configured retention window.
    ///
    /// Returns the number of checkpoints removed.
    pub async fn sweep_expired(&self) -> usize {
        let cutoff = chrono::Duration::from_std(self.config.retention)
            .ok()
            .and_then(|retention| Utc::now().checked_sub_signed(retention));

        match cutoff {
            Some(cutoff) => self.sweep_expired_before(cutoff).await,
            None => 0,
        }
    }

    /// Purges checkpoints taken at or before `cutoff`, dropping transactions left empty.
    pub async fn sweep_expired_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut store = self.checkpoints.write().await;
        let mut removed = 0;

        store.retain(|_, entries| {
            let before = entries.len();
            entries.retain(|c| !c.is_older_than(cutoff));
            removed += before - entries.len();
            !entries.is_empty()
        });

        if removed > 0 {
            metrics::counter!("checkpoints_expired_total").increment(removed as u64);
            tracing::info!(removed, "expired checkpoints purged");
        }

        removed
    }

    /// Spawns the periodic retention sweep on the current tokio runtime.
    ///
    /// The task runs until the returned handle is aborted.
    pub fn spawn_retention_sweep(self: &Arc<Self>) -> JoinHandle<()> {
        let store = Arc::clone(self);
        let period = store.config.sweep_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                ticker.tick().await;
                store.sweep_expired().await;
            }
        })
    }
}

impl Default for CheckpointStore {
    fn default() -> Self {
        Self::new(CheckpointConfig::default())
    }
}
