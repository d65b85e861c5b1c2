use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{CheckpointData, CheckpointError, CheckpointId, Result};

/// Durable write-through target for checkpoints.
///
/// Writes are best-effort: the [`CheckpointStore`](crate::CheckpointStore)
/// logs a failed write and carries on, since checkpoints only speed up
/// recovery and never decide its correctness. There is no read-back path.
#[async_trait]
pub trait CheckpointPersistence: Send + Sync {
    /// Persists a single checkpoint record.
    async fn persist(&self, checkpoint: &CheckpointData) -> Result<()>;
}

#[derive(Debug, Default)]
struct InMemoryPersistenceState {
    records: Vec<CheckpointData>,
    fail_on_persist: bool,
}

/// In-memory persistence backend for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCheckpointPersistence {
    state: Arc<RwLock<InMemoryPersistenceState>>,
}

impl InMemoryCheckpointPersistence {
    /// Creates a new empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the backend to reject every write.
    pub async fn set_fail_on_persist(&self, fail: bool) {
        self.state.write().await.fail_on_persist = fail;
    }

    /// Returns the number of persisted records.
    pub async fn record_count(&self) -> usize {
        self.state.read().await.records.len()
    }

    /// Returns true if a record with the given id was persisted.
    pub async fn contains(&self, id: CheckpointId) -> bool {
        self.state.read().await.records.iter().any(|r| r.id == id)
    }
}

#[async_trait]
impl CheckpointPersistence for InMemoryCheckpointPersistence {
    async fn persist(&self, checkpoint: &CheckpointData) -> Result<()> {
        let mut state = self.state.write().await;

        if state.fail_on_persist {
            return Err(CheckpointError::Persistence(
                "checkpoint backend unavailable".to_string(),
            ));
        }

        state.records.push(checkpoint.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Metadata, TransactionId};

    fn checkpoint() -> CheckpointData {
        CheckpointData::new(
            TransactionId::new("txn-1"),
            1,
            serde_json::json!({"step": 1}),
            Metadata::new(),
        )
    }

    #[tokio::test]
    async fn persist_records_checkpoint() {
        let backend = InMemoryCheckpointPersistence::new();
        let cp = checkpoint();

        backend.persist(&cp).await.unwrap();

        assert_eq!(backend.record_count().await, 1);
        assert!(backend.contains(cp.id).await);
    }

    #[tokio::test]
    async fn fail_on_persist_rejects_writes() {
        let backend = InMemoryCheckpointPersistence::new();
        backend.set_fail_on_persist(true).await;

        let result = backend.persist(&checkpoint()).await;

        assert!(matches!(result, Err(CheckpointError::Persistence(_))));
        assert_eq!(backend.record_count().await, 0);
    }
}
