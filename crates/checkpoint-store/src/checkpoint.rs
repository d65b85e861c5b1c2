use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CheckpointId, TransactionId};

/// Free-form metadata attached to checkpoints and rollback operations.
pub type Metadata = HashMap<String, serde_json::Value>;

/// A snapshot of a transaction's progress taken during its forward path.
///
/// Checkpoints let a rollback undo only the operations performed after the
/// snapshot instead of the whole transaction. The state is a structural copy:
/// it is serialized at creation time, so later mutation of the caller's
/// value never leaks into the checkpoint. Values that cannot be serialized
/// (closures, shared cycles) are unsupported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointData {
    /// Unique checkpoint id.
    pub id: CheckpointId,

    /// The transaction this checkpoint belongs to.
    pub transaction_id: TransactionId,

    /// Index of the last forward operation covered by the snapshot.
    pub operation_index: u64,

    /// When the checkpoint was taken.
    pub timestamp: DateTime<Utc>,

    /// The copied transaction state.
    pub state: serde_json::Value,

    /// Caller-supplied metadata.
    pub metadata: Metadata,
}

impl CheckpointData {
    /// Creates a checkpoint from an already captured JSON state.
    pub fn new(
        transaction_id: TransactionId,
        operation_index: u64,
        state: serde_json::Value,
        metadata: Metadata,
    ) -> Self {
        Self {
            id: CheckpointId::new(),
            transaction_id,
            operation_index,
            timestamp: Utc::now(),
            state,
            metadata,
        }
    }

    /// Creates a checkpoint by structurally copying a serializable state.
    pub fn from_state<T: Serialize + ?Sized>(
        transaction_id: TransactionId,
        operation_index: u64,
        state: &T,
        metadata: Metadata,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(
            transaction_id,
            operation_index,
            serde_json::to_value(state)?,
            metadata,
        ))
    }

    /// Deserializes the checkpoint state into a concrete type.
    pub fn into_state<T: for<'de> Deserialize<'de>>(self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.state)
    }

    /// Returns true if the checkpoint was taken at or before `cutoff`.
    pub fn is_older_than(&self, cutoff: DateTime<Utc>) -> bool {
        self.timestamp <= cutoff
    }
}
