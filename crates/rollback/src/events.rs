//! Rollback lifecycle events and the broadcast bus that carries them.

use chrono::{DateTime, Utc};
use common::{CheckpointId, OperationId, TransactionId};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::context::RollbackResult;
use crate::strategy::{FailureScenario, RollbackStrategy};

/// Events emitted while rolling back and checkpointing.
///
/// The serialized `event` tag is the stable contract observers match on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum RollbackEvent {
    #[serde(rename = "rollback:started")]
    RollbackStarted(RollbackStartedData),

    #[serde(rename = "rollback:completed")]
    RollbackCompleted(RollbackCompletedData),

    /// A critical operation exhausted its retries; the rollback aborts.
    #[serde(rename = "rollback:critical_failure")]
    CriticalFailure(OperationFailedData),

    /// A compensation failed; compensation continues.
    #[serde(rename = "rollback:compensation_failed")]
    CompensationFailed(OperationFailedData),

    /// A batch or strategy partition finished with failures.
    #[serde(rename = "rollback:group_failed")]
    GroupFailed(GroupFailedData),

    /// A checkpoint was chosen as the rollback starting point.
    #[serde(rename = "rollback:checkpoint_restore")]
    CheckpointRestore(CheckpointRestoreData),

    #[serde(rename = "checkpoint:created")]
    CheckpointCreated(CheckpointEventData),

    #[serde(rename = "checkpoint:restored")]
    CheckpointRestored(CheckpointEventData),
}

impl RollbackEvent {
    /// Returns the event name.
    pub fn name(&self) -> &'static str {
        match self {
            RollbackEvent::RollbackStarted(_) => "rollback:started",
            RollbackEvent::RollbackCompleted(_) => "rollback:completed",
            RollbackEvent::CriticalFailure(_) => "rollback:critical_failure",
            RollbackEvent::CompensationFailed(_) => "rollback:compensation_failed",
            RollbackEvent::GroupFailed(_) => "rollback:group_failed",
            RollbackEvent::CheckpointRestore(_) => "rollback:checkpoint_restore",
            RollbackEvent::CheckpointCreated(_) => "checkpoint:created",
            RollbackEvent::CheckpointRestored(_) => "checkpoint:restored",
        }
    }

    /// Returns the transaction the event belongs to.
    pub fn transaction_id(&self) -> &TransactionId {
        match self {
            RollbackEvent::RollbackStarted(d) => &d.transaction_id,
            RollbackEvent::RollbackCompleted(d) => &d.transaction_id,
            RollbackEvent::CriticalFailure(d) | RollbackEvent::CompensationFailed(d) => {
                &d.transaction_id
            }
            RollbackEvent::GroupFailed(d) => &d.transaction_id,
            RollbackEvent::CheckpointRestore(d) => &d.transaction_id,
            RollbackEvent::CheckpointCreated(d) | RollbackEvent::CheckpointRestored(d) => {
                &d.transaction_id
            }
        }
    }
}

/// Data for `rollback:started`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackStartedData {
    pub transaction_id: TransactionId,
    pub strategy: RollbackStrategy,
    pub failure_scenario: FailureScenario,
    pub operation_count: usize,
    pub started_at: DateTime<Utc>,
}

/// Data for `rollback:completed`. Exactly one of `results` and `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackCompletedData {
    pub transaction_id: TransactionId,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<RollbackResult>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// Data for per-operation failure events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationFailedData {
    pub transaction_id: TransactionId,
    pub operation_id: OperationId,
    pub error: String,
}

/// Data for `rollback:group_failed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupFailedData {
    pub transaction_id: TransactionId,
    /// `batch-<n>` for dependency batches, the strategy name for partitions.
    pub group: String,
    pub failed_operations: Vec<OperationId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Data for `rollback:checkpoint_restore`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRestoreData {
    pub transaction_id: TransactionId,
    pub checkpoint_id: CheckpointId,
    pub operation_index: u64,
    pub operations_to_rollback: usize,
}

/// Data for `checkpoint:created` and `checkpoint:restored`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointEventData {
    pub transaction_id: TransactionId,
    pub checkpoint_id: CheckpointId,
    pub operation_index: u64,
}

/// Fan-out of rollback events to any number of subscribers.
///
/// Emitting never blocks and never fails: with no subscribers the event is
/// only traced, and slow subscribers observe `RecvError::Lagged`.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<RollbackEvent>,
}

impl EventBus {
    /// Creates a bus buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event.
    pub fn emit(&self, event: RollbackEvent) {
        tracing::debug!(
            event = event.name(),
            transaction_id = %event.transaction_id(),
            "rollback event"
        );
        let _ = self.sender.send(event);
    }

    /// Subscribes to events emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<RollbackEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
