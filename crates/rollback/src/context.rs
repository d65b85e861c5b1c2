//! Rollback context, per-operation results and status snapshots.

use std::collections::HashMap;
use std::time::Duration;

use checkpoint_store::{CheckpointData, Metadata};
use chrono::{DateTime, Utc};
use common::{CheckpointId, OperationId, TransactionId};
use serde::{Deserialize, Serialize};

use crate::operation::RollbackOperation;
use crate::strategy::{FailureScenario, RollbackStrategy};

/// Everything needed to roll back one failed transaction.
#[derive(Debug, Clone)]
pub struct RollbackContext {
    pub transaction_id: TransactionId,
    pub failure_scenario: FailureScenario,
    pub failure_details: String,
    pub strategy: RollbackStrategy,
    /// Operations in the order the forward steps ran.
    pub operations: Vec<RollbackOperation>,
    /// Checkpoints known to the caller, in addition to the checkpoint store.
    pub checkpoints: HashMap<CheckpointId, CheckpointData>,
    pub start_time: DateTime<Utc>,
    pub metadata: Metadata,
}

impl RollbackContext {
    /// Creates an empty context with an explicit strategy.
    pub fn new(
        transaction_id: impl Into<TransactionId>,
        failure_scenario: FailureScenario,
        strategy: RollbackStrategy,
    ) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            failure_scenario,
            failure_details: String::new(),
            strategy,
            operations: Vec::new(),
            checkpoints: HashMap::new(),
            start_time: Utc::now(),
            metadata: Metadata::new(),
        }
    }

    /// Creates an empty context using the scenario's default strategy.
    pub fn for_scenario(
        transaction_id: impl Into<TransactionId>,
        failure_scenario: FailureScenario,
    ) -> Self {
        Self::new(
            transaction_id,
            failure_scenario,
            failure_scenario.default_strategy(),
        )
    }

    /// Sets the failure description.
    pub fn with_failure_details(mut self, details: impl Into<String>) -> Self {
        self.failure_details = details.into();
        self
    }

    /// Appends one operation.
    pub fn with_operation(mut self, operation: RollbackOperation) -> Self {
        self.operations.push(operation);
        self
    }

    /// Appends several operations.
    pub fn with_operations(mut self, operations: impl IntoIterator<Item = RollbackOperation>) -> Self {
        self.operations.extend(operations);
        self
    }

    /// Adds a caller-held checkpoint.
    pub fn with_checkpoint(mut self, checkpoint: CheckpointData) -> Self {
        self.checkpoints.insert(checkpoint.id, checkpoint);
        self
    }

    /// Adds a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Outcome of one rollback operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackResult {
    pub operation_id: OperationId,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// From the first attempt to the final outcome, backoff included.
    pub execution_time_ms: u64,
    /// Retries performed, excluding the first attempt.
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compensation_data: Option<serde_json::Value>,
}

impl RollbackResult {
    /// Creates a successful result.
    pub fn succeeded(
        operation_id: OperationId,
        elapsed: Duration,
        retry_count: u32,
        compensation_data: Option<serde_json::Value>,
    ) -> Self {
        Self {
            operation_id,
            success: true,
            error: None,
            execution_time_ms: duration_ms(elapsed),
            retry_count,
            compensation_data,
        }
    }

    /// Creates a failed result.
    pub fn failed(
        operation_id: OperationId,
        error: impl Into<String>,
        elapsed: Duration,
        retry_count: u32,
    ) -> Self {
        Self {
            operation_id,
            success: false,
            error: Some(error.into()),
            execution_time_ms: duration_ms(elapsed),
            retry_count,
            compensation_data: None,
        }
    }
}

fn duration_ms(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

/// Point-in-time view of a tracked rollback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackStatus {
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<RollbackStrategy>,
    /// Processed operations over total, in `0.0..=1.0`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
}

impl RollbackStatus {
    /// Status of a transaction with no tracked rollback.
    pub fn inactive() -> Self {
        Self {
            is_active: false,
            strategy: None,
            progress: None,
        }
    }
}
