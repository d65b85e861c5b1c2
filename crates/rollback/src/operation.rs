//! Rollback operation descriptors.

use std::sync::Arc;
use std::time::Duration;

use checkpoint_store::Metadata;
use common::{OperationId, TransactionId};

use crate::strategy::OperationType;
use crate::undo::Undoable;

/// Default retry budget for operations built without an explicit one.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default base delay between retries.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1000);

/// A single reversible or compensating action tied to one forward step.
///
/// Cloning is cheap: the executor is shared. Operations are immutable once
/// built.
#[derive(Clone)]
pub struct RollbackOperation {
    /// Unique id within the rollback context.
    pub id: OperationId,
    /// The transaction being rolled back.
    pub transaction_id: TransactionId,
    /// The forward operation this action undoes.
    pub operation_id: OperationId,
    pub operation_type: OperationType,
    pub description: String,
    /// The undo action supplied by the data-access layer.
    pub executor: Arc<dyn Undoable>,
    /// Higher runs earlier under IMMEDIATE.
    pub priority: i64,
    pub max_retries: u32,
    /// Base delay; doubled after each failed attempt.
    pub retry_delay: Duration,
    /// Ids of operations that must finish first. Ids outside the context are
    /// treated as satisfied.
    pub dependencies: Vec<OperationId>,
    pub metadata: Metadata,
}

impl RollbackOperation {
    /// Starts building an operation. `operation_id` defaults to `id`.
    pub fn builder(
        id: impl Into<OperationId>,
        transaction_id: impl Into<TransactionId>,
        executor: Arc<dyn Undoable>,
    ) -> RollbackOperationBuilder {
        let id = id.into();
        RollbackOperationBuilder {
            operation: RollbackOperation {
                operation_id: id.clone(),
                id,
                transaction_id: transaction_id.into(),
                operation_type: OperationType::Undo,
                description: String::new(),
                executor,
                priority: 0,
                max_retries: DEFAULT_MAX_RETRIES,
                retry_delay: DEFAULT_RETRY_DELAY,
                dependencies: Vec::new(),
                metadata: Metadata::new(),
            },
        }
    }

    /// Returns true if the operation waits on other operations.
    pub fn has_dependencies(&self) -> bool {
        !self.dependencies.is_empty()
    }
}

impl std::fmt::Debug for RollbackOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RollbackOperation")
            .field("id", &self.id)
            .field("transaction_id", &self.transaction_id)
            .field("operation_id", &self.operation_id)
            .field("operation_type", &self.operation_type)
            .field("description", &self.description)
            .field("priority", &self.priority)
            .field("max_retries", &self.max_retries)
            .field("retry_delay", &self.retry_delay)
            .field("dependencies", &self.dependencies)
            .finish_non_exhaustive()
    }
}

/// Builder for [`RollbackOperation`].
pub struct RollbackOperationBuilder {
    operation: RollbackOperation,
}

impl RollbackOperationBuilder {
    /// Sets the forward operation id.
    pub fn operation_id(mut self, operation_id: impl Into<OperationId>) -> Self {
        self.operation.operation_id = operation_id.into();
        self
    }

    /// Sets the operation type.
    pub fn operation_type(mut self, operation_type: OperationType) -> Self {
        self.operation.operation_type = operation_type;
        self
    }

    /// Sets the human-readable description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.operation.description = description.into();
        self
    }

    /// Sets the priority.
    pub fn priority(mut self, priority: i64) -> Self {
        self.operation.priority = priority;
        self
    }

    /// Sets the retry budget and base backoff delay.
    pub fn retries(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.operation.max_retries = max_retries;
        self.operation.retry_delay = retry_delay;
        self
    }

    /// Adds a dependency.
    pub fn depends_on(mut self, dependency: impl Into<OperationId>) -> Self {
        self.operation.dependencies.push(dependency.into());
        self
    }

    /// Adds a metadata entry.
    pub fn metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.operation.metadata.insert(key.into(), value);
        self
    }

    /// Builds the operation.
    pub fn build(self) -> RollbackOperation {
        self.operation
    }
}
