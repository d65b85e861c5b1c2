//! Builds rollback operations for common resource kinds.

use std::sync::Arc;
use std::time::Duration;

use checkpoint_store::Metadata;
use common::{OperationId, TransactionId};

use crate::context::RollbackContext;
use crate::operation::RollbackOperation;
use crate::strategy::{FailureScenario, OperationType};
use crate::undo::Undoable;

/// Retry budget for database mutations.
pub const DATABASE_RETRIES: (u32, Duration) = (3, Duration::from_millis(1000));

/// Retry budget for filesystem entries.
pub const FILE_SYSTEM_RETRIES: (u32, Duration) = (2, Duration::from_millis(500));

/// Retry budget for external-service calls.
pub const EXTERNAL_SERVICE_RETRIES: (u32, Duration) = (5, Duration::from_millis(2000));

/// A forward step described by the data-access layer, together with the
/// action that reverses it.
#[derive(Clone)]
pub struct ResourceAction {
    pub operation_id: OperationId,
    pub description: String,
    pub executor: Arc<dyn Undoable>,
    pub dependencies: Vec<OperationId>,
    pub metadata: Metadata,
}

impl ResourceAction {
    /// Creates an action with no dependencies or metadata.
    pub fn new(
        operation_id: impl Into<OperationId>,
        description: impl Into<String>,
        executor: Arc<dyn Undoable>,
    ) -> Self {
        Self {
            operation_id: operation_id.into(),
            description: description.into(),
            executor,
            dependencies: Vec::new(),
            metadata: Metadata::new(),
        }
    }

    /// Adds a dependency on another rollback operation.
    pub fn depends_on(mut self, dependency: impl Into<OperationId>) -> Self {
        self.dependencies.push(dependency.into());
        self
    }

    /// Adds a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

impl std::fmt::Debug for ResourceAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceAction")
            .field("operation_id", &self.operation_id)
            .field("description", &self.description)
            .field("dependencies", &self.dependencies)
            .finish_non_exhaustive()
    }
}

/// Forward steps of one transaction grouped by resource kind.
#[derive(Debug, Clone, Default)]
pub struct ComprehensiveOperations {
    pub database: Vec<ResourceAction>,
    pub file_system: Vec<ResourceAction>,
    pub external_service: Vec<ResourceAction>,
}

/// Stateless constructors for rollback operations and contexts.
pub struct RollbackStrategyFactory;

impl RollbackStrategyFactory {
    /// Undo operations for database mutations.
    pub fn create_database_rollback(
        transaction_id: &TransactionId,
        actions: Vec<ResourceAction>,
    ) -> Vec<RollbackOperation> {
        build(transaction_id, "db", actions, OperationType::Undo, DATABASE_RETRIES, 0)
    }

    /// Undo operations for filesystem entries.
    pub fn create_file_system_rollback(
        transaction_id: &TransactionId,
        actions: Vec<ResourceAction>,
    ) -> Vec<RollbackOperation> {
        build(transaction_id, "fs", actions, OperationType::Undo, FILE_SYSTEM_RETRIES, 0)
    }

    /// Compensating operations for external-service calls.
    pub fn create_external_service_rollback(
        transaction_id: &TransactionId,
        actions: Vec<ResourceAction>,
    ) -> Vec<RollbackOperation> {
        build(
            transaction_id,
            "ext",
            actions,
            OperationType::Compensate,
            EXTERNAL_SERVICE_RETRIES,
            0,
        )
    }

    /// Builds a full context for a transaction, choosing the strategy from
    /// the failure scenario. Operations are ordered database, filesystem,
    /// external service, and priorities continue across the three kinds so
    /// that the last forward step is undone first under IMMEDIATE.
    pub fn create_comprehensive_rollback(
        transaction_id: impl Into<TransactionId>,
        scenario: FailureScenario,
        operations: ComprehensiveOperations,
    ) -> RollbackContext {
        let transaction_id = transaction_id.into();
        let file_system_offset = operations.database.len();
        let external_offset = file_system_offset + operations.file_system.len();

        let database = build(
            &transaction_id,
            "db",
            operations.database,
            OperationType::Undo,
            DATABASE_RETRIES,
            0,
        );
        let file_system = build(
            &transaction_id,
            "fs",
            operations.file_system,
            OperationType::Undo,
            FILE_SYSTEM_RETRIES,
            file_system_offset,
        );
        let external = build(
            &transaction_id,
            "ext",
            operations.external_service,
            OperationType::Compensate,
            EXTERNAL_SERVICE_RETRIES,
            external_offset,
        );

        RollbackContext::for_scenario(transaction_id, scenario)
            .with_operations(database)
            .with_operations(file_system)
            .with_operations(external)
    }
}

/// Rollback ids are `<prefix>-<operation_id>`; priority is `first_priority`
/// plus the input index, so later forward steps are undone first under
/// IMMEDIATE.
fn build(
    transaction_id: &TransactionId,
    prefix: &str,
    actions: Vec<ResourceAction>,
    operation_type: OperationType,
    (max_retries, retry_delay): (u32, Duration),
    first_priority: usize,
) -> Vec<RollbackOperation> {
    actions
        .into_iter()
        .enumerate()
        .map(|(index, action)| {
            let mut builder = RollbackOperation::builder(
                format!("{prefix}-{}", action.operation_id),
                transaction_id.clone(),
                action.executor,
            )
            .operation_id(action.operation_id)
            .operation_type(operation_type)
            .description(action.description)
            .priority(i64::try_from(first_priority + index).unwrap_or(i64::MAX))
            .retries(max_retries, retry_delay);

            for dependency in action.dependencies {
                builder = builder.depends_on(dependency);
            }
            for (key, value) in action.metadata {
                builder = builder.metadata(key, value);
            }
            builder.build()
        })
        .collect()
}
