//! Rollback error types.

use checkpoint_store::CheckpointError;
use common::{OperationId, TransactionId};
use thiserror::Error;

/// Coarse classification of rollback errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The request itself is malformed.
    Validation,
    /// A referenced transaction or checkpoint does not exist.
    NotFound,
    /// Something broke while executing the rollback.
    Internal,
    /// The request is well-formed but not allowed by configuration.
    BusinessRule,
}

/// Errors that can occur during rollback operations.
///
/// Failures of individual undo actions are not errors: they are recorded in
/// [`RollbackResult::error`](crate::RollbackResult::error). A `RollbackError`
/// means the rollback as a whole could not run or was aborted.
#[derive(Debug, Error)]
pub enum RollbackError {
    /// Unknown strategy name or otherwise invalid request.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Rollback operations depend on each other in a cycle.
    #[error("Dependency cycle between rollback operations: {}", join_ids(.0))]
    DependencyCycle(Vec<OperationId>),

    /// A critical operation exhausted its retries during an immediate rollback.
    #[error("Critical rollback operation '{operation_id}' failed: {reason}")]
    CriticalOperationFailed {
        operation_id: OperationId,
        reason: String,
    },

    /// The rollback did not finish within the configured deadline.
    #[error("Rollback of transaction {transaction_id} exceeded its {timeout_ms}ms deadline")]
    Timeout {
        transaction_id: TransactionId,
        timeout_ms: u64,
    },

    /// A panic escaped strategy dispatch.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Checkpoint store error.
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),
}

impl RollbackError {
    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RollbackError::Validation(_) | RollbackError::DependencyCycle(_) => {
                ErrorKind::Validation
            }
            RollbackError::CriticalOperationFailed { .. }
            | RollbackError::Timeout { .. }
            | RollbackError::Internal(_) => ErrorKind::Internal,
            RollbackError::Checkpoint(err) => match err {
                CheckpointError::CheckpointsDisabled => ErrorKind::BusinessRule,
                CheckpointError::TransactionNotFound(_)
                | CheckpointError::CheckpointNotFound { .. } => ErrorKind::NotFound,
                CheckpointError::NonMonotonicIndex { .. } | CheckpointError::Serialization(_) => {
                    ErrorKind::Validation
                }
                _ => ErrorKind::Internal,
            },
        }
    }
}

fn join_ids(ids: &[OperationId]) -> String {
    ids.iter()
        .map(OperationId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Convenience type alias for rollback results.
pub type Result<T> = std::result::Result<T, RollbackError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkpoint_errors_are_classified() {
        let disabled = RollbackError::from(CheckpointError::CheckpointsDisabled);
        assert_eq!(disabled.kind(), ErrorKind::BusinessRule);

        let missing = RollbackError::from(CheckpointError::TransactionNotFound(
            TransactionId::new("txn-1"),
        ));
        assert_eq!(missing.kind(), ErrorKind::NotFound);

        let backend = RollbackError::from(CheckpointError::Persistence("down".into()));
        assert_eq!(backend.kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_dependency_cycle_message_lists_members() {
        let err = RollbackError::DependencyCycle(vec!["a".into(), "b".into()]);
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(
            err.to_string(),
            "Dependency cycle between rollback operations: a, b"
        );
    }

    #[test]
    fn test_critical_failure_is_internal() {
        let err = RollbackError::CriticalOperationFailed {
            operation_id: "op-1".into(),
            reason: "row locked".into(),
        };
        assert_eq!(err.kind(), ErrorKind::Internal);
    }
}
