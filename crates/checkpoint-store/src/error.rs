use thiserror::Error;

use crate::{CheckpointId, TransactionId};

/// Errors that can occur when creating, restoring or persisting checkpoints.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// Checkpoints are switched off by configuration.
    #[error("Checkpoints are disabled by configuration")]
    CheckpointsDisabled,

    /// No checkpoints are recorded for the transaction.
    #[error("No checkpoints found for transaction {0}")]
    TransactionNotFound(TransactionId),

    /// The transaction exists but the checkpoint id does not.
    #[error("Checkpoint {checkpoint_id} not found for transaction {transaction_id}")]
    CheckpointNotFound {
        transaction_id: TransactionId,
        checkpoint_id: CheckpointId,
    },

    /// A checkpoint was created with an index lower than the latest one.
    #[error(
        "Checkpoint index {operation_index} for transaction {transaction_id} precedes latest index {latest}"
    )]
    NonMonotonicIndex {
        transaction_id: TransactionId,
        operation_index: u64,
        latest: u64,
    },

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// The checkpoint state could not be structurally copied.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A persistence backend rejected the write.
    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl CheckpointError {
    /// Returns true for errors that mean "nothing by that id".
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            CheckpointError::TransactionNotFound(_) | CheckpointError::CheckpointNotFound { .. }
        )
    }
}

/// Result type for checkpoint operations.
pub type Result<T> = std::result::Result<T, CheckpointError>;
