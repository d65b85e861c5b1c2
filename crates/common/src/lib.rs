//! Identifier types shared by the checkpoint store and the rollback engine.

mod types;

pub use types::{CheckpointId, OperationId, TransactionId};
