//! Per-transaction checkpoints for partial rollback.
//!
//! Checkpoints are structural copies of transaction state taken during the
//! forward path, kept in memory in creation order and optionally written
//! through to PostgreSQL.

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod persistence;
pub mod postgres;
pub mod store;

pub use checkpoint::{CheckpointData, Metadata};
pub use common::{CheckpointId, TransactionId};
pub use config::CheckpointConfig;
pub use error::{CheckpointError, Result};
pub use persistence::{CheckpointPersistence, InMemoryCheckpointPersistence};
pub use postgres::PostgresCheckpointPersistence;
pub use store::CheckpointStore;
