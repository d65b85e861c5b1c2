//! Transactional rollback and recovery.
//!
//! A failed transaction is described by a [`RollbackContext`]: the failure
//! scenario, the chosen [`RollbackStrategy`] and one [`RollbackOperation`]
//! per forward step, each wrapping an [`Undoable`] action. The
//! [`RollbackManager`] runs the context with one of five strategies:
//!
//! - `IMMEDIATE`: sequentially by priority, aborting on a critical failure
//! - `DEFERRED`: dependency batches, each batch concurrently
//! - `CHECKPOINT`: only the operations after the latest checkpoint
//! - `COMPENSATION`: reverse order, one attempt each, never aborting
//! - `HYBRID`: a per-operation mix of the above
//!
//! Progress and outcomes are published as [`RollbackEvent`]s.

pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod execution;
pub mod factory;
pub mod manager;
pub mod operation;
pub mod registry;
pub mod retry;
pub mod strategies;
pub mod strategy;
pub mod undo;

pub use checkpoint_store::{CheckpointData, CheckpointStore, Metadata};
pub use common::{CheckpointId, OperationId, TransactionId};
pub use config::RollbackConfig;
pub use context::{RollbackContext, RollbackResult, RollbackStatus};
pub use error::{ErrorKind, Result, RollbackError};
pub use events::{EventBus, RollbackEvent};
pub use execution::RollbackExecution;
pub use factory::{ComprehensiveOperations, ResourceAction, RollbackStrategyFactory};
pub use manager::RollbackManager;
pub use operation::{RollbackOperation, RollbackOperationBuilder};
pub use registry::RollbackRegistry;
pub use strategy::{FailureScenario, OperationType, RollbackStrategy};
pub use undo::{UndoError, UndoResult, Undoable, undo_fn};
