//! The undo capability supplied by the data-access layer, plus adapters.

pub mod closure;
pub mod scripted;

use async_trait::async_trait;
use thiserror::Error;

pub use closure::{FnUndo, undo_fn};
pub use scripted::{ExecutionEntry, ExecutionLog, ScriptedUndo};

/// Failure reported by an undo action.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct UndoError(String);

impl UndoError {
    /// Creates an undo error with a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.0
    }
}

/// Outcome of one undo attempt. `Ok(Some(_))` carries compensation data.
pub type UndoResult = std::result::Result<Option<serde_json::Value>, UndoError>;

/// A reversible or compensating action for one forward step.
///
/// Implemented per resource kind by the collaborator that performed the
/// forward write (reverse a row write, delete a created file, call a
/// compensating endpoint). The engine may call `execute` several times when
/// retrying, so implementations should tolerate repeated attempts.
#[async_trait]
pub trait Undoable: Send + Sync {
    /// Attempts the undo once.
    async fn execute(&self) -> UndoResult;
}
