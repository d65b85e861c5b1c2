//! Closure adapter for [`Undoable`].

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use super::{UndoResult, Undoable};

/// Wraps an async closure as an [`Undoable`].
pub struct FnUndo<F> {
    f: F,
}

impl<F> FnUndo<F> {
    /// Creates the adapter.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> Undoable for FnUndo<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = UndoResult> + Send,
{
    async fn execute(&self) -> UndoResult {
        (self.f)().await
    }
}

/// Builds a shareable executor from an async closure.
///
/// ```ignore
/// let executor = undo_fn(|| async { Ok(None) });
/// ```
pub fn undo_fn<F, Fut>(f: F) -> Arc<dyn Undoable>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = UndoResult> + Send + 'static,
{
    Arc::new(FnUndo::new(f))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::undo::UndoError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_closure_result_is_returned() {
        let ok = undo_fn(|| async { Ok(Some(serde_json::json!({"restored": 2}))) });
        assert_eq!(
            ok.execute().await.unwrap(),
            Some(serde_json::json!({"restored": 2}))
        );

        let failing = undo_fn(|| async { Err(UndoError::new("row locked")) });
        assert_eq!(failing.execute().await.unwrap_err().message(), "row locked");
    }

    #[tokio::test]
    async fn test_closure_runs_on_every_call() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let executor = undo_fn(move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(None)
            }
        });

        executor.execute().await.unwrap();
        executor.execute().await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
