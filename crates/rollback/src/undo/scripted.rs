//! Scripted in-memory undo action for testing.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::{UndoError, UndoResult, Undoable};

/// One recorded undo attempt.
#[derive(Debug, Clone)]
pub struct ExecutionEntry {
    pub name: String,
    pub started_at: Instant,
    pub finished_at: Instant,
    pub succeeded: bool,
}

/// Shared record of undo attempts across several [`ScriptedUndo`]s.
#[derive(Debug, Clone, Default)]
pub struct ExecutionLog {
    entries: Arc<Mutex<Vec<ExecutionEntry>>>,
}

impl ExecutionLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, entry: ExecutionEntry) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }

    /// Returns all attempts ordered by start time.
    pub fn entries(&self) -> Vec<ExecutionEntry> {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        entries.sort_by_key(|e| e.started_at);
        entries
    }

    /// Returns the attempted action names ordered by start time.
    pub fn names(&self) -> Vec<String> {
        self.entries().into_iter().map(|e| e.name).collect()
    }

    /// Returns the number of attempts made by the named action.
    pub fn attempts(&self, name: &str) -> usize {
        self.entries().iter().filter(|e| e.name == name).count()
    }

    /// Returns the first attempt of the named action, if any.
    pub fn first(&self, name: &str) -> Option<ExecutionEntry> {
        self.entries().into_iter().find(|e| e.name == name)
    }
}

#[derive(Debug, Clone, Copy)]
enum Behaviour {
    Succeed,
    FailTimes(u32),
    AlwaysFail,
    Panic,
}

/// An undo action whose outcome is scripted up front.
#[derive(Debug, Clone)]
pub struct ScriptedUndo {
    name: String,
    log: ExecutionLog,
    behaviour: Behaviour,
    delay: Duration,
    compensation_data: Option<serde_json::Value>,
    calls: Arc<AtomicU32>,
}

impl ScriptedUndo {
    /// Creates an action that always succeeds and records into `log`.
    pub fn new(name: impl Into<String>, log: &ExecutionLog) -> Self {
        Self {
            name: name.into(),
            log: log.clone(),
            behaviour: Behaviour::Succeed,
            delay: Duration::ZERO,
            compensation_data: None,
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Fails the first `n` attempts, then succeeds.
    pub fn failing_times(mut self, n: u32) -> Self {
        self.behaviour = Behaviour::FailTimes(n);
        self
    }

    /// Fails every attempt.
    pub fn always_failing(mut self) -> Self {
        self.behaviour = Behaviour::AlwaysFail;
        self
    }

    /// Panics on every attempt.
    pub fn panicking(mut self) -> Self {
        self.behaviour = Behaviour::Panic;
        self
    }

    /// Sleeps for `delay` inside each attempt.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Returns `data` as compensation data on success.
    pub fn with_compensation_data(mut self, data: serde_json::Value) -> Self {
        self.compensation_data = Some(data);
        self
    }

    /// Returns the number of attempts made so far.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Returns the action as a shareable executor.
    pub fn executor(&self) -> Arc<dyn Undoable> {
        Arc::new(self.clone())
    }
}

#[async_trait]
impl Undoable for ScriptedUndo {
    async fn execute(&self) -> UndoResult {
        let attempt = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let started_at = Instant::now();

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let outcome = match self.behaviour {
            Behaviour::Succeed => Ok(self.compensation_data.clone()),
            Behaviour::FailTimes(n) if attempt <= n => Err(UndoError::new(format!(
                "{} failed on attempt {attempt}",
                self.name
            ))),
            Behaviour::FailTimes(_) => Ok(self.compensation_data.clone()),
            Behaviour::AlwaysFail => Err(UndoError::new(format!("{} failed", self.name))),
            Behaviour::Panic => {
                self.log.record(ExecutionEntry {
                    name: self.name.clone(),
                    started_at,
                    finished_at: Instant::now(),
                    succeeded: false,
                });
                panic!("{} panicked", self.name);
            }
        };

        self.log.record(ExecutionEntry {
            name: self.name.clone(),
            started_at,
            finished_at: Instant::now(),
            succeeded: outcome.is_ok(),
        });

        outcome
    }
}
