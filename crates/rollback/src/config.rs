//! Rollback manager configuration loaded from environment variables.

use std::collections::HashSet;
use std::time::Duration;

use checkpoint_store::CheckpointConfig;
use common::OperationId;

/// Default time a finished rollback stays queryable in the active map.
pub const DEFAULT_ACTIVE_RETENTION: Duration = Duration::from_secs(30);

/// Default per-subscriber event buffer.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Rollback manager settings.
///
/// Reads from environment variables:
/// - `ROLLBACK_CRITICAL_OPERATIONS`: comma-separated critical operation ids
/// - `ROLLBACK_TIMEOUT_MS`: whole-rollback deadline (default: none)
/// - `ROLLBACK_ACTIVE_RETENTION_MS`: active-map retention (default: 30s)
/// - `ROLLBACK_REJECT_CYCLES`: fail on dependency cycles (default: `false`)
/// - checkpoint settings, see [`CheckpointConfig::from_env`]
#[derive(Debug, Clone)]
pub struct RollbackConfig {
    pub checkpoints: CheckpointConfig,
    /// Operations whose failure aborts an IMMEDIATE rollback.
    pub critical_operations: HashSet<OperationId>,
    /// Deadline for a whole rollback. `None` leaves it unbounded.
    pub rollback_timeout: Option<Duration>,
    pub active_retention: Duration,
    /// Fail DEFERRED rollbacks on dependency cycles instead of running the
    /// remaining operations as one final batch.
    pub reject_dependency_cycles: bool,
    pub event_capacity: usize,
}

impl RollbackConfig {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            checkpoints: CheckpointConfig::from_env(),
            critical_operations: std::env::var("ROLLBACK_CRITICAL_OPERATIONS")
                .map(|v| parse_operation_list(&v))
                .unwrap_or_default(),
            rollback_timeout: std::env::var("ROLLBACK_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis),
            active_retention: std::env::var("ROLLBACK_ACTIVE_RETENTION_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.active_retention),
            reject_dependency_cycles: std::env::var("ROLLBACK_REJECT_CYCLES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.reject_dependency_cycles),
            event_capacity: defaults.event_capacity,
        }
    }

    /// Returns true if `operation_id` is marked critical.
    pub fn is_critical(&self, operation_id: &OperationId) -> bool {
        self.critical_operations.contains(operation_id)
    }

    /// Marks an operation id as critical.
    pub fn with_critical_operation(mut self, operation_id: impl Into<OperationId>) -> Self {
        self.critical_operations.insert(operation_id.into());
        self
    }

    /// Sets the checkpoint feature flag.
    pub fn with_checkpoints_enabled(mut self, enabled: bool) -> Self {
        self.checkpoints.enabled = enabled;
        self
    }
}

impl Default for RollbackConfig {
    fn default() -> Self {
        Self {
            checkpoints: CheckpointConfig::default(),
            critical_operations: HashSet::new(),
            rollback_timeout: None,
            active_retention: DEFAULT_ACTIVE_RETENTION,
            reject_dependency_cycles: false,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

fn parse_operation_list(value: &str) -> HashSet<OperationId> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(OperationId::from)
        .collect()
}
