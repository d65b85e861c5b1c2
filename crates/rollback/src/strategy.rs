//! Rollback strategies, failure scenarios and operation kinds.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RollbackError;

/// The recovery algorithm applied to a rollback context.
///
/// ```text
/// IMMEDIATE     priority order, sequential, retries, critical ops abort
/// DEFERRED      dependency batches, concurrent within a batch
/// CHECKPOINT    only operations after the latest checkpoint
/// COMPENSATION  exact reverse order, single attempt, best-effort
/// HYBRID        per-operation choice among the above
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RollbackStrategy {
    Immediate,
    Deferred,
    Checkpoint,
    Compensation,
    Hybrid,
}

impl RollbackStrategy {
    /// Returns the strategy name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            RollbackStrategy::Immediate => "IMMEDIATE",
            RollbackStrategy::Deferred => "DEFERRED",
            RollbackStrategy::Checkpoint => "CHECKPOINT",
            RollbackStrategy::Compensation => "COMPENSATION",
            RollbackStrategy::Hybrid => "HYBRID",
        }
    }
}

impl std::fmt::Display for RollbackStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RollbackStrategy {
    type Err = RollbackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "IMMEDIATE" => Ok(RollbackStrategy::Immediate),
            "DEFERRED" => Ok(RollbackStrategy::Deferred),
            "CHECKPOINT" => Ok(RollbackStrategy::Checkpoint),
            "COMPENSATION" => Ok(RollbackStrategy::Compensation),
            "HYBRID" => Ok(RollbackStrategy::Hybrid),
            other => Err(RollbackError::Validation(format!(
                "Unsupported rollback strategy: {other}"
            ))),
        }
    }
}

/// The classified root cause of the failure being rolled back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureScenario {
    OperationFailure,
    Timeout,
    Deadlock,
    ConstraintViolation,
    NetworkFailure,
    ResourceExhausted,
    ConcurrencyConflict,
    BusinessRuleViolation,
    ExternalServiceFailure,
    SystemFailure,
}

impl FailureScenario {
    /// Default strategy for a whole rollback caused by this scenario.
    pub fn default_strategy(&self) -> RollbackStrategy {
        match self {
            FailureScenario::Deadlock | FailureScenario::ConcurrencyConflict => {
                RollbackStrategy::Immediate
            }
            FailureScenario::NetworkFailure | FailureScenario::ExternalServiceFailure => {
                RollbackStrategy::Compensation
            }
            FailureScenario::Timeout | FailureScenario::ResourceExhausted => {
                RollbackStrategy::Checkpoint
            }
            _ => RollbackStrategy::Hybrid,
        }
    }

    /// Strategy for a single operation inside a hybrid rollback, when the
    /// operation's own type and dependencies do not decide it.
    pub fn hybrid_strategy(&self) -> RollbackStrategy {
        match self {
            FailureScenario::Timeout | FailureScenario::NetworkFailure => {
                RollbackStrategy::Compensation
            }
            FailureScenario::Deadlock | FailureScenario::ConcurrencyConflict => {
                RollbackStrategy::Immediate
            }
            FailureScenario::ConstraintViolation | FailureScenario::BusinessRuleViolation => {
                RollbackStrategy::Checkpoint
            }
            _ => RollbackStrategy::Immediate,
        }
    }

    /// Returns the scenario name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureScenario::OperationFailure => "OPERATION_FAILURE",
            FailureScenario::Timeout => "TIMEOUT",
            FailureScenario::Deadlock => "DEADLOCK",
            FailureScenario::ConstraintViolation => "CONSTRAINT_VIOLATION",
            FailureScenario::NetworkFailure => "NETWORK_FAILURE",
            FailureScenario::ResourceExhausted => "RESOURCE_EXHAUSTED",
            FailureScenario::ConcurrencyConflict => "CONCURRENCY_CONFLICT",
            FailureScenario::BusinessRuleViolation => "BUSINESS_RULE_VIOLATION",
            FailureScenario::ExternalServiceFailure => "EXTERNAL_SERVICE_FAILURE",
            FailureScenario::SystemFailure => "SYSTEM_FAILURE",
        }
    }
}

impl std::fmt::Display for FailureScenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a rollback operation reverses its forward step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationType {
    /// Directly reverses the forward write.
    #[default]
    Undo,
    /// Runs an inverse business action (saga compensation).
    Compensate,
    /// Restores state captured by a checkpoint.
    CheckpointRestore,
}

impl OperationType {
    /// Returns the operation type name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Undo => "UNDO",
            OperationType::Compensate => "COMPENSATE",
            OperationType::CheckpointRestore => "CHECKPOINT_RESTORE",
        }
    }
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
