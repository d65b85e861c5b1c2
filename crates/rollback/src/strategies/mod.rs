//! Rollback algorithms, one module per [`RollbackStrategy`](crate::RollbackStrategy).

pub mod checkpoint;
pub mod compensation;
pub mod deferred;
pub mod hybrid;
pub mod immediate;

pub use deferred::{BatchPlan, dependency_batches};
pub use hybrid::hybrid_strategy_for;
