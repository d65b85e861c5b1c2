use async_trait::async_trait;
use sqlx::PgPool;

use crate::{CheckpointData, CheckpointPersistence, Result};

/// PostgreSQL-backed checkpoint write-through.
///
/// Inserts one row per checkpoint into `rollback_checkpoints`. Re-persisting
/// the same checkpoint id is a no-op.
#[derive(Clone)]
pub struct PostgresCheckpointPersistence {
    pool: PgPool,
}

impl PostgresCheckpointPersistence {
    /// Creates a new PostgreSQL checkpoint backend.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    /// Returns the number of rows stored for a transaction.
    pub async fn count_for_transaction(&self, transaction_id: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM rollback_checkpoints WHERE transaction_id = $1",
        )
        .bind(transaction_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}

#[async_trait]
impl CheckpointPersistence for PostgresCheckpointPersistence {
    async fn persist(&self, checkpoint: &CheckpointData) -> Result<()> {
        let metadata_json = serde_json::to_value(&checkpoint.metadata)?;
        let operation_index = i64::try_from(checkpoint.operation_index).unwrap_or(i64::MAX);

        sqlx::query(
            r#"
            INSERT INTO rollback_checkpoints (id, transaction_id, operation_index, timestamp, state, metadata)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(checkpoint.id.as_uuid())
        .bind(checkpoint.transaction_id.as_str())
        .bind(operation_index)
        .bind(checkpoint.timestamp)
        .bind(&checkpoint.state)
        .bind(metadata_json)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
