//! # PostgreSQL Work Queue
//!
//! ## Architecture: Claim Function Plus Savepoint-Scoped Items
//!
//! Claims run the configured load query as one statement outside any batch
//! transaction. The bundled `claim_work_items()` function selects eligible
//! rows with `FOR UPDATE SKIP LOCKED` and tags them with the worker id in the
//! same statement, so concurrent workers never receive overlapping rows.
//!
//! A batch is an sqlx transaction. Each item gets a `SAVEPOINT`; a failed
//! conversion issues `ROLLBACK TO SAVEPOINT`, which also clears an aborted
//! transaction state left behind by the converter's failing statement.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use migrator_core::queue::{PgWorkQueue, WorkQueueStore};
//! use sqlx::PgPool;
//!
//! # async fn example(pool: PgPool) -> Result<(), Box<dyn std::error::Error>> {
//! PgWorkQueue::run_migrations(&pool).await?;
//! let queue = PgWorkQueue::new(pool);
//!
//! let batch = queue.claim_batch("migrator-host123", 50, 1).await?;
//! println!("claimed {} legacy records", batch.len());
//! # Ok(())
//! # }
//! ```

use super::{BatchScope, WorkQueueStore};
use crate::constants::{defaults, DEFAULT_PARENT_PATH, ITEM_SAVEPOINT};
use crate::error::{MigratorError, Result};
use crate::models::WorkItem;
use crate::state_machine::{WorkItemEvent, WorkItemStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Postgres, Row, Transaction};
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Work queue backed by the `migration_work_items` table
#[derive(Clone)]
pub struct PgWorkQueue {
    pool: PgPool,
    load_query: String,
}

impl PgWorkQueue {
    /// Create a queue that claims through the bundled claim function
    pub fn new(pool: PgPool) -> Self {
        Self::with_load_query(pool, defaults::LOAD_QUERY)
    }

    /// Create a queue with a custom claim statement
    ///
    /// The statement receives `$1` worker id, `$2` batch size and `$3` status
    /// ceiling, and must return `identity` and `status` columns
    /// (`parent_path` is picked up when present).
    pub fn with_load_query(pool: PgPool, load_query: impl Into<String>) -> Self {
        Self {
            pool,
            load_query: load_query.into(),
        }
    }

    /// Apply the schema shipped in `migrations/`
    pub async fn run_migrations(pool: &PgPool) -> Result<()> {
        sqlx::migrate!("./migrations").run(pool).await?;
        info!("Work queue schema is up to date");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn load_query(&self) -> &str {
        &self.load_query
    }

    fn row_to_work_item(row: &PgRow, worker_id: &str) -> Result<WorkItem> {
        let identity: String = row
            .try_get("identity")
            .map_err(|e| MigratorError::ClaimError(format!("claim row without identity: {e}")))?;
        let code: i32 = row
            .try_get("status")
            .map_err(|e| MigratorError::ClaimError(format!("claim row without status: {e}")))?;
        let status = WorkItemStatus::from_code(code).ok_or_else(|| {
            MigratorError::ClaimError(format!("unknown status code {code} for {identity}"))
        })?;
        // Optional column; custom load queries may omit it
        let parent_path = row
            .try_get::<Option<String>, _>("parent_path")
            .ok()
            .flatten();
        let claimed_at = row
            .try_get::<Option<DateTime<Utc>>, _>("claimed_at")
            .ok()
            .flatten()
            .unwrap_or_else(Utc::now);

        Ok(WorkItem {
            identity,
            claimed_by: Some(worker_id.to_string()),
            claimed_at: Some(claimed_at),
            status,
            error_detail: None,
            parent_path,
        })
    }
}

#[async_trait]
impl WorkQueueStore for PgWorkQueue {
    type Batch = PgBatch;

    #[instrument(skip(self))]
    async fn repair_missing_parent_paths(&self) -> Result<Vec<String>> {
        let repaired: Vec<String> = sqlx::query_scalar(
            r#"
            UPDATE migration_work_items
               SET parent_path = $1, updated_at = NOW()
             WHERE parent_path IS NULL OR BTRIM(parent_path) = ''
            RETURNING identity
            "#,
        )
        .bind(DEFAULT_PARENT_PATH)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to repair missing parent paths: {}", e);
            MigratorError::DatabaseError(format!("Parent path repair failed: {e}"))
        })?;

        if !repaired.is_empty() {
            warn!(
                repaired_count = repaired.len(),
                "Work items had an invalid parent path and were normalized"
            );
        }
        Ok(repaired)
    }

    async fn count_pending(&self, status_ceiling: i32) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM migration_work_items
             WHERE claimed_by IS NULL AND status <= $1
            "#,
        )
        .bind(status_ceiling)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    #[instrument(skip(self), fields(worker_id = %worker_id))]
    async fn claim_batch(
        &self,
        worker_id: &str,
        batch_size: u32,
        status_ceiling: i32,
    ) -> Result<Vec<WorkItem>> {
        let limit = i32::try_from(batch_size).unwrap_or(i32::MAX);

        let rows = sqlx::query(&self.load_query)
            .bind(worker_id)
            .bind(limit)
            .bind(status_ceiling)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to claim work items: {}", e);
                MigratorError::ClaimError(format!("Work item claiming failed: {e}"))
            })?;

        let claimed = rows
            .iter()
            .map(|row| Self::row_to_work_item(row, worker_id))
            .collect::<Result<Vec<_>>>()?;

        if claimed.is_empty() {
            debug!("No eligible work items left to claim");
        } else {
            debug!(claimed_count = claimed.len(), "Claimed work items");
        }
        Ok(claimed)
    }

    async fn begin_batch(&self) -> Result<PgBatch> {
        let tx = self.pool.begin().await.map_err(|e| {
            MigratorError::TransactionError(format!("Failed to open batch transaction: {e}"))
        })?;
        Ok(PgBatch {
            tx,
            item_open: false,
        })
    }

    #[instrument(skip(self))]
    async fn release_claims(&self, worker_id: &str) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE migration_work_items
               SET claimed_by = NULL, claimed_at = NULL, updated_at = NOW()
             WHERE claimed_by = $1 AND status IN ($2, $3)
            "#,
        )
        .bind(worker_id)
        .bind(WorkItemStatus::Pending.code())
        .bind(WorkItemStatus::Processing.code())
        .execute(&self.pool)
        .await?;

        let released = result.rows_affected();
        if released > 0 {
            info!(released, "Released unfinished work item claims");
        }
        Ok(released)
    }

    #[instrument(skip(self))]
    async fn recover_expired_claims(&self, lease: Duration) -> Result<u64> {
        let lease_seconds = i64::try_from(lease.as_secs()).unwrap_or(i64::MAX);
        let result = sqlx::query(
            r#"
            UPDATE migration_work_items
               SET claimed_by = NULL, claimed_at = NULL, updated_at = NOW()
             WHERE claimed_by IS NOT NULL
               AND status IN ($1, $2)
               AND (claimed_at IS NULL
                    OR claimed_at < NOW() - make_interval(secs => $3::double precision))
            "#,
        )
        .bind(WorkItemStatus::Pending.code())
        .bind(WorkItemStatus::Processing.code())
        .bind(lease_seconds)
        .execute(&self.pool)
        .await?;

        let recovered = result.rows_affected();
        if recovered > 0 {
            warn!(recovered, "Recovered work item claims whose lease expired");
        }
        Ok(recovered)
    }

    #[instrument(skip(self))]
    async fn reset_errored(&self) -> Result<u64> {
        let reset_to = WorkItemStatus::Error.transition(&WorkItemEvent::Reset)?;
        let result = sqlx::query(
            r#"
            UPDATE migration_work_items
               SET status = $1, claimed_by = NULL, claimed_at = NULL,
                   error_detail = NULL, updated_at = NOW()
             WHERE status = $2
            "#,
        )
        .bind(reset_to.code())
        .bind(WorkItemStatus::Error.code())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

/// Batch transaction over PostgreSQL
pub struct PgBatch {
    tx: Transaction<'static, Postgres>,
    item_open: bool,
}

impl PgBatch {
    async fn savepoint_command(&mut self, command: &str) -> Result<()> {
        let statement = format!("{command} {ITEM_SAVEPOINT}");
        sqlx::query(&statement)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| MigratorError::TransactionError(format!("{command} failed: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl BatchScope for PgBatch {
    type Target = PgConnection;

    async fn set_status(
        &mut self,
        identity: &str,
        status: WorkItemStatus,
        error_detail: Option<&str>,
    ) -> Result<()> {
        let detail = match status {
            WorkItemStatus::Error => error_detail,
            _ => None,
        };

        let result = sqlx::query(
            r#"
            UPDATE migration_work_items
               SET status = $2, error_detail = $3, updated_at = NOW()
             WHERE identity = $1
            "#,
        )
        .bind(identity)
        .bind(status.code())
        .bind(detail)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(MigratorError::DatabaseError(format!(
                "work item {identity} disappeared from the queue"
            )));
        }
        Ok(())
    }

    async fn begin_item(&mut self) -> Result<()> {
        self.savepoint_command("SAVEPOINT").await?;
        self.item_open = true;
        Ok(())
    }

    async fn rollback_item(&mut self) -> Result<()> {
        if !self.item_open {
            return Err(MigratorError::TransactionError(
                "no item savepoint to roll back to".to_string(),
            ));
        }
        self.savepoint_command("ROLLBACK TO SAVEPOINT").await?;
        self.savepoint_command("RELEASE SAVEPOINT").await?;
        self.item_open = false;
        Ok(())
    }

    async fn release_item(&mut self) -> Result<()> {
        if !self.item_open {
            return Err(MigratorError::TransactionError(
                "no item savepoint to release".to_string(),
            ));
        }
        self.savepoint_command("RELEASE SAVEPOINT").await?;
        self.item_open = false;
        Ok(())
    }

    fn target(&mut self) -> &mut PgConnection {
        &mut *self.tx
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await.map_err(|e| {
            MigratorError::TransactionError(format!("Batch commit failed: {e}"))
        })
    }

    async fn rollback(self) -> Result<()> {
        self.tx.rollback().await.map_err(|e| {
            MigratorError::TransactionError(format!("Batch rollback failed: {e}"))
        })
    }
}
