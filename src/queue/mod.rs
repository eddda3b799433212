//! # Work Queue Store
//!
//! The persistent queue of legacy records awaiting conversion, and the
//! two-level transaction model the batch runner works through.
//!
//! ## Architecture: Claim, Then Convert Under One Transaction
//!
//! - **Claim-and-Fetch** tags a bounded set of eligible rows with the
//!   caller's worker id in a single statement, so two workers can never be
//!   handed the same identity.
//! - **Batch scope** is one transaction spanning every item of a claimed batch.
//! - **Item scope** is a savepoint inside the batch scope; rolling it back
//!   undoes one item's writes without touching the rest of the batch.
//!
//! The record converter only ever sees [`BatchScope::target`], so it can
//! write its new representation inside the transaction but has no way to
//! touch work item status.

pub mod memory;
pub mod postgres;

use crate::error::Result;
use crate::models::WorkItem;
use crate::state_machine::WorkItemStatus;
use async_trait::async_trait;
use std::time::Duration;

pub use memory::{InMemoryWorkQueue, MemoryBatch, StagedRecords};
pub use postgres::{PgBatch, PgWorkQueue};

/// Storage backing the migration queue
#[async_trait]
pub trait WorkQueueStore: Send + Sync {
    type Batch: BatchScope;

    /// Normalize blank grouping keys; returns the identities that changed
    async fn repair_missing_parent_paths(&self) -> Result<Vec<String>>;

    /// Unclaimed items currently eligible under `status_ceiling`
    async fn count_pending(&self, status_ceiling: i32) -> Result<i64>;

    /// Atomically claim up to `batch_size` eligible items for `worker_id`
    ///
    /// An empty result means the queue is exhausted; it is not an error.
    async fn claim_batch(
        &self,
        worker_id: &str,
        batch_size: u32,
        status_ceiling: i32,
    ) -> Result<Vec<WorkItem>>;

    /// Open the transaction that will cover one batch
    async fn begin_batch(&self) -> Result<Self::Batch>;

    /// Drop the claims tagged `worker_id` on items that never reached a terminal status
    async fn release_claims(&self, worker_id: &str) -> Result<u64>;

    /// Clear unfinished claims older than `lease`, whoever holds them
    ///
    /// Recovers items whose owner died without releasing them. Claims with no
    /// recorded claim time count as expired.
    async fn recover_expired_claims(&self, lease: Duration) -> Result<u64>;

    /// Operator reset: failed items become pending and unclaimed again
    async fn reset_errored(&self) -> Result<u64>;
}

/// One open batch transaction with a nested per-item savepoint
#[async_trait]
pub trait BatchScope: Send + Sized {
    /// Handle through which a converter writes its output
    type Target: Send;

    async fn set_status(
        &mut self,
        identity: &str,
        status: WorkItemStatus,
        error_detail: Option<&str>,
    ) -> Result<()>;

    /// Establish the savepoint for the item about to be converted
    async fn begin_item(&mut self) -> Result<()>;

    /// Undo everything written since [`BatchScope::begin_item`]
    async fn rollback_item(&mut self) -> Result<()>;

    /// Keep the item's writes and discard the savepoint
    async fn release_item(&mut self) -> Result<()>;

    fn target(&mut self) -> &mut Self::Target;

    async fn commit(self) -> Result<()>;

    async fn rollback(self) -> Result<()>;
}
