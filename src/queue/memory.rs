//! In-process work queue.
//!
//! Batch scopes buffer their writes and only apply them on commit; a failed
//! item's buffered writes are dropped on `rollback_item`, which gives the
//! same isolation a database savepoint does. Fault hooks let tests break
//! individual status writes, commits and claims.

use super::{BatchScope, WorkQueueStore};
use crate::constants::DEFAULT_PARENT_PATH;
use crate::error::{MigratorError, Result};
use crate::models::WorkItem;
use crate::state_machine::{WorkItemEvent, WorkItemStatus};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Default)]
struct MemoryState {
    /// Insertion order doubles as claim order
    items: Vec<WorkItem>,
    /// Committed converter output, identity -> new location
    converted: BTreeMap<String, String>,
    claim_calls: u64,
    faults: FaultPlan,
}

#[derive(Debug, Default)]
struct FaultPlan {
    status_writes: HashSet<(String, WorkItemStatus)>,
    failing_commits: u32,
    claims_allowed: Option<u64>,
}

impl MemoryState {
    fn item_mut(&mut self, identity: &str) -> Option<&mut WorkItem> {
        self.items.iter_mut().find(|item| item.identity == identity)
    }
}

/// Mutex-guarded queue shared by every clone
#[derive(Debug, Clone, Default)]
pub struct InMemoryWorkQueue {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryWorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_items(items: impl IntoIterator<Item = WorkItem>) -> Self {
        let queue = Self::new();
        for item in items {
            queue.insert(item);
        }
        queue
    }

    /// Population step: add an item (replacing one with the same identity)
    pub fn insert(&self, item: WorkItem) {
        let mut state = self.state.lock();
        match state.item_mut(&item.identity) {
            Some(existing) => *existing = item,
            None => state.items.push(item),
        }
    }

    pub fn item(&self, identity: &str) -> Option<WorkItem> {
        self.state
            .lock()
            .items
            .iter()
            .find(|item| item.identity == identity)
            .cloned()
    }

    pub fn items(&self) -> Vec<WorkItem> {
        self.state.lock().items.clone()
    }

    pub fn items_with_status(&self, status: WorkItemStatus) -> Vec<WorkItem> {
        self.state
            .lock()
            .items
            .iter()
            .filter(|item| item.status == status)
            .cloned()
            .collect()
    }

    pub fn converted_records(&self) -> BTreeMap<String, String> {
        self.state.lock().converted.clone()
    }

    /// Total `claim_batch` invocations, including empty and failed ones
    pub fn claim_calls(&self) -> u64 {
        self.state.lock().claim_calls
    }

    /// Make every write of `status` for `identity` fail
    pub fn fail_status_write(&self, identity: impl Into<String>, status: WorkItemStatus) {
        self.state
            .lock()
            .faults
            .status_writes
            .insert((identity.into(), status));
    }

    /// Make the next `count` commits fail
    pub fn fail_next_commits(&self, count: u32) {
        self.state.lock().faults.failing_commits = count;
    }

    /// Let `allowed` more claims succeed, then fail every claim after that
    pub fn fail_claims_after(&self, allowed: u64) {
        let mut state = self.state.lock();
        let already = state.claim_calls;
        state.faults.claims_allowed = Some(already + allowed);
    }
}

#[async_trait]
impl WorkQueueStore for InMemoryWorkQueue {
    type Batch = MemoryBatch;

    async fn repair_missing_parent_paths(&self) -> Result<Vec<String>> {
        let mut state = self.state.lock();
        let mut repaired = Vec::new();
        for item in state
            .items
            .iter_mut()
            .filter(|item| item.needs_parent_path_repair())
        {
            item.parent_path = Some(DEFAULT_PARENT_PATH.to_string());
            repaired.push(item.identity.clone());
        }
        Ok(repaired)
    }

    async fn count_pending(&self, status_ceiling: i32) -> Result<i64> {
        let state = self.state.lock();
        let count = state
            .items
            .iter()
            .filter(|item| !item.is_claimed() && item.status.is_eligible(status_ceiling))
            .count();
        Ok(count as i64)
    }

    async fn claim_batch(
        &self,
        worker_id: &str,
        batch_size: u32,
        status_ceiling: i32,
    ) -> Result<Vec<WorkItem>> {
        let mut state = self.state.lock();
        state.claim_calls += 1;
        if let Some(allowed) = state.faults.claims_allowed {
            if state.claim_calls > allowed {
                return Err(MigratorError::ClaimError(
                    "work queue unavailable".to_string(),
                ));
            }
        }

        let claimed: Vec<WorkItem> = state
            .items
            .iter_mut()
            .filter(|item| !item.is_claimed() && item.status.is_eligible(status_ceiling))
            .take(batch_size as usize)
            .map(|item| {
                item.claimed_by = Some(worker_id.to_string());
                item.claimed_at = Some(Utc::now());
                item.clone()
            })
            .collect();

        debug!(
            worker_id = worker_id,
            claimed_count = claimed.len(),
            "Claimed in-memory work items"
        );
        Ok(claimed)
    }

    async fn begin_batch(&self) -> Result<MemoryBatch> {
        Ok(MemoryBatch {
            state: Arc::clone(&self.state),
            writes: Vec::new(),
            staged: StagedRecords::default(),
            item_mark: None,
        })
    }

    async fn release_claims(&self, worker_id: &str) -> Result<u64> {
        let mut state = self.state.lock();
        let mut released = 0;
        for item in state.items.iter_mut().filter(|item| {
            item.claimed_by.as_deref() == Some(worker_id) && !item.status.is_terminal()
        }) {
            item.claimed_by = None;
            item.claimed_at = None;
            released += 1;
        }
        Ok(released)
    }

    async fn recover_expired_claims(&self, lease: Duration) -> Result<u64> {
        let lease = chrono::Duration::from_std(lease).map_err(|e| {
            MigratorError::ConfigurationError(format!("claim lease out of range: {e}"))
        })?;
        let Some(cutoff) = Utc::now().checked_sub_signed(lease) else {
            return Ok(0);
        };

        let mut state = self.state.lock();
        let mut recovered = 0;
        for item in state
            .items
            .iter_mut()
            .filter(|item| item.claim_expired(cutoff))
        {
            item.claimed_by = None;
            item.claimed_at = None;
            recovered += 1;
        }
        Ok(recovered)
    }

    async fn reset_errored(&self) -> Result<u64> {
        let mut state = self.state.lock();
        let mut reset = 0;
        for item in state
            .items
            .iter_mut()
            .filter(|item| item.status == WorkItemStatus::Error)
        {
            item.status = item.status.transition(&WorkItemEvent::Reset)?;
            item.claimed_by = None;
            item.claimed_at = None;
            item.error_detail = None;
            reset += 1;
        }
        Ok(reset)
    }
}

#[derive(Debug, Clone)]
struct StatusWrite {
    identity: String,
    status: WorkItemStatus,
    error_detail: Option<String>,
}

/// Converter output buffered inside a [`MemoryBatch`]
#[derive(Debug, Default)]
pub struct StagedRecords {
    records: Vec<(String, String)>,
}

impl StagedRecords {
    /// Record the new location produced for `identity`
    pub fn stage(&mut self, identity: impl Into<String>, location: impl Into<String>) {
        self.records.push((identity.into(), location.into()));
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Buffered batch transaction over an [`InMemoryWorkQueue`]
#[derive(Debug)]
pub struct MemoryBatch {
    state: Arc<Mutex<MemoryState>>,
    writes: Vec<StatusWrite>,
    staged: StagedRecords,
    /// Buffer lengths captured when the item savepoint was taken
    item_mark: Option<(usize, usize)>,
}

#[async_trait]
impl BatchScope for MemoryBatch {
    type Target = StagedRecords;

    async fn set_status(
        &mut self,
        identity: &str,
        status: WorkItemStatus,
        error_detail: Option<&str>,
    ) -> Result<()> {
        let injected = self
            .state
            .lock()
            .faults
            .status_writes
            .contains(&(identity.to_string(), status));
        if injected {
            return Err(MigratorError::DatabaseError(format!(
                "status write rejected for {identity} -> {status}"
            )));
        }

        self.writes.push(StatusWrite {
            identity: identity.to_string(),
            status,
            error_detail: error_detail.map(str::to_string),
        });
        Ok(())
    }

    async fn begin_item(&mut self) -> Result<()> {
        self.item_mark = Some((self.writes.len(), self.staged.len()));
        Ok(())
    }

    async fn rollback_item(&mut self) -> Result<()> {
        let (writes_len, staged_len) = self.item_mark.take().ok_or_else(|| {
            MigratorError::TransactionError("no item savepoint to roll back to".to_string())
        })?;
        self.writes.truncate(writes_len);
        self.staged.records.truncate(staged_len);
        Ok(())
    }

    async fn release_item(&mut self) -> Result<()> {
        self.item_mark.take().ok_or_else(|| {
            MigratorError::TransactionError("no item savepoint to release".to_string())
        })?;
        Ok(())
    }

    fn target(&mut self) -> &mut StagedRecords {
        &mut self.staged
    }

    async fn commit(self) -> Result<()> {
        let mut state = self.state.lock();
        if state.faults.failing_commits > 0 {
            state.faults.failing_commits -= 1;
            return Err(MigratorError::TransactionError(
                "commit rejected by work queue".to_string(),
            ));
        }

        for write in self.writes {
            if let Some(item) = state.item_mut(&write.identity) {
                item.status = write.status;
                item.error_detail = match write.status {
                    WorkItemStatus::Error => write.error_detail,
                    _ => None,
                };
            }
        }
        for (identity, location) in self.staged.records {
            state.converted.insert(identity, location);
        }
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        debug!(
            discarded_writes = self.writes.len(),
            "Rolled back in-memory batch"
        );
        Ok(())
    }
}
