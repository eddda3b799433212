use crate::state_machine::WorkItemStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One unit of legacy data awaiting conversion
///
/// Rows live in `migration_work_items`; only the claim operation and the
/// batch runner ever change them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Opaque key into the legacy store
    pub identity: String,
    /// Worker currently owning the item, `None` when unclaimed
    pub claimed_by: Option<String>,
    /// When the current claim was taken
    pub claimed_at: Option<DateTime<Utc>>,
    pub status: WorkItemStatus,
    /// Last failure detail, only present while `status` is `Error`
    pub error_detail: Option<String>,
    /// Derived grouping key normalized by the repair pass
    pub parent_path: Option<String>,
}

impl WorkItem {
    /// A freshly populated, unclaimed item
    pub fn pending(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            claimed_by: None,
            claimed_at: None,
            status: WorkItemStatus::Pending,
            error_detail: None,
            parent_path: None,
        }
    }

    pub fn with_parent_path(mut self, parent_path: impl Into<String>) -> Self {
        self.parent_path = Some(parent_path.into());
        self
    }

    pub fn is_claimed(&self) -> bool {
        self.claimed_by.is_some()
    }

    /// Claimed, unfinished and claimed before `cutoff` (or at an unknown time)
    pub fn claim_expired(&self, cutoff: DateTime<Utc>) -> bool {
        self.is_claimed()
            && !self.status.is_terminal()
            && self.claimed_at.map_or(true, |claimed_at| claimed_at < cutoff)
    }

    /// True when the grouping key is missing or blank and needs repair
    pub fn needs_parent_path_repair(&self) -> bool {
        self.parent_path
            .as_deref()
            .map_or(true, |path| path.trim().is_empty())
    }
}
