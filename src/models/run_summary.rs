use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Aggregate counters for one process run; never persisted
///
/// Counts only include items whose batch transaction committed. Items whose
/// transaction was thrown away after a poisoned status write are tracked in
/// `discarded_count` so operators can reconcile totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub worker_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub migrated_count: u64,
    pub error_count: u64,
    pub discarded_count: u64,
    /// Number of non-empty batches handed to the runner
    pub batches: u64,
}

impl RunSummary {
    pub fn start(run_id: Uuid, worker_id: impl Into<String>) -> Self {
        Self {
            run_id,
            worker_id: worker_id.into(),
            start_time: Utc::now(),
            end_time: None,
            migrated_count: 0,
            error_count: 0,
            discarded_count: 0,
            batches: 0,
        }
    }

    /// Fold a committed batch into the run totals
    pub fn record_committed(&mut self, tally: &BatchTally) {
        self.migrated_count += tally.migrated;
        self.error_count += tally.errors;
    }

    pub fn record_discarded(&mut self, tally: &BatchTally) {
        self.discarded_count += tally.migrated + tally.errors;
    }

    pub fn finish(&mut self) {
        self.end_time = Some(Utc::now());
    }

    /// Elapsed time, measured up to now while the run is still going
    pub fn elapsed(&self) -> Duration {
        self.end_time.unwrap_or_else(Utc::now) - self.start_time
    }

    pub fn processed_count(&self) -> u64 {
        self.migrated_count + self.error_count
    }
}

/// Outcomes of items inside one batch transaction, not yet committed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchTally {
    pub migrated: u64,
    pub errors: u64,
}

/// Terminal state of a run as observed by its caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    Drained,
    Stopped,
    Failed { cause: String },
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }
}

/// What `MigrationController::run` hands back
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    #[serde(flatten)]
    pub outcome: RunOutcome,
    pub summary: RunSummary,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }
}

/// Render a duration as "X Days Y Hours Z Minutes A Seconds"
pub fn format_duration_breakdown(duration: Duration) -> String {
    let total_seconds = duration.num_seconds().max(0);
    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3_600;
    let minutes = (total_seconds % 3_600) / 60;
    let seconds = total_seconds % 60;
    format!("{days} Days {hours} Hours {minutes} Minutes {seconds} Seconds")
}
