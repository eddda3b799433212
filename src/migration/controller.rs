//! # Migration Controller
//!
//! ## Architecture: Run-Level State Machine
//!
//! `INIT -> RUNNING -> {DRAINED | STOPPED | FAILED}`
//!
//! - **INIT** repairs blank parent paths, takes back claims whose lease has
//!   expired, resolves the converter context, logs the start banner and
//!   claims the first batch.
//! - **RUNNING** hands each claimed batch to the [`BatchRunner`] until a
//!   claim comes back empty or a stop request is observed.
//! - **FAILED** is entered on any batch-scoped error. Nothing is retried; a
//!   new run resumes from whatever is still eligible.
//!
//! Claims are tagged `<worker id>:<run id>`, so two processes configured with
//! the same worker id never release each other's in-flight items. Every run
//! ends by releasing its own claims on unfinished items and emitting the
//! shutdown summary, whatever the outcome.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use migrator_core::config::MigrationConfig;
//! use migrator_core::converters::FileAssetConverter;
//! use migrator_core::migration::{MigrationController, StopHandle};
//! use migrator_core::queue::PgWorkQueue;
//! use std::sync::Arc;
//!
//! # async fn example(pool: sqlx::PgPool) {
//! let store = Arc::new(PgWorkQueue::new(pool));
//! let converter = Arc::new(FileAssetConverter::default());
//! let controller = Arc::new(MigrationController::new(
//!     store,
//!     converter,
//!     MigrationConfig::default(),
//!     "migrator-host123",
//! ));
//!
//! let stop = StopHandle::new();
//! let handle = Arc::clone(&controller).spawn(stop.clone());
//! let report = handle.await.expect("migration task panicked");
//! println!("migrated {}", report.summary.migrated_count);
//! # }
//! ```

use super::batch_runner::BatchRunner;
use super::converter::RecordConverter;
use super::progress::{ProgressReporter, ProgressSink, StartBanner, TracingProgressSink};
use super::stop::StopHandle;
use crate::cache::{NoopRecordCache, RecordCache};
use crate::config::MigrationConfig;
use crate::error::{MigratorError, Result};
use crate::models::{RunOutcome, RunReport, RunSummary};
use crate::queue::{BatchScope, WorkQueueStore};
use crate::state_machine::ControllerState;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Owns one worker's view of the migration and drives runs to completion
pub struct MigrationController<S, C> {
    store: Arc<S>,
    converter: Arc<C>,
    cache: Arc<dyn RecordCache>,
    sink: Arc<dyn ProgressSink>,
    config: MigrationConfig,
    worker_id: String,
}

impl<S, C> MigrationController<S, C>
where
    S: WorkQueueStore + 'static,
    C: RecordConverter<<S::Batch as BatchScope>::Target> + 'static,
{
    pub fn new(
        store: Arc<S>,
        converter: Arc<C>,
        config: MigrationConfig,
        worker_id: impl Into<String>,
    ) -> Self {
        Self {
            store,
            converter,
            cache: Arc::new(NoopRecordCache),
            sink: Arc::new(TracingProgressSink),
            config: config.sanitized(),
            worker_id: worker_id.into(),
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn RecordCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_progress_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    /// Run on a dedicated tokio task; `stop` may be triggered from anywhere
    pub fn spawn(self: Arc<Self>, stop: StopHandle) -> JoinHandle<RunReport> {
        tokio::spawn(async move { self.run(&stop).await })
    }

    /// Drive one run on the calling task until it reaches a terminal state
    ///
    /// Item-level failures never surface here; they are recorded on the work
    /// items. Only batch-scoped failures turn the outcome into `Failed`.
    #[instrument(skip_all, fields(worker_id = %self.worker_id))]
    pub async fn run(&self, stop: &StopHandle) -> RunReport {
        let mut summary = RunSummary::start(Uuid::new_v4(), &self.worker_id);
        let mut progress = ProgressReporter::new(Arc::clone(&self.sink), self.config.logging_frequency);
        let mut state = ControllerState::Init;
        // Claims are tagged per run so processes sharing a worker id stay apart
        let claim_owner = format!("{}:{}", self.worker_id, summary.run_id);

        let outcome = match self
            .drive(&mut state, &mut summary, &mut progress, stop, &claim_owner)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(
                    run_id = %summary.run_id,
                    state = %state,
                    error_kind = e.kind(),
                    error = %e,
                    "Migration run failed; no further batches will be claimed"
                );
                if state.can_transition_to(ControllerState::Failed) {
                    state = ControllerState::Failed;
                }
                RunOutcome::Failed {
                    cause: e.to_string(),
                }
            }
        };

        match self.store.release_claims(&claim_owner).await {
            Ok(released) => debug!(released, "Released remaining claims"),
            Err(e) => warn!(error = %e, "Could not release remaining claims"),
        }

        summary.finish();
        debug!(final_state = %state, "Migration run finished");
        let report = RunReport { outcome, summary };
        progress.shutdown(&report);
        report
    }

    async fn drive(
        &self,
        state: &mut ControllerState,
        summary: &mut RunSummary,
        progress: &mut ProgressReporter,
        stop: &StopHandle,
        claim_owner: &str,
    ) -> Result<RunOutcome> {
        let config = &self.config;

        let repaired = self.store.repair_missing_parent_paths().await?;
        for identity in &repaired {
            self.cache.invalidate(identity);
        }

        let recovered = self
            .store
            .recover_expired_claims(config.claim_lease())
            .await?;
        if recovered > 0 {
            info!(
                recovered,
                lease_seconds = config.claim_lease_seconds,
                "Took back claims abandoned by an earlier run"
            );
        }

        let context = self.converter.prepare().await?;
        let pending_count = self.store.count_pending(config.status_ceiling).await?;
        progress.start(&StartBanner {
            pending_count,
            batch_size: config.batch_size,
            run_id: summary.run_id,
            worker_id: self.worker_id.clone(),
            start_time: summary.start_time,
        });

        if stop.is_stop_requested() {
            return Self::finish(state, ControllerState::Stopped, RunOutcome::Stopped);
        }

        let mut items = self.claim(config, claim_owner).await?;
        if items.is_empty() {
            info!("Nothing to migrate: no eligible work items were found");
            return Self::finish(state, ControllerState::Drained, RunOutcome::Drained);
        }
        Self::advance(state, ControllerState::Running)?;

        let runner = BatchRunner::new(
            Arc::clone(&self.store),
            Arc::clone(&self.converter),
            Arc::clone(&self.cache),
        );

        loop {
            summary.batches += 1;
            let result = runner
                .run_batch(&items, &context, stop, progress, summary)
                .await?;

            if result.stop_observed || stop.is_stop_requested() {
                return Self::finish(state, ControllerState::Stopped, RunOutcome::Stopped);
            }

            items = self.claim(config, claim_owner).await?;
            if items.is_empty() {
                return Self::finish(state, ControllerState::Drained, RunOutcome::Drained);
            }
        }
    }

    async fn claim(
        &self,
        config: &MigrationConfig,
        claim_owner: &str,
    ) -> Result<Vec<crate::models::WorkItem>> {
        self.store
            .claim_batch(claim_owner, config.batch_size, config.status_ceiling)
            .await
    }

    fn advance(state: &mut ControllerState, next: ControllerState) -> Result<()> {
        if !state.can_transition_to(next) {
            return Err(MigratorError::StateTransitionError(format!(
                "controller cannot move from '{state}' to '{next}'"
            )));
        }
        debug!(from = %state, to = %next, "Controller state change");
        *state = next;
        Ok(())
    }

    fn finish(
        state: &mut ControllerState,
        next: ControllerState,
        outcome: RunOutcome,
    ) -> Result<RunOutcome> {
        Self::advance(state, next)?;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryRecordCache;
    use crate::migration::ConversionOutcome;
    use crate::models::WorkItem;
    use crate::queue::InMemoryWorkQueue;
    use crate::state_machine::WorkItemStatus;
    use crate::test_helpers::{RecordingSink, ScriptedConverter};

    fn controller(
        queue: &Arc<InMemoryWorkQueue>,
        converter: &Arc<ScriptedConverter>,
        batch_size: u32,
    ) -> MigrationController<InMemoryWorkQueue, ScriptedConverter> {
        let config = MigrationConfig {
            batch_size,
            ..MigrationConfig::default()
        };
        MigrationController::new(Arc::clone(queue), Arc::clone(converter), config, "w1")
    }

    #[tokio::test]
    async fn test_empty_queue_drains_immediately() {
        let queue = Arc::new(InMemoryWorkQueue::new());
        let converter = Arc::new(ScriptedConverter::new());

        let report = controller(&queue, &converter, 10).run(&StopHandle::new()).await;

        assert_eq!(report.outcome, RunOutcome::Drained);
        assert_eq!(report.summary.batches, 0);
        assert_eq!(queue.claim_calls(), 1);
        assert!(report.summary.end_time.is_some());
    }

    #[tokio::test]
    async fn test_stop_before_start_claims_nothing() {
        let queue = Arc::new(InMemoryWorkQueue::with_items(vec![WorkItem::pending("a")]));
        let converter = Arc::new(ScriptedConverter::new());
        let stop = StopHandle::new();
        stop.stop();

        let report = controller(&queue, &converter, 10).run(&stop).await;

        assert_eq!(report.outcome, RunOutcome::Stopped);
        assert_eq!(queue.claim_calls(), 0);
        assert!(converter.calls().is_empty());
    }

    #[tokio::test]
    async fn test_prepare_failure_fails_run() {
        let queue = Arc::new(InMemoryWorkQueue::with_items(vec![WorkItem::pending("a")]));
        let converter = Arc::new(ScriptedConverter::new());
        converter.fail_prepare("system user not found");

        let report = controller(&queue, &converter, 10).run(&StopHandle::new()).await;

        assert!(!report.is_success());
        assert_eq!(queue.claim_calls(), 0);
    }

    #[tokio::test]
    async fn test_repair_pass_invalidates_cache() {
        let mut blank = WorkItem::pending("a");
        blank.parent_path = Some("  ".to_string());
        let queue = Arc::new(InMemoryWorkQueue::with_items(vec![blank]));
        let converter = Arc::new(ScriptedConverter::new());
        let cache = InMemoryRecordCache::new();
        cache.insert("a", "stale");

        let report = controller(&queue, &converter, 10)
            .with_cache(Arc::new(cache.clone()))
            .run(&StopHandle::new())
            .await;

        assert_eq!(report.outcome, RunOutcome::Drained);
        assert_eq!(queue.item("a").unwrap().parent_path.as_deref(), Some("/"));
        // Once for the repair pass, once after processing
        assert_eq!(cache.eviction_count("a"), 2);
    }

    #[tokio::test]
    async fn test_summary_and_banner_reach_sink() {
        let queue = Arc::new(InMemoryWorkQueue::with_items(vec![
            WorkItem::pending("a"),
            WorkItem::pending("b"),
        ]));
        let converter = Arc::new(ScriptedConverter::new());
        converter.script("b", ConversionOutcome::failed("boom"));
        let sink = RecordingSink::new();

        let report = controller(&queue, &converter, 10)
            .with_progress_sink(Arc::new(sink.clone()))
            .run(&StopHandle::new())
            .await;

        let banners = sink.banners();
        assert_eq!(banners.len(), 1);
        assert_eq!(banners[0].pending_count, 2);
        assert_eq!(banners[0].batch_size, 10);
        assert_eq!(banners[0].run_id, report.summary.run_id);

        let shutdowns = sink.shutdowns();
        assert_eq!(shutdowns.len(), 1);
        assert_eq!(shutdowns[0].summary.migrated_count, 1);
        assert_eq!(shutdowns[0].summary.error_count, 1);
        assert_eq!(queue.items_with_status(WorkItemStatus::Error).len(), 1);
    }

    #[tokio::test]
    async fn test_spawned_run_reports_back() {
        let queue = Arc::new(InMemoryWorkQueue::with_items(vec![WorkItem::pending("a")]));
        let converter = Arc::new(ScriptedConverter::new());
        let controller = Arc::new(controller(&queue, &converter, 10));

        let report = Arc::clone(&controller)
            .spawn(StopHandle::new())
            .await
            .unwrap();

        assert_eq!(report.outcome, RunOutcome::Drained);
        assert_eq!(report.summary.migrated_count, 1);
    }
}
