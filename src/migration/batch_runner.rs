//! # Batch Runner
//!
//! Drives one claimed batch through `PENDING -> PROCESSING -> {MIGRATED | ERROR}`.
//!
//! ## Transaction Layout
//!
//! One batch scope covers every item; each item converts inside its own
//! item scope (savepoint). A converter failure rolls back only that item
//! scope and records ERROR, so the rest of the batch still commits.
//!
//! A failed status write or savepoint command leaves the batch scope in an
//! unknown state. The runner rolls it back (best effort), counts the items
//! that were riding on it as discarded, and opens a fresh scope for the next
//! item instead of retrying the write. Items caught this way keep their
//! claim until the controller releases it at the end of the run.

use super::converter::{ConversionContext, ConversionOutcome, RecordConverter};
use super::progress::ProgressReporter;
use super::stop::StopHandle;
use crate::cache::RecordCache;
use crate::error::Result;
use crate::models::{BatchTally, RunSummary, WorkItem};
use crate::queue::{BatchScope, WorkQueueStore};
use crate::state_machine::{WorkItemEvent, WorkItemStatus};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// How one item left PROCESSING
#[derive(Debug, Clone, PartialEq, Eq)]
enum ItemResult {
    Migrated,
    Errored,
    /// The claim surfaced an item the lifecycle does not allow to start
    NotStartable,
}

impl ItemResult {
    fn label(&self) -> &'static str {
        match self {
            Self::Migrated => "migrated",
            Self::Errored => "error",
            Self::NotStartable => "not startable",
        }
    }
}

/// What the runner observed while working a batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchResult {
    /// Items handed to the converter (or rejected before it)
    pub processed: usize,
    /// Batch scopes thrown away after a poisoned write
    pub discarded_scopes: usize,
    /// A stop request was seen before the batch ran out
    pub stop_observed: bool,
}

pub struct BatchRunner<S, C> {
    store: Arc<S>,
    converter: Arc<C>,
    cache: Arc<dyn RecordCache>,
}

impl<S, C> BatchRunner<S, C>
where
    S: WorkQueueStore,
    C: RecordConverter<<S::Batch as BatchScope>::Target>,
{
    pub fn new(store: Arc<S>, converter: Arc<C>, cache: Arc<dyn RecordCache>) -> Self {
        Self {
            store,
            converter,
            cache,
        }
    }

    /// Process `items` in claim order and commit the surviving batch scope
    ///
    /// Committed outcomes are folded into `summary`. An `Err` is batch-scoped
    /// (scope could not be opened, commit failed) and ends the run.
    pub async fn run_batch(
        &self,
        items: &[WorkItem],
        context: &ConversionContext,
        stop: &StopHandle,
        progress: &mut ProgressReporter,
        summary: &mut RunSummary,
    ) -> Result<BatchResult> {
        let mut result = BatchResult::default();
        let mut scope: Option<S::Batch> = None;
        let mut tally = BatchTally::default();

        progress.begin_batch(items.len());

        for item in items {
            if stop.is_stop_requested() {
                info!(
                    identity = %item.identity,
                    "Stop requested; leaving the rest of the batch unprocessed"
                );
                result.stop_observed = true;
                break;
            }

            let mut batch = match scope.take() {
                Some(batch) => batch,
                None => self.store.begin_batch().await?,
            };

            match self.process_item(&mut batch, context, item).await {
                Ok(outcome) => {
                    match outcome {
                        ItemResult::Migrated => tally.migrated += 1,
                        ItemResult::Errored => tally.errors += 1,
                        ItemResult::NotStartable => {}
                    }
                    progress.record_item(&item.identity, outcome.label());
                    scope = Some(batch);
                }
                Err(e) => {
                    error!(
                        identity = %item.identity,
                        error = %e,
                        "Work item status write failed; discarding the batch transaction"
                    );
                    if let Err(rollback_error) = batch.rollback().await {
                        warn!(
                            error = %rollback_error,
                            "Rollback of the poisoned batch transaction failed"
                        );
                    }
                    // The poisoned item is part of what was thrown away
                    tally.errors += 1;
                    summary.record_discarded(&tally);
                    tally = BatchTally::default();
                    result.discarded_scopes += 1;
                    progress.record_item(&item.identity, "write failed");
                }
            }

            self.cache.invalidate(&item.identity);
            result.processed += 1;
        }

        progress.finish_batch();

        if let Some(batch) = scope {
            if let Err(e) = batch.commit().await {
                summary.record_discarded(&tally);
                return Err(e);
            }
            summary.record_committed(&tally);
            progress.batch_committed(result.processed);
        }

        debug!(
            processed = result.processed,
            migrated = tally.migrated,
            errors = tally.errors,
            discarded_scopes = result.discarded_scopes,
            "Batch finished"
        );
        Ok(result)
    }

    /// Convert one item inside its own item scope
    ///
    /// `Err` means a write against the batch scope failed, which poisons it.
    async fn process_item(
        &self,
        batch: &mut S::Batch,
        context: &ConversionContext,
        item: &WorkItem,
    ) -> Result<ItemResult> {
        let processing = match item.status.transition(&WorkItemEvent::Start) {
            Ok(status) => status,
            Err(e) => {
                warn!(identity = %item.identity, error = %e, "Claimed work item cannot be started");
                return Ok(ItemResult::NotStartable);
            }
        };

        batch.set_status(&item.identity, processing, None).await?;
        batch.begin_item().await?;

        let outcome = self
            .converter
            .convert(batch.target(), context, item)
            .await;

        match outcome {
            ConversionOutcome::Converted { location } => {
                batch.release_item().await?;
                let migrated = processing.transition(&WorkItemEvent::Complete)?;
                batch.set_status(&item.identity, migrated, None).await?;
                debug!(identity = %item.identity, location = %location, "Work item migrated");
                Ok(ItemResult::Migrated)
            }
            ConversionOutcome::SkippedInvalid { ref reason } => {
                warn!(identity = %item.identity, reason = %reason, "Skipping invalid legacy record");
                self.mark_errored(batch, processing, item, &outcome).await
            }
            ConversionOutcome::Failed { ref error } => {
                error!(identity = %item.identity, error = %error, "Conversion of legacy record failed");
                self.mark_errored(batch, processing, item, &outcome).await
            }
        }
    }

    async fn mark_errored(
        &self,
        batch: &mut S::Batch,
        processing: WorkItemStatus,
        item: &WorkItem,
        outcome: &ConversionOutcome,
    ) -> Result<ItemResult> {
        batch.rollback_item().await?;

        let detail = outcome
            .error_detail()
            .unwrap_or_else(|| "conversion failed".to_string());
        let errored = processing.transition(&WorkItemEvent::fail_with_error(detail.as_str()))?;
        batch
            .set_status(&item.identity, errored, Some(&detail))
            .await?;
        Ok(ItemResult::Errored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryRecordCache;
    use crate::queue::InMemoryWorkQueue;
    use crate::test_helpers::{RecordingSink, ScriptedConverter};
    use uuid::Uuid;

    struct Harness {
        queue: Arc<InMemoryWorkQueue>,
        converter: Arc<ScriptedConverter>,
        cache: InMemoryRecordCache,
        sink: RecordingSink,
    }

    impl Harness {
        fn new(identities: &[&str]) -> Self {
            Self {
                queue: Arc::new(InMemoryWorkQueue::with_items(
                    identities.iter().map(|id| WorkItem::pending(*id)),
                )),
                converter: Arc::new(ScriptedConverter::new()),
                cache: InMemoryRecordCache::new(),
                sink: RecordingSink::new(),
            }
        }

        async fn run(&self, stop: &StopHandle) -> (Result<BatchResult>, RunSummary) {
            let runner = BatchRunner::new(
                Arc::clone(&self.queue),
                Arc::clone(&self.converter),
                Arc::new(self.cache.clone()),
            );
            let items = self.queue.claim_batch("w1", 100, 1).await.unwrap();
            let mut progress = ProgressReporter::new(Arc::new(self.sink.clone()), 10);
            let mut summary = RunSummary::start(Uuid::new_v4(), "w1");
            let context = ScriptedConverter::context();
            let result = runner
                .run_batch(&items, &context, stop, &mut progress, &mut summary)
                .await;
            (result, summary)
        }
    }

    #[tokio::test]
    async fn test_failed_item_is_isolated() {
        let harness = Harness::new(&["a", "b", "c"]);
        harness
            .converter
            .script("b", ConversionOutcome::failed("folder missing"));

        let (result, summary) = harness.run(&StopHandle::new()).await;
        let result = result.unwrap();

        assert_eq!(result.processed, 3);
        assert_eq!(summary.migrated_count, 2);
        assert_eq!(summary.error_count, 1);
        let b = harness.queue.item("b").unwrap();
        assert_eq!(b.status, WorkItemStatus::Error);
        assert_eq!(b.error_detail.as_deref(), Some("folder missing"));
        // The failed item's staged output was rolled back with its savepoint
        let converted = harness.queue.converted_records();
        assert!(converted.contains_key("a"));
        assert!(!converted.contains_key("b"));
        assert!(converted.contains_key("c"));
    }

    #[tokio::test]
    async fn test_skipped_record_becomes_error_with_reason() {
        let harness = Harness::new(&["a"]);
        harness
            .converter
            .script("a", ConversionOutcome::skipped("binary missing"));

        let (result, _) = harness.run(&StopHandle::new()).await;
        result.unwrap();

        let a = harness.queue.item("a").unwrap();
        assert_eq!(a.status, WorkItemStatus::Error);
        assert_eq!(
            a.error_detail.as_deref(),
            Some("skipped invalid record: binary missing")
        );
    }

    #[tokio::test]
    async fn test_poisoned_write_discards_scope_and_continues() {
        let harness = Harness::new(&["a", "b", "c"]);
        harness.queue.fail_status_write("b", WorkItemStatus::Migrated);

        let (result, summary) = harness.run(&StopHandle::new()).await;
        let result = result.unwrap();

        assert_eq!(result.discarded_scopes, 1);
        // a rode on the discarded scope, c got a fresh one
        assert_eq!(harness.queue.item("a").unwrap().status, WorkItemStatus::Pending);
        assert_eq!(harness.queue.item("b").unwrap().status, WorkItemStatus::Pending);
        assert_eq!(harness.queue.item("c").unwrap().status, WorkItemStatus::Migrated);
        assert_eq!(summary.migrated_count, 1);
        assert_eq!(summary.discarded_count, 2);
        assert_eq!(harness.converter.calls(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_commit_failure_propagates() {
        let harness = Harness::new(&["a"]);
        harness.queue.fail_next_commits(1);

        let (result, summary) = harness.run(&StopHandle::new()).await;

        assert!(result.is_err());
        assert_eq!(summary.migrated_count, 0);
        assert_eq!(summary.discarded_count, 1);
        assert_eq!(harness.queue.item("a").unwrap().status, WorkItemStatus::Pending);
    }

    #[tokio::test]
    async fn test_stop_before_next_item() {
        let harness = Harness::new(&["a", "b", "c"]);
        let stop = StopHandle::new();
        harness.converter.stop_after("a", stop.clone());

        let (result, summary) = harness.run(&stop).await;
        let result = result.unwrap();

        assert!(result.stop_observed);
        assert_eq!(result.processed, 1);
        assert_eq!(summary.migrated_count, 1);
        assert_eq!(harness.converter.calls(), vec!["a"]);
        assert_eq!(harness.queue.item("b").unwrap().status, WorkItemStatus::Pending);
    }

    #[tokio::test]
    async fn test_cache_invalidated_for_each_processed_item() {
        let harness = Harness::new(&["a", "b"]);
        harness.cache.insert("a", "cached");
        harness
            .converter
            .script("b", ConversionOutcome::failed("bad"));

        let (result, _) = harness.run(&StopHandle::new()).await;
        result.unwrap();

        assert!(!harness.cache.contains("a"));
        assert_eq!(harness.cache.eviction_count("a"), 1);
        assert_eq!(harness.cache.eviction_count("b"), 1);
    }

    #[tokio::test]
    async fn test_progress_lines_cover_every_item() {
        let harness = Harness::new(&["a", "b", "c"]);
        let (result, _) = harness.run(&StopHandle::new()).await;
        result.unwrap();

        assert_eq!(harness.sink.flushed_lines().len(), 3);
        assert_eq!(harness.sink.committed_batches(), vec![3]);
    }
}
