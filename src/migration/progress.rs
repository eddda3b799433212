//! # Progress Reporter
//!
//! Buffers one line per processed item and writes them out every
//! `logging_frequency` items, plus once more when a batch ends so a partial
//! tail is never lost. Also emits the start banner and the shutdown summary.

use crate::models::{format_duration_breakdown, RunOutcome, RunReport};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Facts logged once before the first batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartBanner {
    pub pending_count: i64,
    pub batch_size: u32,
    pub run_id: Uuid,
    pub worker_id: String,
    pub start_time: DateTime<Utc>,
}

/// Destination for progress output
pub trait ProgressSink: Send + Sync {
    fn start_banner(&self, banner: &StartBanner);

    /// One flush of buffered item lines
    fn item_lines(&self, lines: &[String]);

    fn batch_committed(&self, items: usize);

    fn shutdown(&self, report: &RunReport);
}

/// Sink writing through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingProgressSink;

impl ProgressSink for TracingProgressSink {
    fn start_banner(&self, banner: &StartBanner) {
        info!(
            pending_count = banner.pending_count,
            batch_size = banner.batch_size,
            run_id = %banner.run_id,
            worker_id = %banner.worker_id,
            start_time = %banner.start_time.format(TIMESTAMP_FORMAT),
            "Initializing conversion of legacy records"
        );
    }

    fn item_lines(&self, lines: &[String]) {
        info!(items = lines.len(), "\n{}", lines.join("\n"));
    }

    fn batch_committed(&self, items: usize) {
        info!(items, "Batch committed. Retrieving next batch...");
    }

    fn shutdown(&self, report: &RunReport) {
        let summary = &report.summary;
        let end_time = summary.end_time.unwrap_or_else(Utc::now);
        let elapsed = format_duration_breakdown(summary.elapsed());
        match &report.outcome {
            RunOutcome::Drained => info!(
                run_id = %summary.run_id,
                end_time = %end_time.format(TIMESTAMP_FORMAT),
                total_time = %elapsed,
                migrated = summary.migrated_count,
                errors = summary.error_count,
                "All legacy records have been processed"
            ),
            RunOutcome::Stopped => warn!(
                run_id = %summary.run_id,
                end_time = %end_time.format(TIMESTAMP_FORMAT),
                total_time = %elapsed,
                migrated = summary.migrated_count,
                errors = summary.error_count,
                "The migration process has been manually stopped"
            ),
            RunOutcome::Failed { cause } => error!(
                run_id = %summary.run_id,
                end_time = %end_time.format(TIMESTAMP_FORMAT),
                total_time = %elapsed,
                migrated = summary.migrated_count,
                errors = summary.error_count,
                cause = %cause,
                "The migration process failed"
            ),
        }
    }
}

/// Throttled per-item progress buffer
pub struct ProgressReporter {
    sink: Arc<dyn ProgressSink>,
    logging_frequency: usize,
    buffer: Vec<String>,
    batch_len: usize,
    batch_processed: usize,
    run_processed: u64,
}

impl ProgressReporter {
    pub fn new(sink: Arc<dyn ProgressSink>, logging_frequency: u32) -> Self {
        Self {
            sink,
            logging_frequency: logging_frequency.max(1) as usize,
            buffer: Vec::new(),
            batch_len: 0,
            batch_processed: 0,
            run_processed: 0,
        }
    }

    pub fn start(&self, banner: &StartBanner) {
        self.sink.start_banner(banner);
    }

    pub fn begin_batch(&mut self, batch_len: usize) {
        self.flush();
        self.batch_len = batch_len;
        self.batch_processed = 0;
    }

    /// Buffer the line for one processed item, flushing on the throttle boundary
    pub fn record_item(&mut self, identity: &str, outcome: &str) {
        self.run_processed += 1;
        self.batch_processed += 1;
        self.buffer.push(format!(
            "   {}. Work item {identity}: {outcome}",
            self.run_processed
        ));

        if self.batch_processed % self.logging_frequency == 0
            || self.batch_processed == self.batch_len
        {
            self.flush();
        }
    }

    /// Write out anything still buffered (the batch ended early or unevenly)
    pub fn finish_batch(&mut self) {
        self.flush();
    }

    pub fn batch_committed(&self, items: usize) {
        self.sink.batch_committed(items);
    }

    pub fn shutdown(&mut self, report: &RunReport) {
        self.flush();
        self.sink.shutdown(report);
    }

    /// Items recorded over the whole run
    pub fn run_processed(&self) -> u64 {
        self.run_processed
    }

    fn flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        self.sink.item_lines(&self.buffer);
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::RecordingSink;

    fn reporter(frequency: u32) -> (ProgressReporter, RecordingSink) {
        let sink = RecordingSink::new();
        (
            ProgressReporter::new(Arc::new(sink.clone()), frequency),
            sink,
        )
    }

    #[test]
    fn test_flushes_on_frequency_and_batch_end() {
        let (mut reporter, sink) = reporter(3);
        reporter.begin_batch(7);
        for i in 0..7 {
            reporter.record_item(&format!("item-{i}"), "migrated");
        }
        reporter.finish_batch();

        // 3 + 3 + final partial 1
        assert_eq!(sink.flush_sizes(), vec![3, 3, 1]);
        assert_eq!(sink.flushed_lines().len(), 7);
    }

    #[test]
    fn test_early_batch_end_flushes_partial_buffer() {
        let (mut reporter, sink) = reporter(10);
        reporter.begin_batch(5);
        reporter.record_item("a", "migrated");
        reporter.record_item("b", "error");
        assert!(sink.flushed_lines().is_empty());

        reporter.finish_batch();
        assert_eq!(sink.flush_sizes(), vec![2]);
    }

    #[test]
    fn test_line_numbers_continue_across_batches() {
        let (mut reporter, sink) = reporter(10);
        reporter.begin_batch(1);
        reporter.record_item("a", "migrated");
        reporter.begin_batch(1);
        reporter.record_item("b", "migrated");

        let lines = sink.flushed_lines();
        assert!(lines[0].starts_with("   1. Work item a"));
        assert!(lines[1].starts_with("   2. Work item b"));
        assert_eq!(reporter.run_processed(), 2);
    }
}
