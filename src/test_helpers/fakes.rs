//! In-process doubles for the converter and progress sink seams.

use crate::error::{MigratorError, Result};
use crate::migration::{
    ConversionContext, ConversionOutcome, ProgressSink, RecordConverter, StartBanner, StopHandle,
};
use crate::models::{RunReport, WorkItem};
use crate::queue::StagedRecords;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Default)]
struct Script {
    outcomes: HashMap<String, ConversionOutcome>,
    stops: HashMap<String, StopHandle>,
    prepare_error: Option<String>,
    calls: Vec<String>,
}

/// Converter for [`StagedRecords`] targets with per-identity outcomes
///
/// Unscripted identities convert to `/migrated/{identity}`. Converted
/// outcomes stage their location so commits become observable on the
/// in-memory queue.
#[derive(Debug, Clone, Default)]
pub struct ScriptedConverter {
    script: Arc<Mutex<Script>>,
}

impl ScriptedConverter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn context() -> ConversionContext {
        ConversionContext {
            system_actor: "system".to_string(),
            target_type: "file_asset".to_string(),
        }
    }

    pub fn script(&self, identity: impl Into<String>, outcome: ConversionOutcome) {
        self.script.lock().outcomes.insert(identity.into(), outcome);
    }

    /// Trigger `stop` while `identity` is being converted
    pub fn stop_after(&self, identity: impl Into<String>, stop: StopHandle) {
        self.script.lock().stops.insert(identity.into(), stop);
    }

    pub fn fail_prepare(&self, reason: impl Into<String>) {
        self.script.lock().prepare_error = Some(reason.into());
    }

    /// Identities passed to `convert`, in call order
    pub fn calls(&self) -> Vec<String> {
        self.script.lock().calls.clone()
    }
}

#[async_trait]
impl RecordConverter<StagedRecords> for ScriptedConverter {
    async fn prepare(&self) -> Result<ConversionContext> {
        match &self.script.lock().prepare_error {
            Some(reason) => Err(MigratorError::ConfigurationError(reason.clone())),
            None => Ok(Self::context()),
        }
    }

    async fn convert(
        &self,
        target: &mut StagedRecords,
        _context: &ConversionContext,
        item: &WorkItem,
    ) -> ConversionOutcome {
        let (outcome, stop) = {
            let mut script = self.script.lock();
            script.calls.push(item.identity.clone());
            let outcome = script
                .outcomes
                .get(&item.identity)
                .cloned()
                .unwrap_or_else(|| {
                    ConversionOutcome::converted(format!("/migrated/{}", item.identity))
                });
            (outcome, script.stops.get(&item.identity).cloned())
        };

        // Staged even on failure; the item rollback must discard it
        let location = match &outcome {
            ConversionOutcome::Converted { location } => location.clone(),
            _ => format!("/partial/{}", item.identity),
        };
        target.stage(item.identity.clone(), location);

        if let Some(stop) = stop {
            stop.stop();
        }
        outcome
    }
}

#[derive(Debug, Default)]
struct Recorded {
    banners: Vec<StartBanner>,
    flushes: Vec<Vec<String>>,
    committed: Vec<usize>,
    shutdowns: Vec<RunReport>,
}

/// Progress sink that keeps everything it is given
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    recorded: Arc<Mutex<Recorded>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn banners(&self) -> Vec<StartBanner> {
        self.recorded.lock().banners.clone()
    }

    /// Every item line flushed, in order
    pub fn flushed_lines(&self) -> Vec<String> {
        self.recorded.lock().flushes.concat()
    }

    pub fn flush_sizes(&self) -> Vec<usize> {
        self.recorded.lock().flushes.iter().map(Vec::len).collect()
    }

    pub fn committed_batches(&self) -> Vec<usize> {
        self.recorded.lock().committed.clone()
    }

    pub fn shutdowns(&self) -> Vec<RunReport> {
        self.recorded.lock().shutdowns.clone()
    }
}

impl ProgressSink for RecordingSink {
    fn start_banner(&self, banner: &StartBanner) {
        self.recorded.lock().banners.push(banner.clone());
    }

    fn item_lines(&self, lines: &[String]) {
        self.recorded.lock().flushes.push(lines.to_vec());
    }

    fn batch_committed(&self, items: usize) {
        self.recorded.lock().committed.push(items);
    }

    fn shutdown(&self, report: &RunReport) {
        self.recorded.lock().shutdowns.push(report.clone());
    }
}
