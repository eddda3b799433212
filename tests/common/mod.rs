//! Shared fixtures for the engine integration tests.
#![allow(dead_code)]

use migrator_core::config::MigrationConfig;
use migrator_core::migration::MigrationController;
use migrator_core::models::WorkItem;
use migrator_core::queue::InMemoryWorkQueue;
use migrator_core::test_helpers::{RecordingSink, ScriptedConverter};
use std::sync::Arc;

pub const WORKER: &str = "worker-test";

/// Queue, converter and sink wired to one controller
pub struct Fixture {
    pub queue: Arc<InMemoryWorkQueue>,
    pub converter: Arc<ScriptedConverter>,
    pub sink: RecordingSink,
    pub config: MigrationConfig,
}

impl Fixture {
    pub fn with_identities(identities: &[&str]) -> Self {
        Self::with_items(identities.iter().map(|id| WorkItem::pending(*id)).collect())
    }

    /// `count` pending items named `item-000`, `item-001`, ...
    pub fn with_count(count: usize) -> Self {
        Self::with_items(
            (0..count)
                .map(|i| WorkItem::pending(format!("item-{i:03}")))
                .collect(),
        )
    }

    pub fn with_items(items: Vec<WorkItem>) -> Self {
        Self {
            queue: Arc::new(InMemoryWorkQueue::with_items(items)),
            converter: Arc::new(ScriptedConverter::new()),
            sink: RecordingSink::new(),
            config: MigrationConfig::default(),
        }
    }

    pub fn batch_size(mut self, batch_size: u32) -> Self {
        self.config.batch_size = batch_size;
        self
    }

    pub fn logging_frequency(mut self, frequency: u32) -> Self {
        self.config.logging_frequency = frequency;
        self
    }

    pub fn controller(&self) -> MigrationController<InMemoryWorkQueue, ScriptedConverter> {
        MigrationController::new(
            Arc::clone(&self.queue),
            Arc::clone(&self.converter),
            self.config.clone(),
            WORKER,
        )
        .with_progress_sink(Arc::new(self.sink.clone()))
    }
}
