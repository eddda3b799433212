#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Migrator Core Rust
//!
//! Resumable, claim-based bulk migration of legacy records into a new
//! representation.
//!
//! ## Overview
//!
//! Legacy records are tracked as work items in a persistent queue. A worker
//! claims a bounded batch, converts each item through a pluggable
//! [`migration::RecordConverter`], records MIGRATED or ERROR per item and
//! commits the batch. Runs can be stopped at any time and resumed later;
//! several workers can drain the same queue because claims are atomic.
//!
//! ## Architecture
//!
//! - **One transaction per batch** amortizes commit cost across the batch.
//! - **One savepoint per item** means a bad record only rolls back its own
//!   writes.
//! - **Cooperative stop** is checked between items, never mid-item.
//!
//! ## Module Organization
//!
//! - [`queue`] - Work queue store, claim-and-fetch, batch and item scopes
//! - [`migration`] - Batch runner, progress reporter, migration controller
//! - [`converters`] - Reference converter for legacy file records
//! - [`state_machine`] - Work item and controller lifecycles
//! - [`models`] - Work items and run summaries
//! - [`config`] - Layered configuration
//! - [`cache`] - Record cache invalidation seam
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use migrator_core::config::ConfigManager;
//! use migrator_core::converters::FileAssetConverter;
//! use migrator_core::migration::{MigrationController, StopHandle};
//! use migrator_core::queue::PgWorkQueue;
//! use sqlx::PgPool;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load();
//! let config = manager.config();
//! let pool = PgPool::connect(&config.database_url).await?;
//! PgWorkQueue::run_migrations(&pool).await?;
//!
//! let store = Arc::new(PgWorkQueue::with_load_query(pool, &config.migration.load_query));
//! let controller = MigrationController::new(
//!     store,
//!     Arc::new(FileAssetConverter::default()),
//!     config.migration.clone(),
//!     manager.resolve_worker_id(),
//! );
//!
//! let report = controller.run(&StopHandle::new()).await;
//! println!("{} migrated, {} errors", report.summary.migrated_count, report.summary.error_count);
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! Engine properties are tested against the in-memory queue; PostgreSQL
//! tests use `#[sqlx::test]` and need a `DATABASE_URL`:
//!
//! ```bash
//! cargo test                       # Unit and in-memory integration tests
//! cargo test -- --include-ignored  # Also the PostgreSQL tests
//! ```

pub mod cache;
pub mod config;
pub mod constants;
pub mod converters;
pub mod error;
pub mod logging;
pub mod migration;
pub mod models;
pub mod queue;
pub mod state_machine;
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use config::{ConfigManager, MigrationConfig, MigratorConfig};
pub use error::{MigratorError, Result};
pub use migration::{
    ConversionContext, ConversionOutcome, MigrationController, RecordConverter, StopHandle,
};
pub use models::{RunOutcome, RunReport, RunSummary, WorkItem};
pub use queue::{BatchScope, InMemoryWorkQueue, PgWorkQueue, WorkQueueStore};
pub use state_machine::{ControllerState, WorkItemStatus};
