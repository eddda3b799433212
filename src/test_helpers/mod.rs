// Test Helpers Module - Shared Testing Infrastructure
//
// Scripted converters and recording sinks for driving the engine against the
// in-memory queue, plus database helpers for the PostgreSQL integration tests.

pub mod fakes;
pub mod test_utils;

pub use fakes::{RecordingSink, ScriptedConverter};
pub use test_utils::{get_test_database_url, seed_legacy_file, seed_work_items, MIGRATOR};
