pub mod run_summary;
pub mod work_item;

// Re-export core models for easy access
pub use run_summary::{
    format_duration_breakdown, BatchTally, RunOutcome, RunReport, RunSummary,
};
pub use work_item::WorkItem;
