// State machines for work items and the migration controller
//
// Work item transitions are validated here before the batch runner persists
// them; the controller uses the same checks for its run-level states.

pub mod events;
pub mod states;

// Re-export main types for convenient access
pub use events::WorkItemEvent;
pub use states::{ControllerState, WorkItemStatus};
