use super::states::WorkItemStatus;
use crate::error::{MigratorError, Result};
use serde::{Deserialize, Serialize};

/// Events that move a work item through its lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum WorkItemEvent {
    /// The batch runner picked the item up
    Start,
    /// The converter produced the new representation
    Complete,
    /// The converter failed or rejected the record
    Fail(String),
    /// Operator reset of a failed item so a later run retries it
    Reset,
}

impl WorkItemEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Complete => "complete",
            Self::Fail(_) => "fail",
            Self::Reset => "reset",
        }
    }

    /// Extract error detail if this is a failure event
    pub fn error_detail(&self) -> Option<&str> {
        match self {
            Self::Fail(detail) => Some(detail),
            _ => None,
        }
    }

    pub fn fail_with_error(error: impl Into<String>) -> Self {
        Self::Fail(error.into())
    }
}

impl WorkItemStatus {
    /// Apply an event, rejecting anything outside the monotonic lifecycle
    pub fn transition(self, event: &WorkItemEvent) -> Result<WorkItemStatus> {
        let target = match (self, event) {
            (WorkItemStatus::Pending, WorkItemEvent::Start) => WorkItemStatus::Processing,
            // A claim may surface an item a crashed run left in processing
            (WorkItemStatus::Processing, WorkItemEvent::Start) => WorkItemStatus::Processing,
            (WorkItemStatus::Processing, WorkItemEvent::Complete) => WorkItemStatus::Migrated,
            (WorkItemStatus::Processing, WorkItemEvent::Fail(_)) => WorkItemStatus::Error,
            (WorkItemStatus::Error, WorkItemEvent::Reset) => WorkItemStatus::Pending,
            (from, event) => {
                return Err(MigratorError::StateTransitionError(format!(
                    "cannot apply '{}' to a work item in state '{from}'",
                    event.event_type()
                )))
            }
        };
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let status = WorkItemStatus::Pending
            .transition(&WorkItemEvent::Start)
            .unwrap();
        assert_eq!(status, WorkItemStatus::Processing);
        assert_eq!(
            status.transition(&WorkItemEvent::Complete).unwrap(),
            WorkItemStatus::Migrated
        );
    }

    #[test]
    fn test_failure_and_reset() {
        let failed = WorkItemStatus::Processing
            .transition(&WorkItemEvent::fail_with_error("boom"))
            .unwrap();
        assert_eq!(failed, WorkItemStatus::Error);
        assert_eq!(
            failed.transition(&WorkItemEvent::Reset).unwrap(),
            WorkItemStatus::Pending
        );
    }

    #[test]
    fn test_processing_item_can_be_started_again() {
        assert_eq!(
            WorkItemStatus::Processing
                .transition(&WorkItemEvent::Start)
                .unwrap(),
            WorkItemStatus::Processing
        );
        assert!(WorkItemStatus::Error
            .transition(&WorkItemEvent::Start)
            .is_err());
    }

    #[test]
    fn test_terminal_states_reject_progress_events() {
        assert!(WorkItemStatus::Migrated
            .transition(&WorkItemEvent::Start)
            .is_err());
        assert!(WorkItemStatus::Migrated
            .transition(&WorkItemEvent::Reset)
            .is_err());
        assert!(WorkItemStatus::Pending
            .transition(&WorkItemEvent::Complete)
            .is_err());
    }

    #[test]
    fn test_event_helpers() {
        let event = WorkItemEvent::fail_with_error("missing binary");
        assert_eq!(event.event_type(), "fail");
        assert_eq!(event.error_detail(), Some("missing binary"));
        assert_eq!(WorkItemEvent::Start.error_detail(), None);
    }
}
