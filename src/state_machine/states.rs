use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a work item as persisted in the status column
///
/// The numeric codes are what the store holds; eligibility for claiming is
/// expressed as `status <= status_ceiling`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkItemStatus {
    /// Populated and waiting to be claimed
    Pending,
    /// Being converted inside a batch transaction
    Processing,
    /// Converted successfully
    Migrated,
    /// Conversion failed; `error_detail` holds the reason
    Error,
}

impl WorkItemStatus {
    /// Numeric code stored in the work queue table
    pub fn code(&self) -> i32 {
        match self {
            Self::Pending => 0,
            Self::Processing => 1,
            Self::Migrated => 2,
            Self::Error => 3,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Pending),
            1 => Some(Self::Processing),
            2 => Some(Self::Migrated),
            3 => Some(Self::Error),
            _ => None,
        }
    }

    /// Check if this is a terminal state for a run
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Migrated | Self::Error)
    }

    /// Check if an item with this status may be claimed under the given ceiling
    pub fn is_eligible(&self, status_ceiling: i32) -> bool {
        self.code() <= status_ceiling
    }
}

impl fmt::Display for WorkItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Processing => write!(f, "processing"),
            Self::Migrated => write!(f, "migrated"),
            Self::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for WorkItemStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "migrated" => Ok(Self::Migrated),
            "error" => Ok(Self::Error),
            _ => Err(format!("Invalid work item status: {s}")),
        }
    }
}

impl Default for WorkItemStatus {
    fn default() -> Self {
        Self::Pending
    }
}

/// Run-level states of the migration controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerState {
    Init,
    Running,
    /// Claim-and-fetch returned nothing; the queue is exhausted
    Drained,
    /// A stop request was observed between two items
    Stopped,
    /// A batch-scoped failure ended the run
    Failed,
}

impl ControllerState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Drained | Self::Stopped | Self::Failed)
    }

    /// Whether `target` is reachable from this state in one step
    pub fn can_transition_to(&self, target: ControllerState) -> bool {
        matches!(
            (self, target),
            (Self::Init, Self::Running)
                | (Self::Init, Self::Drained)
                | (Self::Init, Self::Stopped)
                | (Self::Init, Self::Failed)
                | (Self::Running, Self::Drained)
                | (Self::Running, Self::Stopped)
                | (Self::Running, Self::Failed)
        )
    }
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => write!(f, "init"),
            Self::Running => write!(f, "running"),
            Self::Drained => write!(f, "drained"),
            Self::Stopped => write!(f, "stopped"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl Default for ControllerState {
    fn default() -> Self {
        Self::Init
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_round_trip() {
        for status in [
            WorkItemStatus::Pending,
            WorkItemStatus::Processing,
            WorkItemStatus::Migrated,
            WorkItemStatus::Error,
        ] {
            assert_eq!(WorkItemStatus::from_code(status.code()), Some(status));
        }
        assert_eq!(WorkItemStatus::from_code(7), None);
    }

    #[test]
    fn test_status_eligibility_under_default_ceiling() {
        assert!(WorkItemStatus::Pending.is_eligible(1));
        assert!(WorkItemStatus::Processing.is_eligible(1));
        assert!(!WorkItemStatus::Migrated.is_eligible(1));
        assert!(!WorkItemStatus::Error.is_eligible(1));
    }

    #[test]
    fn test_status_string_conversion() {
        assert_eq!(WorkItemStatus::Processing.to_string(), "processing");
        assert_eq!(
            "error".parse::<WorkItemStatus>().unwrap(),
            WorkItemStatus::Error
        );
        assert!("done".parse::<WorkItemStatus>().is_err());
    }

    #[test]
    fn test_controller_terminal_states_are_final() {
        for terminal in [
            ControllerState::Drained,
            ControllerState::Stopped,
            ControllerState::Failed,
        ] {
            assert!(terminal.is_terminal());
            assert!(!terminal.can_transition_to(ControllerState::Running));
            assert!(!terminal.can_transition_to(ControllerState::Failed));
        }
        assert!(ControllerState::Init.can_transition_to(ControllerState::Running));
        assert!(!ControllerState::Running.can_transition_to(ControllerState::Init));
    }

    #[test]
    fn test_state_serde() {
        let json = serde_json::to_string(&ControllerState::Drained).unwrap();
        assert_eq!(json, "\"drained\"");
        let parsed: WorkItemStatus = serde_json::from_str("\"migrated\"").unwrap();
        assert_eq!(parsed, WorkItemStatus::Migrated);
    }
}
