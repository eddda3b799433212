use crate::error::Result;
use crate::models::WorkItem;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result of converting one legacy record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversionOutcome {
    /// The record now lives at `location` in the target representation
    Converted { location: String },
    /// The record cannot be converted as it stands (missing binary, gone from the legacy store)
    SkippedInvalid { reason: String },
    /// The conversion itself failed
    Failed { error: String },
}

impl ConversionOutcome {
    pub fn converted(location: impl Into<String>) -> Self {
        Self::Converted {
            location: location.into(),
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::SkippedInvalid {
            reason: reason.into(),
        }
    }

    pub fn failed(error: impl fmt::Display) -> Self {
        Self::Failed {
            error: error.to_string(),
        }
    }

    /// Detail persisted as `error_detail`; `None` on success
    pub fn error_detail(&self) -> Option<String> {
        match self {
            Self::Converted { .. } => None,
            Self::SkippedInvalid { reason } => Some(format!("skipped invalid record: {reason}")),
            Self::Failed { error } => Some(error.clone()),
        }
    }
}

/// Run-wide handles resolved once during controller initialization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionContext {
    /// Actor the converter writes as (the system user of the target platform)
    pub system_actor: String,
    /// Schema/content-type handle new records are created under
    pub target_type: String,
}

/// Domain transformation of one legacy record into its new representation
///
/// `T` is the batch scope's target handle (a database connection inside the
/// batch transaction for PostgreSQL), so everything the converter writes is
/// covered by the item savepoint. Converters never see work item status.
#[async_trait]
pub trait RecordConverter<T: Send>: Send + Sync {
    /// Resolve the actor and target type before the first claim
    async fn prepare(&self) -> Result<ConversionContext>;

    async fn convert(
        &self,
        target: &mut T,
        context: &ConversionContext,
        item: &WorkItem,
    ) -> ConversionOutcome;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_detail_by_outcome() {
        assert_eq!(ConversionOutcome::converted("/a").error_detail(), None);
        assert_eq!(
            ConversionOutcome::skipped("binary missing").error_detail(),
            Some("skipped invalid record: binary missing".to_string())
        );
        assert_eq!(
            ConversionOutcome::failed("folder not found").error_detail(),
            Some("folder not found".to_string())
        );
    }

    #[test]
    fn test_outcome_serde_shape() {
        let json = serde_json::to_value(ConversionOutcome::converted("/docs/a.pdf")).unwrap();
        assert_eq!(json["type"], "converted");
        assert_eq!(json["location"], "/docs/a.pdf");
    }
}
