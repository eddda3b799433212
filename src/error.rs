//! Error types for the migrator.
//!

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MigratorError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Claim error: {0}")]
    ClaimError(String),
    #[error("Transaction error: {0}")]
    TransactionError(String),
    #[error("State transition error: {0}")]
    StateTransitionError(String),
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Conversion error: {0}")]
    ConversionError(String),
}

impl MigratorError {
    /// Short machine-friendly label used in structured log fields
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DatabaseError(_) => "database",
            Self::ClaimError(_) => "claim",
            Self::TransactionError(_) => "transaction",
            Self::StateTransitionError(_) => "state_transition",
            Self::ConfigurationError(_) => "configuration",
            Self::ValidationError(_) => "validation",
            Self::ConversionError(_) => "conversion",
        }
    }
}

impl From<sqlx::Error> for MigratorError {
    fn from(err: sqlx::Error) -> Self {
        MigratorError::DatabaseError(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for MigratorError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        MigratorError::DatabaseError(format!("Schema migration failed: {err}"))
    }
}

impl From<config::ConfigError> for MigratorError {
    fn from(err: config::ConfigError) -> Self {
        MigratorError::ConfigurationError(err.to_string())
    }
}

impl From<serde_json::Error> for MigratorError {
    fn from(error: serde_json::Error) -> Self {
        MigratorError::ValidationError(format!("JSON serialization error: {error}"))
    }
}

pub type Result<T> = std::result::Result<T, MigratorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_includes_category() {
        let err = MigratorError::ClaimError("connection refused".to_string());
        assert_eq!(err.to_string(), "Claim error: connection refused");
        assert_eq!(err.kind(), "claim");
    }

    #[test]
    fn test_sqlx_error_maps_to_database_error() {
        let err: MigratorError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, MigratorError::DatabaseError(_)));
    }
}
