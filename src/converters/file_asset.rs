//! # File Asset Converter
//!
//! Turns a row of `legacy_files` into a row of `file_assets` and deletes the
//! legacy row, all on the batch transaction's connection so the item
//! savepoint covers every write.
//!
//! Field mapping:
//!
//! | legacy_files | file_assets   |
//! |--------------|---------------|
//! | file_name    | title         |
//! | file_name    | file_name     |
//! | title        | description   |
//! | host_id      | host_id       |
//! | mod_user     | mod_user      |
//! | mod_date     | mod_date      |
//! | binary_*     | binary_*      |
//!
//! The folder comes from the work item's parent path.

use crate::constants::DEFAULT_PARENT_PATH;
use crate::error::{MigratorError, Result};
use crate::migration::{ConversionContext, ConversionOutcome, RecordConverter};
use crate::models::WorkItem;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection};
use tracing::{debug, warn};

/// Longest description the target schema accepts
pub const MAX_DESCRIPTION_LENGTH: usize = 255;

/// Host id of the platform's system site, which cannot own files
pub const SYSTEM_HOST_ID: &str = "SYSTEM_HOST";

const DEFAULT_SYSTEM_ACTOR: &str = "system";
const DEFAULT_CONTENT_TYPE: &str = "file_asset";

/// Row of the legacy `legacy_files` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct LegacyFile {
    pub identity: String,
    pub host_id: String,
    pub file_name: String,
    pub title: Option<String>,
    pub mod_user: Option<String>,
    pub mod_date: DateTime<Utc>,
    pub binary_path: Option<String>,
    pub binary_size: i64,
}

impl LegacyFile {
    pub fn has_binary(&self) -> bool {
        self.binary_size > 0
            && self
                .binary_path
                .as_deref()
                .is_some_and(|path| !path.trim().is_empty())
    }
}

/// Typed field mapping for one new file asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileAssetFields {
    pub identity: String,
    pub host_id: String,
    pub folder_path: String,
    pub file_name: String,
    pub title: String,
    pub description: Option<String>,
    pub mod_user: Option<String>,
    pub mod_date: DateTime<Utc>,
    pub binary_path: String,
    pub binary_size: i64,
    pub content_type: String,
    pub created_by: String,
}

/// Problems found while validating a [`FileAssetFields`] mapping
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldViolation {
    /// A required field is unusable; the record cannot be migrated
    Required(String),
    /// An optional descriptive field is out of bounds and can be dropped
    Optional(String),
}

impl FileAssetFields {
    /// Build the mapping, or explain why the legacy record is not convertible
    pub fn from_legacy(
        legacy: &LegacyFile,
        item: &WorkItem,
        context: &ConversionContext,
    ) -> std::result::Result<Self, String> {
        if !legacy.has_binary() {
            return Err(format!(
                "legacy file '{}' is not associated to a valid binary file",
                legacy.identity
            ));
        }

        let folder_path = item
            .parent_path
            .as_deref()
            .map(str::trim)
            .filter(|path| !path.is_empty())
            .unwrap_or(DEFAULT_PARENT_PATH)
            .to_string();

        Ok(Self {
            identity: legacy.identity.clone(),
            host_id: legacy.host_id.clone(),
            folder_path,
            file_name: legacy.file_name.clone(),
            title: legacy.file_name.clone(),
            description: legacy.title.clone(),
            mod_user: legacy.mod_user.clone(),
            mod_date: legacy.mod_date,
            binary_path: legacy.binary_path.clone().unwrap_or_default(),
            binary_size: legacy.binary_size,
            content_type: context.target_type.clone(),
            created_by: context.system_actor.clone(),
        })
    }

    pub fn validate(&self) -> Vec<FieldViolation> {
        let mut violations = Vec::new();
        if self.file_name.trim().is_empty() {
            violations.push(FieldViolation::Required("file name is empty".to_string()));
        }
        if self.file_name.trim() == "." {
            violations.push(FieldViolation::Required("file name '.' is not a valid asset name".to_string()));
        }
        if self.host_id.trim().is_empty() {
            violations.push(FieldViolation::Required("host id is empty".to_string()));
        } else if self.host_id == SYSTEM_HOST_ID {
            violations.push(FieldViolation::Required("file belongs to the system host".to_string()));
        }
        if let Some(description) = &self.description {
            let length = description.chars().count();
            if length > MAX_DESCRIPTION_LENGTH {
                violations.push(FieldViolation::Optional(format!(
                    "description is {length} characters long (max {MAX_DESCRIPTION_LENGTH})"
                )));
            }
        }
        violations
    }

    /// Copy of the mapping with every optional descriptive field removed
    pub fn without_optional_fields(&self) -> Self {
        Self {
            description: None,
            ..self.clone()
        }
    }

    /// Location of the new asset: folder path joined with the file name
    pub fn location(&self) -> String {
        if self.folder_path.ends_with('/') {
            format!("{}{}", self.folder_path, self.file_name)
        } else {
            format!("{}/{}", self.folder_path, self.file_name)
        }
    }
}

/// Converts legacy file rows into file asset rows on PostgreSQL
#[derive(Debug, Clone)]
pub struct FileAssetConverter {
    system_actor: String,
    content_type: String,
}

impl Default for FileAssetConverter {
    fn default() -> Self {
        Self::new(DEFAULT_SYSTEM_ACTOR, DEFAULT_CONTENT_TYPE)
    }
}

impl FileAssetConverter {
    pub fn new(system_actor: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self {
            system_actor: system_actor.into(),
            content_type: content_type.into(),
        }
    }

    async fn fetch_legacy(conn: &mut PgConnection, identity: &str) -> Result<Option<LegacyFile>> {
        let legacy = sqlx::query_as::<_, LegacyFile>(
            r#"
            SELECT identity, host_id, file_name, title, mod_user, mod_date,
                   binary_path, binary_size
              FROM legacy_files
             WHERE identity = $1
            "#,
        )
        .bind(identity)
        .fetch_optional(&mut *conn)
        .await?;
        Ok(legacy)
    }

    async fn insert_asset(conn: &mut PgConnection, fields: &FileAssetFields) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO file_assets (
                identity, host_id, folder_path, file_name, title, description,
                mod_user, mod_date, binary_path, binary_size, content_type, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(&fields.identity)
        .bind(&fields.host_id)
        .bind(&fields.folder_path)
        .bind(&fields.file_name)
        .bind(&fields.title)
        .bind(&fields.description)
        .bind(&fields.mod_user)
        .bind(fields.mod_date)
        .bind(&fields.binary_path)
        .bind(fields.binary_size)
        .bind(&fields.content_type)
        .bind(&fields.created_by)
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            MigratorError::ConversionError(format!(
                "file asset insert for {} failed: {e}",
                fields.identity
            ))
        })?;
        Ok(())
    }

    async fn delete_legacy(conn: &mut PgConnection, identity: &str) -> Result<()> {
        sqlx::query("DELETE FROM legacy_files WHERE identity = $1")
            .bind(identity)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    async fn migrate(
        &self,
        conn: &mut PgConnection,
        context: &ConversionContext,
        item: &WorkItem,
    ) -> Result<ConversionOutcome> {
        let Some(legacy) = Self::fetch_legacy(conn, &item.identity).await? else {
            return Ok(ConversionOutcome::skipped(format!(
                "legacy file '{}' no longer exists",
                item.identity
            )));
        };

        let mut fields = match FileAssetFields::from_legacy(&legacy, item, context) {
            Ok(fields) => fields,
            Err(reason) => return Ok(ConversionOutcome::skipped(reason)),
        };

        let violations = fields.validate();
        if let Some(FieldViolation::Required(reason)) = violations
            .iter()
            .find(|violation| matches!(violation, FieldViolation::Required(_)))
        {
            return Ok(ConversionOutcome::skipped(reason.clone()));
        }
        if !violations.is_empty() {
            warn!(
                identity = %item.identity,
                violations = ?violations,
                "Legacy file has invalid fields; retrying without optional fields"
            );
            fields = fields.without_optional_fields();
        }

        Self::delete_legacy(conn, &legacy.identity).await?;
        Self::insert_asset(conn, &fields).await?;

        let location = fields.location();
        debug!(identity = %item.identity, location = %location, "Legacy file converted");
        Ok(ConversionOutcome::converted(location))
    }
}

#[async_trait]
impl RecordConverter<PgConnection> for FileAssetConverter {
    async fn prepare(&self) -> Result<ConversionContext> {
        if self.system_actor.trim().is_empty() {
            return Err(MigratorError::ConfigurationError(
                "system actor identity is empty".to_string(),
            ));
        }
        if self.content_type.trim().is_empty() {
            return Err(MigratorError::ConfigurationError(
                "file asset content type is empty".to_string(),
            ));
        }
        Ok(ConversionContext {
            system_actor: self.system_actor.clone(),
            target_type: self.content_type.clone(),
        })
    }

    async fn convert(
        &self,
        target: &mut PgConnection,
        context: &ConversionContext,
        item: &WorkItem,
    ) -> ConversionOutcome {
        match self.migrate(target, context, item).await {
            Ok(outcome) => outcome,
            Err(e) => ConversionOutcome::failed(e),
        }
    }
}
