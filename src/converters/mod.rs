//! Record converters shipped with the migrator.

pub mod file_asset;

pub use file_asset::{FieldViolation, FileAssetConverter, FileAssetFields, LegacyFile};
