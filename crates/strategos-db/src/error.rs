//! Error types for the data layer.
//!
//! Backend failures are reported through [`DbError`] and converted to the
//! core's [`StorageError`] at the [`Store`] boundary.
//!
//! [`Store`]: strategos_core::storage::Store

use strategos_core::storage::StorageError;

/// Errors that can occur in the data layer.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// A `PostgreSQL` operation failed.
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// A `PostgreSQL` migration failed.
    #[error("PostgreSQL migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization or deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored version does not fit the record's counter.
    #[error("Version {version} out of range: {source}")]
    VersionRange {
        /// The stored value.
        version: i64,
        /// The failed conversion.
        source: std::num::TryFromIntError,
    },

    /// A configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<DbError> for StorageError {
    fn from(err: DbError) -> Self {
        Self::Backend(err.to_string())
    }
}
