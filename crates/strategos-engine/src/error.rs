//! Error types for the engine binary.
//!
//! [`EngineError`] wraps every failure mode during engine startup so that
//! `main` can propagate with `?`.

/// Top-level error for the engine binary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: strategos_core::config::ConfigError,
    },

    /// Catalog fragments could not be loaded.
    #[error("catalog error: {source}")]
    Catalog {
        /// The underlying catalog error.
        #[from]
        source: strategos_catalog::CatalogError,
    },

    /// The `PostgreSQL` backend could not be reached or migrated.
    #[error("database error: {source}")]
    Db {
        /// The underlying data-layer error.
        #[from]
        source: strategos_db::DbError,
    },

    /// A storage call failed during startup.
    #[error("storage error: {source}")]
    Storage {
        /// The underlying storage error.
        #[from]
        source: strategos_core::storage::StorageError,
    },
}
