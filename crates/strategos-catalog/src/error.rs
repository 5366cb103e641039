//! Error types for the `strategos-catalog` crate.

use std::path::PathBuf;

/// Errors that can occur while loading or indexing the catalog.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// A fragment file exists but could not be read.
    #[error("failed to read catalog fragment {path}: {source}")]
    Io {
        /// Fragment path.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A fragment file is not valid JSON for its schema.
    #[error("failed to parse catalog fragment {path}: {source}")]
    Parse {
        /// Fragment path.
        path: PathBuf,
        /// The underlying JSON error.
        source: serde_json::Error,
    },

    /// Two templates share an id.
    #[error("duplicate authority-card template id: {0}")]
    DuplicateTemplate(String),

    /// Two shortcuts share a key.
    #[error("duplicate shortcut key: {0}")]
    DuplicateShortcut(String),
}
