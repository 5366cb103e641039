//! Versioned command catalog for the Strategos simulation core.
//!
//! The catalog is external, read-only input: a map of command codes to
//! capability group and cost, authority-card templates scoped by faction,
//! and shortcut bindings. It is loaded once and indexed into an immutable
//! [`CatalogIndex`].
//!
//! # Modules
//!
//! - [`fragments`] -- Optional JSON fragments and their loaders
//! - [`index`] -- The immutable lookup table
//! - [`error`] -- Catalog errors

pub mod error;
pub mod fragments;
pub mod index;

pub use error::CatalogError;
pub use fragments::{
    CardTemplate, CatalogData, CatalogSources, CommandEntry, CommandsFragment,
    EMPTY_CATALOG_VERSION, Shortcut,
};
pub use index::CatalogIndex;
