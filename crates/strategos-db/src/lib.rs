//! `PostgreSQL` storage backend for the Strategos simulation core.
//!
//! Each record family lives in its own table as a JSONB document next to
//! the columns the core filters on (`session_id`, `status`) and the
//! optimistic `version` counter. [`PgStore`] implements the core's
//! [`Store`] trait on a pool opened from the engine's storage settings.
//!
//! # Modules
//!
//! - [`postgres`] -- Pool options and opening with migrations
//! - [`store`] -- [`PgStore`], the versioned record store
//! - [`error`] -- Shared error types
//!
//! [`Store`]: strategos_core::storage::Store

pub mod error;
pub mod postgres;
pub mod store;

pub use error::DbError;
pub use postgres::open_pool;
pub use store::PgStore;
