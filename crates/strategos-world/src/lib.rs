//! Strategic grid validation for the Strategos simulation core.
//!
//! # Modules
//!
//! - [`terrain`] -- Terrain table and cell assessment
//! - [`grid`] -- Per-cell, per-faction occupancy limits
//! - [`error`] -- Spatial errors

pub mod error;
pub mod grid;
pub mod terrain;

pub use error::SpatialError;
pub use grid::{
    MAX_FACTIONS_PER_CELL, MAX_UNITS_PER_FACTION, enter_cell, leave_cell, verify_grid_entry_limit,
};
pub use terrain::{ANOMALY_HAZARD, TerrainAssessment, VOID_CODE, assess_terrain, terrain_for_code};
