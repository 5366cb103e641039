//! Error types for the `strategos-world` crate.

use strategos_types::{ErrorKind, Faction, GridCoord, TerrainType};

/// Errors raised by spatial validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpatialError {
    /// The target cell cannot be entered.
    #[error("cell {cell} is impassable ({terrain:?})")]
    ImpassableTerrain {
        /// The cell.
        cell: GridCoord,
        /// Its terrain.
        terrain: TerrainType,
    },

    /// The faction's unit count on the cell would exceed the limit.
    #[error(
        "cell {cell} capacity exceeded for {faction}: {existing} present + {incoming} incoming > {limit}"
    )]
    GridCapacityExceeded {
        /// The cell.
        cell: GridCoord,
        /// Faction entering.
        faction: Faction,
        /// Units of that faction already on the cell.
        existing: u32,
        /// Units entering.
        incoming: u32,
        /// Per-faction limit.
        limit: u32,
    },

    /// Entering would put more distinct factions on the cell than allowed.
    #[error("cell {cell} already holds {present:?}; at most {limit} factions may share a cell")]
    TooManyFactions {
        /// The cell.
        cell: GridCoord,
        /// Factions already present.
        present: Vec<Faction>,
        /// Maximum distinct factions.
        limit: usize,
    },

    /// More units are leaving than are present.
    #[error("cell {cell} holds {present} {faction} units, cannot remove {requested}")]
    InsufficientUnits {
        /// The cell.
        cell: GridCoord,
        /// Faction leaving.
        faction: Faction,
        /// Units present.
        present: u32,
        /// Units requested to leave.
        requested: u32,
    },
}

impl SpatialError {
    /// Taxonomy category of this error.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InsufficientUnits { .. } => ErrorKind::Validation,
            _ => ErrorKind::Spatial,
        }
    }
}
