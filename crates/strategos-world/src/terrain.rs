//! Terrain lookup for the strategic grid.
//!
//! Grid cells store a raw `u8` code. Known codes map through a fixed table.
//! Out-of-bounds coordinates and the [`VOID_CODE`] sentinel resolve to
//! impassable void. Any other unknown code resolves to a low-hazard anomaly
//! rather than failing, so sparse or partially authored grids stay usable.

use serde::{Deserialize, Serialize};
use strategos_types::{GridCoord, StrategicGrid, TerrainType};

/// Sentinel grid value for a blocked cell.
pub const VOID_CODE: u8 = 255;

/// Hazard level assigned to unknown grid values.
pub const ANOMALY_HAZARD: u8 = 1;

/// Terrain facts for one cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerrainAssessment {
    /// Terrain classification.
    pub terrain_type: TerrainType,
    /// Hazard level, 0 (safe) to 5.
    pub hazard_level: u8,
    /// Whether units may enter.
    pub impassable: bool,
}

impl TerrainAssessment {
    const fn passable(terrain_type: TerrainType, hazard_level: u8) -> Self {
        Self {
            terrain_type,
            hazard_level,
            impassable: false,
        }
    }

    /// The impassable void assessment.
    pub const VOID: Self = Self {
        terrain_type: TerrainType::Void,
        hazard_level: 5,
        impassable: true,
    };
}

/// Map a raw grid code through the terrain table.
pub const fn terrain_for_code(code: u8) -> TerrainAssessment {
    match code {
        0 => TerrainAssessment::passable(TerrainType::Space, 0),
        1 => TerrainAssessment::passable(TerrainType::StarSystem, 0),
        2 => TerrainAssessment::passable(TerrainType::Nebula, 2),
        3 => TerrainAssessment::passable(TerrainType::AsteroidField, 3),
        4 => TerrainAssessment::passable(TerrainType::PlasmaStorm, 4),
        5 => TerrainAssessment::passable(TerrainType::Corridor, 1),
        VOID_CODE => TerrainAssessment::VOID,
        _ => TerrainAssessment::passable(TerrainType::Anomaly, ANOMALY_HAZARD),
    }
}

/// Assess the terrain of `cell` on `grid`.
///
/// Cells outside the grid are void. A cell inside the bounds that a sparse
/// raster does not cover has no known code and reads as anomaly.
pub fn assess_terrain(grid: &StrategicGrid, cell: GridCoord) -> TerrainAssessment {
    if !grid.contains(cell) {
        return TerrainAssessment::VOID;
    }
    grid.code_at(cell).map_or(
        TerrainAssessment::passable(TerrainType::Anomaly, ANOMALY_HAZARD),
        terrain_for_code,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_map_through_table() {
        let grid = StrategicGrid {
            width: 3,
            height: 1,
            terrain: vec![0, 2, 4],
            occupancy: Vec::new(),
        };
        let nebula = assess_terrain(&grid, GridCoord::new(1, 0));
        assert_eq!(nebula.terrain_type, TerrainType::Nebula);
        assert_eq!(nebula.hazard_level, 2);
        assert!(!nebula.impassable);
        assert_eq!(
            assess_terrain(&grid, GridCoord::new(2, 0)).terrain_type,
            TerrainType::PlasmaStorm
        );
    }

    #[test]
    fn out_of_bounds_is_void() {
        let grid = StrategicGrid::filled(2, 2, 0);
        let outside = assess_terrain(&grid, GridCoord::new(2, 0));
        assert_eq!(outside, TerrainAssessment::VOID);
        assert!(outside.impassable);
    }

    #[test]
    fn sentinel_is_void() {
        let grid = StrategicGrid::filled(1, 1, VOID_CODE);
        assert!(assess_terrain(&grid, GridCoord::new(0, 0)).impassable);
    }

    #[test]
    fn cells_past_a_short_raster_are_anomaly() {
        let grid = StrategicGrid {
            width: 4,
            height: 3,
            terrain: vec![1, 0, 255],
            occupancy: Vec::new(),
        };
        assert_eq!(
            assess_terrain(&grid, GridCoord::new(0, 0)).terrain_type,
            TerrainType::StarSystem
        );
        assert!(assess_terrain(&grid, GridCoord::new(2, 0)).impassable);

        let uncovered = assess_terrain(&grid, GridCoord::new(3, 2));
        assert_eq!(uncovered.terrain_type, TerrainType::Anomaly);
        assert_eq!(uncovered.hazard_level, ANOMALY_HAZARD);
        assert!(!uncovered.impassable);

        assert_eq!(assess_terrain(&grid, GridCoord::new(0, 3)), TerrainAssessment::VOID);
    }

    #[test]
    fn unknown_code_is_low_hazard_anomaly() {
        let grid = StrategicGrid::filled(1, 1, 42);
        let cell = assess_terrain(&grid, GridCoord::new(0, 0));
        assert_eq!(cell.terrain_type, TerrainType::Anomaly);
        assert_eq!(cell.hazard_level, ANOMALY_HAZARD);
        assert!(!cell.impassable);
    }
}
