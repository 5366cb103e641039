//! Per-cell occupancy limits on the strategic grid.
//!
//! Two limits apply to every passable cell:
//!
//! - a faction may have at most [`MAX_UNITS_PER_FACTION`] units on it;
//! - at most [`MAX_FACTIONS_PER_CELL`] distinct factions may be present at
//!   once. Every faction counts on its own, including non-aligned ones.
//!
//! [`verify_grid_entry_limit`] checks without mutating; [`enter_cell`] and
//! [`leave_cell`] update the occupancy recorded on the grid.

use strategos_types::{Faction, GridCoord, StrategicGrid};

use crate::error::SpatialError;
use crate::terrain::assess_terrain;

/// Maximum units of one faction on a single cell.
pub const MAX_UNITS_PER_FACTION: u32 = 300;

/// Maximum distinct factions sharing a single cell.
pub const MAX_FACTIONS_PER_CELL: usize = 2;

/// Check whether `incoming` units of `faction` may enter `cell`.
///
/// # Errors
///
/// - [`SpatialError::ImpassableTerrain`] for void cells
/// - [`SpatialError::GridCapacityExceeded`] when the faction's total would
///   exceed [`MAX_UNITS_PER_FACTION`]
/// - [`SpatialError::TooManyFactions`] when a new faction would join a cell
///   already holding [`MAX_FACTIONS_PER_CELL`] factions
pub fn verify_grid_entry_limit(
    grid: &StrategicGrid,
    cell: GridCoord,
    faction: Faction,
    incoming: u32,
) -> Result<(), SpatialError> {
    let terrain = assess_terrain(grid, cell);
    if terrain.impassable {
        return Err(SpatialError::ImpassableTerrain {
            cell,
            terrain: terrain.terrain_type,
        });
    }

    let units = grid.units_at(cell);
    let existing = units
        .and_then(|u| u.get(&faction))
        .copied()
        .unwrap_or(0);

    let total = u64::from(existing).saturating_add(u64::from(incoming));
    if total > u64::from(MAX_UNITS_PER_FACTION) {
        return Err(SpatialError::GridCapacityExceeded {
            cell,
            faction,
            existing,
            incoming,
            limit: MAX_UNITS_PER_FACTION,
        });
    }

    let present: Vec<Faction> = units
        .map(|u| {
            u.iter()
                .filter(|&(_, count)| *count > 0)
                .map(|(f, _)| *f)
                .collect()
        })
        .unwrap_or_default();
    let joining = !present.contains(&faction);
    let distinct = if joining {
        present.len().saturating_add(1)
    } else {
        present.len()
    };
    if distinct > MAX_FACTIONS_PER_CELL {
        return Err(SpatialError::TooManyFactions {
            cell,
            present,
            limit: MAX_FACTIONS_PER_CELL,
        });
    }

    Ok(())
}

/// Verify and record `units` of `faction` entering `cell`.
///
/// Returns the faction's new unit count on the cell.
///
/// # Errors
///
/// Any error from [`verify_grid_entry_limit`]; the grid is unchanged.
pub fn enter_cell(
    grid: &mut StrategicGrid,
    cell: GridCoord,
    faction: Faction,
    units: u32,
) -> Result<u32, SpatialError> {
    verify_grid_entry_limit(grid, cell, faction, units)?;
    let slot = grid.units_at_mut(cell).entry(faction).or_insert(0);
    *slot = slot.saturating_add(units);
    let count = *slot;
    tracing::debug!(%cell, %faction, units, count, "Units entered cell");
    Ok(count)
}

/// Record `units` of `faction` leaving `cell`.
///
/// Returns the faction's remaining unit count on the cell.
///
/// # Errors
///
/// Returns [`SpatialError::InsufficientUnits`] when fewer units are present
/// than requested; the grid is unchanged.
pub fn leave_cell(
    grid: &mut StrategicGrid,
    cell: GridCoord,
    faction: Faction,
    units: u32,
) -> Result<u32, SpatialError> {
    let present = grid
        .units_at(cell)
        .and_then(|u| u.get(&faction))
        .copied()
        .unwrap_or(0);
    let remaining = present
        .checked_sub(units)
        .ok_or(SpatialError::InsufficientUnits {
            cell,
            faction,
            present,
            requested: units,
        })?;
    grid.units_at_mut(cell).insert(faction, remaining);
    grid.compact();
    Ok(remaining)
}
