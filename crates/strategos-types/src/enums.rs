//! Enumeration types for the Strategos simulation core.
//!
//! All enums serialize in `snake_case` so catalog fragments and persisted
//! documents read naturally (`"empire"`, `"rear_admiral"`, `"executing"`).

use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ---------------------------------------------------------------------------
// Factions
// ---------------------------------------------------------------------------

/// A political faction that actors, cards, and units belong to.
///
/// `Empire` and `Alliance` are the two aligned belligerents that victory is
/// evaluated for. The remaining factions are non-aligned and only matter
/// for grid occupancy, where each one counts as its own faction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum Faction {
    /// The imperial belligerent.
    Empire,
    /// The free-planets belligerent.
    Alliance,
    /// Non-aligned trading dominion.
    Fezzan,
    /// Non-aligned insurgents.
    Rebel,
}

impl Faction {
    /// Whether this faction is one of the two belligerents.
    pub const fn is_aligned(self) -> bool {
        matches!(self, Self::Empire | Self::Alliance)
    }

    /// The opposing belligerent, if this faction is aligned.
    pub const fn opponent(self) -> Option<Self> {
        match self {
            Self::Empire => Some(Self::Alliance),
            Self::Alliance => Some(Self::Empire),
            Self::Fezzan | Self::Rebel => None,
        }
    }

    /// Stable lowercase name used in storage keys and log fields.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Empire => "empire",
            Self::Alliance => "alliance",
            Self::Fezzan => "fezzan",
            Self::Rebel => "rebel",
        }
    }
}

impl core::fmt::Display for Faction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Faction scope of an authority-card template.
///
/// `Shared` templates are provisioned for every faction in a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum FactionScope {
    /// Only the imperial faction.
    Empire,
    /// Only the free-planets faction.
    Alliance,
    /// Only the trading dominion.
    Fezzan,
    /// Only the insurgents.
    Rebel,
    /// Every faction.
    Shared,
}

impl FactionScope {
    /// Whether a template with this scope is provisioned for `faction`.
    pub const fn applies_to(self, faction: Faction) -> bool {
        matches!(
            (self, faction),
            (Self::Shared, _)
                | (Self::Empire, Faction::Empire)
                | (Self::Alliance, Faction::Alliance)
                | (Self::Fezzan, Faction::Fezzan)
                | (Self::Rebel, Faction::Rebel)
        )
    }
}

impl From<Faction> for FactionScope {
    fn from(faction: Faction) -> Self {
        match faction {
            Faction::Empire => Self::Empire,
            Faction::Alliance => Self::Alliance,
            Faction::Fezzan => Self::Fezzan,
            Faction::Rebel => Self::Rebel,
        }
    }
}

// ---------------------------------------------------------------------------
// Rank ladder
// ---------------------------------------------------------------------------

/// Military rank of an actor, ordered from lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum Rank {
    /// Sub-lieutenant.
    Sublieutenant,
    /// Lieutenant.
    Lieutenant,
    /// Lieutenant commander.
    LieutenantCommander,
    /// Commander.
    Commander,
    /// Captain.
    Captain,
    /// Commodore.
    Commodore,
    /// Rear admiral.
    RearAdmiral,
    /// Vice admiral.
    ViceAdmiral,
    /// Admiral.
    Admiral,
    /// Fleet admiral.
    FleetAdmiral,
    /// Marshal, the top of the ladder.
    Marshal,
}

impl Rank {
    /// The fixed rank ladder, lowest first.
    pub const LADDER: [Self; 11] = [
        Self::Sublieutenant,
        Self::Lieutenant,
        Self::LieutenantCommander,
        Self::Commander,
        Self::Captain,
        Self::Commodore,
        Self::RearAdmiral,
        Self::ViceAdmiral,
        Self::Admiral,
        Self::FleetAdmiral,
        Self::Marshal,
    ];

    /// Position of this rank on [`Rank::LADDER`] (0 = lowest).
    pub fn ordinal(self) -> usize {
        Self::LADDER.iter().position(|r| *r == self).unwrap_or(0)
    }

    /// Whether this rank is at least `minimum` on the ladder.
    pub fn meets(self, minimum: Self) -> bool {
        self.ordinal() >= minimum.ordinal()
    }
}

// ---------------------------------------------------------------------------
// Command points
// ---------------------------------------------------------------------------

/// One of the two command-point gauges every actor carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum CpPool {
    /// Political command points (PCP).
    Political,
    /// Military command points (MCP).
    Military,
}

impl CpPool {
    /// The pool used to cover a deficit in this one.
    pub const fn other(self) -> Self {
        match self {
            Self::Political => Self::Military,
            Self::Military => Self::Political,
        }
    }
}

/// Classification of a command code that drives dispatch routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum CapabilityGroup {
    /// Real-time unit commands handled by a tactical handler.
    Tactical,
    /// Fleet and theatre command.
    Command,
    /// Supply, production, and transport.
    Logistics,
    /// Appointments, promotions, and transfers.
    Personnel,
    /// Domestic and diplomatic politics.
    Politics,
    /// Espionage and reconnaissance.
    Intelligence,
}

impl CapabilityGroup {
    /// Whether commands in this group route to a tactical handler.
    pub const fn is_tactical(self) -> bool {
        matches!(self, Self::Tactical)
    }
}

// ---------------------------------------------------------------------------
// Authority cards
// ---------------------------------------------------------------------------

/// Assignment status of an authority card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum CardStatus {
    /// Provisioned and free to be assigned.
    Available,
    /// Held by exactly one actor.
    Assigned,
    /// Temporarily withheld from assignment.
    Locked,
    /// Permanently withdrawn.
    Revoked,
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Lifecycle state of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    /// Created and paid for, not yet issued.
    Draft,
    /// Issued and waiting for its start window.
    Issued,
    /// Inside its execution window.
    Executing,
    /// Finished normally or by hitting the lifetime ceiling.
    Completed,
    /// Cancelled before completion.
    Aborted,
}

impl OperationStatus {
    /// Whether no further transition is possible.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Aborted)
    }

    /// Whether the scheduler advances operations in this state.
    pub const fn is_pending(self) -> bool {
        matches!(self, Self::Issued | Self::Executing)
    }

    /// Stable lowercase name used in storage and audit notes.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Issued => "issued",
            Self::Executing => "executing",
            Self::Completed => "completed",
            Self::Aborted => "aborted",
        }
    }
}

/// What an operation sets out to achieve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum OperationObjective {
    /// Seize and hold the target cell.
    Occupation,
    /// Hold the target cell against incursion.
    Defense,
    /// Clear hostile units from the target cell.
    Sweep,
    /// Gather intelligence on the target cell.
    Reconnaissance,
    /// Move supplies to the target cell.
    Supply,
}

// ---------------------------------------------------------------------------
// Terrain
// ---------------------------------------------------------------------------

/// Terrain classification of a strategic grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum TerrainType {
    /// Open space.
    Space,
    /// A star system with planets and bases.
    StarSystem,
    /// Nebula that degrades sensors.
    Nebula,
    /// Asteroid field that hinders movement.
    AsteroidField,
    /// Plasma storm that damages ships.
    PlasmaStorm,
    /// Navigable corridor between impassable regions.
    Corridor,
    /// Unrecognised grid value, treated as mildly hazardous.
    Anomaly,
    /// Out of bounds or explicitly blocked.
    Void,
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

/// Lifecycle phase of a session and its clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Lobby; the clock does not run.
    Setup,
    /// Running; the scheduler ticks the session.
    Active,
    /// Victory decided; the session is terminal.
    Ended,
}

impl SessionPhase {
    /// Whether the scheduler should skip this session entirely.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Ended)
    }

    /// Stable lowercase name used in storage.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Setup => "setup",
            Self::Active => "active",
            Self::Ended => "ended",
        }
    }
}

/// Whether actors who left a session may rejoin it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum ReentryPolicy {
    /// Rejoin under any faction.
    Open,
    /// Rejoin only under the faction previously played.
    SameFaction,
    /// No rejoining.
    Closed,
}

/// Kind of victory awarded at the end of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum VictoryType {
    /// Capital taken with overwhelming population and fleet superiority.
    Decisive,
    /// Capital taken, or the enemy reduced to a handful of systems.
    Limited,
    /// Term deadline reached; decided on population share.
    Local,
    /// Reported from the loser's perspective.
    Defeat,
}

/// Category of a session notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// The session has been decided.
    Victory,
    /// An operation changed state.
    Operation,
    /// Housekeeping such as catalog refreshes.
    System,
}

// ---------------------------------------------------------------------------
// Error taxonomy
// ---------------------------------------------------------------------------

/// Category every domain error maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed input; nothing was mutated.
    Validation,
    /// Card not held, rank too low, wrong organization or faction.
    Authorization,
    /// Insufficient command points even after substitution.
    Economy,
    /// Impassable terrain, cell capacity, or too many factions.
    Spatial,
    /// Illegal state transition.
    Lifecycle,
    /// Storage or alert delivery failure.
    Infrastructure,
}
