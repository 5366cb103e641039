//! Core record structs for the Strategos simulation core.
//!
//! These are the five persisted record families (sessions, session clocks,
//! actors, authority cards, operations) plus the value types they embed.
//! Every record carries a `version` used for optimistic single-writer
//! persistence: a store accepts a write only when the version matches the
//! stored one, then increments it.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{
    CapabilityGroup, CardStatus, CpPool, Faction, FactionScope, NotificationKind,
    OperationObjective, OperationStatus, Rank, ReentryPolicy, SessionPhase, VictoryType,
};
use crate::ids::{ActorId, CardId, OperationId, SessionId};

/// Open extension field for forward-compatible annotations.
///
/// Never consulted by invariant checks.
pub type Annotations = BTreeMap<String, serde_json::Value>;

// ---------------------------------------------------------------------------
// Spatial values
// ---------------------------------------------------------------------------

/// A cell on the strategic grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct GridCoord {
    /// Column, 0-based.
    pub x: u32,
    /// Row, 0-based.
    pub y: u32,
}

impl GridCoord {
    /// Construct a coordinate.
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

impl core::fmt::Display for GridCoord {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Units present on one cell, per faction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct CellOccupancy {
    /// The occupied cell.
    pub cell: GridCoord,
    /// Unit count per faction. Factions with zero units are removed.
    pub units: BTreeMap<Faction, u32>,
}

/// The strategic map of a session: a row-major terrain raster plus
/// per-cell occupancy.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct StrategicGrid {
    /// Number of columns.
    pub width: u32,
    /// Number of rows.
    pub height: u32,
    /// Terrain codes, `width * height` entries, row-major. May be shorter
    /// than the full raster for sparse grids.
    pub terrain: Vec<u8>,
    /// Occupied cells.
    pub occupancy: Vec<CellOccupancy>,
}

impl StrategicGrid {
    /// Create a grid filled with a single terrain code.
    pub fn filled(width: u32, height: u32, code: u8) -> Self {
        let len = usize::try_from(u64::from(width).saturating_mul(u64::from(height)))
            .unwrap_or(0);
        Self {
            width,
            height,
            terrain: vec![code; len],
            occupancy: Vec::new(),
        }
    }

    /// Whether `cell` lies inside the grid bounds.
    pub const fn contains(&self, cell: GridCoord) -> bool {
        cell.x < self.width && cell.y < self.height
    }

    /// Raw terrain code at `cell`, or `None` when out of bounds or beyond
    /// the stored raster.
    pub fn code_at(&self, cell: GridCoord) -> Option<u8> {
        if !self.contains(cell) {
            return None;
        }
        let index = u64::from(cell.y)
            .checked_mul(u64::from(self.width))?
            .checked_add(u64::from(cell.x))?;
        let index = usize::try_from(index).ok()?;
        self.terrain.get(index).copied()
    }

    /// Overwrite the terrain code at `cell`. Returns `false` when the cell
    /// is not backed by the raster.
    pub fn set_code(&mut self, cell: GridCoord, code: u8) -> bool {
        if !self.contains(cell) {
            return false;
        }
        let Some(index) = u64::from(cell.y)
            .checked_mul(u64::from(self.width))
            .and_then(|v| v.checked_add(u64::from(cell.x)))
            .and_then(|v| usize::try_from(v).ok())
        else {
            return false;
        };
        match self.terrain.get_mut(index) {
            Some(slot) => {
                *slot = code;
                true
            }
            None => false,
        }
    }

    /// Units present on `cell`, if any.
    pub fn units_at(&self, cell: GridCoord) -> Option<&BTreeMap<Faction, u32>> {
        self.occupancy
            .iter()
            .find(|o| o.cell == cell)
            .map(|o| &o.units)
    }

    /// Mutable unit map for `cell`, created empty when absent.
    pub fn units_at_mut(&mut self, cell: GridCoord) -> &mut BTreeMap<Faction, u32> {
        let position = self.occupancy.iter().position(|o| o.cell == cell);
        let index = position.unwrap_or_else(|| {
            self.occupancy.push(CellOccupancy {
                cell,
                units: BTreeMap::new(),
            });
            self.occupancy.len().saturating_sub(1)
        });
        // The index was either found or just pushed.
        #[allow(clippy::indexing_slicing)]
        &mut self.occupancy[index].units
    }

    /// Drop empty faction entries and empty cells.
    pub fn compact(&mut self) {
        for cell in &mut self.occupancy {
            cell.units.retain(|_, n| *n > 0);
        }
        self.occupancy.retain(|c| !c.units.is_empty());
    }
}

// ---------------------------------------------------------------------------
// Time values
// ---------------------------------------------------------------------------

/// Ratio between wall-clock and game time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct TimeScale {
    /// Real seconds in one ratio unit.
    pub real_seconds: u32,
    /// Game seconds that elapse per `real_seconds` of wall-clock time.
    pub game_seconds: u32,
}

impl Default for TimeScale {
    /// One real second is one game minute.
    fn default() -> Self {
        Self {
            real_seconds: 1,
            game_seconds: 60,
        }
    }
}

/// Denormalized in-game calendar stored on the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct GameCalendar {
    /// Calendar year.
    pub year: i32,
    /// Month, 1-12.
    pub month: u32,
    /// Day of month, 1-31.
    pub day: u32,
    /// Hour, 0-23.
    pub hour: u32,
    /// Minute, 0-59.
    pub minute: u32,
}

impl GameCalendar {
    /// Convert to a game timestamp. `None` when the fields do not form a
    /// valid date.
    pub fn to_datetime(self) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(self.year, self.month, self.day)?
            .and_hms_opt(self.hour, self.minute, 0)
    }

    /// Derive the calendar fields from a game timestamp.
    pub fn from_datetime(at: NaiveDateTime) -> Self {
        Self {
            year: at.year(),
            month: at.month(),
            day: at.day(),
            hour: at.hour(),
            minute: at.minute(),
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Capacity of one faction in a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct FactionSlot {
    /// Maximum number of actors.
    pub max_players: u32,
    /// Actors currently joined.
    pub joined: u32,
}

/// Strategic standing of one belligerent, as fed to victory evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct FactionStanding {
    /// Star systems controlled.
    pub star_systems: u32,
    /// Share of the total population, 0.0 to 1.0.
    #[ts(as = "String")]
    pub population_share: Decimal,
    /// Ships in the faction's fleets.
    pub fleet_ships: u64,
}

/// Per-session economy snapshot maintained by external bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct EconomySnapshot {
    /// Imperial standing.
    pub empire: FactionStanding,
    /// Free-planets standing.
    pub alliance: FactionStanding,
    /// Faction that has conquered the other's capital, if any.
    pub capital_conqueror: Option<Faction>,
}

/// Outcome recorded once a session is decided.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct VictoryRecord {
    /// Winning faction.
    pub winner: Faction,
    /// Kind of victory.
    pub victory_type: VictoryType,
    /// Human-readable explanation.
    pub reason: String,
    /// Game time at which victory was decided.
    pub decided_at: NaiveDateTime,
}

/// A message posted to everyone in a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Notification {
    /// Category.
    pub kind: NotificationKind,
    /// Message text.
    pub message: String,
    /// Game time of the notification.
    pub game_time: NaiveDateTime,
    /// Wall-clock time of the notification.
    pub created_at: DateTime<Utc>,
}

/// Maximum notifications retained on a session record.
pub const MAX_NOTIFICATIONS: usize = 200;

/// A persistent multiplayer session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Session {
    /// Identifier.
    pub id: SessionId,
    /// Display name.
    pub name: String,
    /// Lifecycle phase.
    pub phase: SessionPhase,
    /// Capacity per faction.
    pub faction_slots: BTreeMap<Faction, FactionSlot>,
    /// Wall-clock to game-time ratio.
    pub time_scale: TimeScale,
    /// Rejoin rule for actors who left.
    pub reentry_policy: ReentryPolicy,
    /// Strategic standings used by victory evaluation.
    pub economy: EconomySnapshot,
    /// Current game calendar (denormalized from the clock).
    pub calendar: GameCalendar,
    /// Strategic map.
    pub grid: StrategicGrid,
    /// Set once the session is decided.
    pub victory: Option<VictoryRecord>,
    /// Most recent notifications, oldest first, capped at
    /// [`MAX_NOTIFICATIONS`].
    pub notifications: Vec<Notification>,
    /// Catalog version the session's cards were last provisioned from.
    pub catalog_version: Option<String>,
    /// Forward-compatible annotations.
    pub annotations: Annotations,
    /// Wall-clock creation time.
    pub created_at: DateTime<Utc>,
    /// Optimistic concurrency version (0 = never stored).
    pub version: u64,
}

impl Session {
    /// Create an active session with the given calendar start and grid.
    ///
    /// Empire and Alliance each get a slot for `players_per_faction` actors.
    pub fn new(
        name: impl Into<String>,
        calendar: GameCalendar,
        time_scale: TimeScale,
        grid: StrategicGrid,
        players_per_faction: u32,
    ) -> Self {
        let mut faction_slots = BTreeMap::new();
        for faction in [Faction::Empire, Faction::Alliance] {
            faction_slots.insert(
                faction,
                FactionSlot {
                    max_players: players_per_faction,
                    joined: 0,
                },
            );
        }
        Self {
            id: SessionId::new(),
            name: name.into(),
            phase: SessionPhase::Active,
            faction_slots,
            time_scale,
            reentry_policy: ReentryPolicy::SameFaction,
            economy: EconomySnapshot::default(),
            calendar,
            grid,
            victory: None,
            notifications: Vec::new(),
            catalog_version: None,
            annotations: Annotations::new(),
            created_at: Utc::now(),
            version: 0,
        }
    }

    /// Append a notification, dropping the oldest beyond
    /// [`MAX_NOTIFICATIONS`].
    pub fn notify(&mut self, kind: NotificationKind, message: String, game_time: NaiveDateTime) {
        self.notifications.push(Notification {
            kind,
            message,
            game_time,
            created_at: Utc::now(),
        });
        if self.notifications.len() > MAX_NOTIFICATIONS {
            let excess = self.notifications.len().saturating_sub(MAX_NOTIFICATIONS);
            self.notifications.drain(..excess);
        }
    }

    /// Whether an actor who previously played `previous` may rejoin as
    /// `requested`.
    pub fn may_reenter(&self, previous: Faction, requested: Faction) -> bool {
        match self.reentry_policy {
            ReentryPolicy::Open => true,
            ReentryPolicy::SameFaction => previous == requested,
            ReentryPolicy::Closed => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Session clock
// ---------------------------------------------------------------------------

/// Rolling statistics of the scheduler loop for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct LoopStats {
    /// Duration of the most recent tick in milliseconds.
    pub last_ms: u64,
    /// Rolling average tick duration in milliseconds.
    pub avg_ms: u64,
    /// Longest tick observed in milliseconds.
    pub max_ms: u64,
    /// Samples folded into the average (capped).
    pub samples: u64,
    /// Failed ticks since the last successful one.
    pub consecutive_failures: u32,
    /// Wall-clock time of the most recent alert raised for this clock.
    pub last_alert_at: Option<DateTime<Utc>>,
}

/// Game-time clock of a session, created lazily on the first tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct SessionClock {
    /// Owning session.
    pub session_id: SessionId,
    /// Current game time. Never decreases.
    pub game_time: NaiveDateTime,
    /// Wall-clock time of the last tick that advanced game time.
    pub last_real_tick: Option<DateTime<Utc>>,
    /// Ratio used to convert wall-clock to game time.
    pub scale: TimeScale,
    /// Mirrors the session phase.
    pub phase: SessionPhase,
    /// Manual pause flag.
    pub paused: bool,
    /// Loop statistics.
    pub stats: LoopStats,
    /// Optimistic concurrency version (0 = never stored).
    pub version: u64,
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

/// The two command-point gauges of an actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct CpGauges {
    /// Political command points.
    pub political: u32,
    /// Military command points.
    pub military: u32,
}

impl CpGauges {
    /// Construct gauges.
    pub const fn new(political: u32, military: u32) -> Self {
        Self {
            political,
            military,
        }
    }

    /// Balance of one pool.
    pub const fn get(&self, pool: CpPool) -> u32 {
        match pool {
            CpPool::Political => self.political,
            CpPool::Military => self.military,
        }
    }

    /// Mutable balance of one pool.
    pub const fn get_mut(&mut self, pool: CpPool) -> &mut u32 {
        match pool {
            CpPool::Political => &mut self.political,
            CpPool::Military => &mut self.military,
        }
    }

    /// Sum of both pools.
    pub fn total(&self) -> u64 {
        u64::from(self.political).saturating_add(u64::from(self.military))
    }
}

/// Command-point price of a command or operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct CpCost {
    /// Political points requested.
    pub political: Option<u32>,
    /// Military points requested.
    pub military: Option<u32>,
}

impl CpCost {
    /// A cost drawn from a single pool.
    pub const fn single(pool: CpPool, amount: u32) -> Self {
        match pool {
            CpPool::Political => Self {
                political: Some(amount),
                military: None,
            },
            CpPool::Military => Self {
                political: None,
                military: Some(amount),
            },
        }
    }

    /// Amount requested from `pool` (0 when absent).
    pub fn amount(&self, pool: CpPool) -> u32 {
        match pool {
            CpPool::Political => self.political.unwrap_or(0),
            CpPool::Military => self.military.unwrap_or(0),
        }
    }

    /// Whether nothing is requested from either pool.
    pub fn is_free(&self) -> bool {
        self.amount(CpPool::Political) == 0 && self.amount(CpPool::Military) == 0
    }

    /// Multiply both components, saturating.
    pub fn scaled(&self, factor: u32) -> Self {
        Self {
            political: self.political.map(|v| v.saturating_mul(factor)),
            military: self.military.map(|v| v.saturating_mul(factor)),
        }
    }
}

/// A capability an actor holds intrinsically (through rank or office)
/// rather than through a provisioned card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct CapabilityEntry {
    /// Card id the entry answers to.
    pub card_id: CardId,
    /// Catalog template the entry derives from.
    pub template_id: String,
    /// Command codes granted.
    pub command_codes: BTreeSet<String>,
    /// Capability groups granted.
    pub command_groups: BTreeSet<CapabilityGroup>,
}

/// A player-controlled entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Actor {
    /// Identifier.
    pub id: ActorId,
    /// Session the actor plays in.
    pub session_id: SessionId,
    /// Display name.
    pub name: String,
    /// Faction.
    pub faction: Faction,
    /// Rank.
    pub rank: Rank,
    /// Organization the actor belongs to (fleet, ministry, ...).
    pub organization: Option<String>,
    /// Current grid position.
    pub position: Option<GridCoord>,
    /// Command-point gauges.
    pub gauges: CpGauges,
    /// When gauges were last recovered (recovery happens elsewhere).
    pub last_recovery_at: Option<DateTime<Utc>>,
    /// Provisioned cards held.
    pub held_cards: BTreeSet<CardId>,
    /// Intrinsic capability entries.
    pub capabilities: Vec<CapabilityEntry>,
    /// Optimistic concurrency version (0 = never stored).
    pub version: u64,
}

impl Actor {
    /// Create an actor with empty card holdings.
    pub fn new(
        session_id: SessionId,
        name: impl Into<String>,
        faction: Faction,
        rank: Rank,
        gauges: CpGauges,
    ) -> Self {
        Self {
            id: ActorId::new(),
            session_id,
            name: name.into(),
            faction,
            rank,
            organization: None,
            position: None,
            gauges,
            last_recovery_at: None,
            held_cards: BTreeSet::new(),
            capabilities: Vec::new(),
            version: 0,
        }
    }

    /// Intrinsic capability entry answering to `card_id`, if any.
    pub fn capability(&self, card_id: CardId) -> Option<&CapabilityEntry> {
        self.capabilities.iter().find(|c| c.card_id == card_id)
    }
}

// ---------------------------------------------------------------------------
// Authority card
// ---------------------------------------------------------------------------

/// A provisioned capability bundle granting its holder a set of commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct AuthorityCard {
    /// Identifier.
    pub id: CardId,
    /// Session the card belongs to.
    pub session_id: SessionId,
    /// Catalog template id.
    pub template_id: String,
    /// Display title.
    pub title: String,
    /// Template category.
    pub category: String,
    /// Faction the card was provisioned for.
    pub faction: Faction,
    /// Scope of the originating template.
    pub scope: FactionScope,
    /// Command codes the holder may execute.
    pub command_codes: BTreeSet<String>,
    /// Capability groups the holder may execute.
    pub command_groups: BTreeSet<CapabilityGroup>,
    /// Manual reference for the card.
    pub manual_ref: Option<String>,
    /// Named permissions granted alongside commands.
    pub permissions: BTreeSet<String>,
    /// Catalog version the derived fields were taken from.
    pub catalog_version: String,
    /// Current holder.
    pub holder: Option<ActorId>,
    /// Who requested the current assignment.
    pub assigned_by: Option<ActorId>,
    /// Assignment status.
    pub status: CardStatus,
    /// Maximum simultaneous holders declared by the template.
    pub max_holders: u32,
    /// Forward-compatible annotations.
    pub annotations: Annotations,
    /// Optimistic concurrency version (0 = never stored).
    pub version: u64,
}

// ---------------------------------------------------------------------------
// Operation
// ---------------------------------------------------------------------------

/// One immutable line of an operation's audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct AuditEntry {
    /// What happened.
    pub note: String,
    /// Who caused it (`None` for scheduler transitions).
    pub author: Option<ActorId>,
    /// Game time of the entry.
    pub at: NaiveDateTime,
}

/// Time windows of an operation, in game time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct OperationTimeline {
    /// When the operation was issued.
    pub issued_at: Option<NaiveDateTime>,
    /// Hours between issue and start of execution.
    pub wait_hours: u32,
    /// Nominal execution duration in hours.
    pub execution_hours: u32,
    /// When execution began.
    pub started_at: Option<NaiveDateTime>,
    /// When the operation completed or was aborted.
    pub finished_at: Option<NaiveDateTime>,
}

/// Logistics caps of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct LogisticsCaps {
    /// Maximum units moved per batch.
    pub unit_batch_limit: u32,
    /// Maximum supply units consumed.
    pub supply_limit: u32,
}

/// A multi-stage planned action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Operation {
    /// Identifier.
    pub id: OperationId,
    /// Owning session.
    pub session_id: SessionId,
    /// Author.
    pub author: ActorId,
    /// Author's faction.
    pub faction: Faction,
    /// Card that authorized the operation.
    pub card_id: CardId,
    /// Objective type.
    pub objective: OperationObjective,
    /// Target cell.
    pub target: GridCoord,
    /// Command points paid on creation.
    pub cost: CpCost,
    /// Whether payment used cross-pool substitution.
    pub substituted: bool,
    /// Time windows.
    pub timeline: OperationTimeline,
    /// Logistics caps.
    pub logistics: LogisticsCaps,
    /// Lifecycle state.
    pub status: OperationStatus,
    /// Append-only audit trail.
    pub audit: Vec<AuditEntry>,
    /// Forward-compatible annotations.
    pub annotations: Annotations,
    /// Optimistic concurrency version (0 = never stored).
    pub version: u64,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn calendar_round_trips_through_datetime() {
        let cal = GameCalendar {
            year: 796,
            month: 8,
            day: 15,
            hour: 6,
            minute: 30,
        };
        let at = cal.to_datetime().unwrap();
        assert_eq!(GameCalendar::from_datetime(at), cal);
    }

    #[test]
    fn invalid_calendar_has_no_datetime() {
        let cal = GameCalendar {
            year: 796,
            month: 2,
            day: 30,
            hour: 0,
            minute: 0,
        };
        assert!(cal.to_datetime().is_none());
    }

    #[test]
    fn grid_lookup_respects_bounds_and_sparse_raster() {
        let mut grid = StrategicGrid::filled(4, 3, 0);
        assert!(grid.set_code(GridCoord::new(3, 2), 7));
        assert_eq!(grid.code_at(GridCoord::new(3, 2)), Some(7));
        assert_eq!(grid.code_at(GridCoord::new(4, 0)), None);

        grid.terrain.truncate(5);
        assert_eq!(grid.code_at(GridCoord::new(1, 2)), None);
        assert!(!grid.set_code(GridCoord::new(1, 2), 1));
    }

    #[test]
    fn occupancy_is_created_and_compacted() {
        let mut grid = StrategicGrid::filled(2, 2, 0);
        let cell = GridCoord::new(1, 1);
        grid.units_at_mut(cell).insert(Faction::Empire, 10);
        assert_eq!(grid.units_at(cell).and_then(|u| u.get(&Faction::Empire)), Some(&10));

        grid.units_at_mut(cell).insert(Faction::Empire, 0);
        grid.compact();
        assert!(grid.units_at(cell).is_none());
    }

    #[test]
    fn notifications_are_capped() {
        let mut session = Session::new(
            "cap",
            GameCalendar {
                year: 796,
                month: 1,
                day: 1,
                hour: 0,
                minute: 0,
            },
            TimeScale::default(),
            StrategicGrid::default(),
            4,
        );
        let at = session.calendar.to_datetime().unwrap();
        for i in 0..(MAX_NOTIFICATIONS + 5) {
            session.notify(NotificationKind::System, format!("n{i}"), at);
        }
        assert_eq!(session.notifications.len(), MAX_NOTIFICATIONS);
        assert_eq!(
            session.notifications.first().map(|n| n.message.as_str()),
            Some("n5")
        );
    }

    #[test]
    fn reentry_policy_is_honoured() {
        let mut session = Session::new(
            "reentry",
            GameCalendar {
                year: 796,
                month: 1,
                day: 1,
                hour: 0,
                minute: 0,
            },
            TimeScale::default(),
            StrategicGrid::default(),
            4,
        );
        assert!(session.may_reenter(Faction::Empire, Faction::Empire));
        assert!(!session.may_reenter(Faction::Empire, Faction::Alliance));
        session.reentry_policy = ReentryPolicy::Open;
        assert!(session.may_reenter(Faction::Empire, Faction::Alliance));
        session.reentry_policy = ReentryPolicy::Closed;
        assert!(!session.may_reenter(Faction::Empire, Faction::Empire));
    }

    #[test]
    fn cost_helpers() {
        let cost = CpCost::single(CpPool::Military, 4);
        assert_eq!(cost.amount(CpPool::Military), 4);
        assert_eq!(cost.amount(CpPool::Political), 0);
        assert!(!cost.is_free());
        assert!(CpCost::default().is_free());
        assert_eq!(cost.scaled(3).amount(CpPool::Military), 12);
    }

    #[test]
    fn gauge_total_widens_without_overflow() {
        assert_eq!(CpGauges::new(u32::MAX, u32::MAX).total(), 8_589_934_590);
    }
}
