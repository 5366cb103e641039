//! Shared type definitions for the Strategos simulation core.
//!
//! This crate is the single source of truth for the records every other
//! crate reads and writes. Types flow downstream to `TypeScript` via
//! `ts-rs` for client tooling.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrappers for all record identifiers
//! - [`enums`] -- Factions, ranks, pools, lifecycle states, terrain
//! - [`structs`] -- Sessions, clocks, actors, cards, operations

pub mod enums;
pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{
    CapabilityGroup, CardStatus, CpPool, ErrorKind, Faction, FactionScope, NotificationKind,
    OperationObjective, OperationStatus, Rank, ReentryPolicy, SessionPhase, TerrainType,
    VictoryType,
};
pub use ids::{ActorId, CardId, OperationId, SessionId, UnitId};
pub use structs::{
    Actor, Annotations, AuditEntry, AuthorityCard, CapabilityEntry, CellOccupancy, CpCost,
    CpGauges, EconomySnapshot, FactionSlot, FactionStanding, GameCalendar, GridCoord,
    LogisticsCaps, LoopStats, MAX_NOTIFICATIONS, Notification, Operation, OperationTimeline,
    Session, SessionClock, StrategicGrid, TimeScale, VictoryRecord,
};

#[cfg(test)]
mod tests {
    //! `TypeScript` binding generation for the persisted records.

    #[test]
    fn export_bindings() {
        use ts_rs::TS;

        let _ = crate::ids::SessionId::export_all();
        let _ = crate::ids::ActorId::export_all();
        let _ = crate::structs::Session::export_all();
        let _ = crate::structs::SessionClock::export_all();
        let _ = crate::structs::Actor::export_all();
        let _ = crate::structs::AuthorityCard::export_all();
        let _ = crate::structs::Operation::export_all();
    }
}
