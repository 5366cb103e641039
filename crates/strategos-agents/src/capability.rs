//! Capability interface that command handlers program against.
//!
//! Handlers never see an [`Actor`] record directly. They receive a
//! [`CommandCapable`] implementation exposing just what a command may read
//! or consume: command points, rank, faction, position, and organization.
//! [`ActorAdapter`] is the adapter for persisted actors.

use strategos_ledger::{CostReceipt, PointsError, apply_cost};
use strategos_types::{Actor, ActorId, CpCost, CpGauges, CpPool, Faction, GridCoord, Rank};

/// What a command handler may read from, or consume on, its issuer.
pub trait CommandCapable {
    /// Identifier of the issuer.
    fn actor_id(&self) -> ActorId;

    /// Balance of one command-point pool.
    fn points(&self, pool: CpPool) -> u32;

    /// Both gauges.
    fn gauges(&self) -> CpGauges;

    /// Consume `cost`, substituting across pools as needed.
    ///
    /// # Errors
    ///
    /// Returns [`PointsError::InsufficientPoints`] and leaves the gauges
    /// unchanged when the cost cannot be covered.
    fn consume_points(&mut self, cost: &CpCost) -> Result<CostReceipt, PointsError>;

    /// Rank of the issuer.
    fn rank(&self) -> Rank;

    /// Faction of the issuer.
    fn faction(&self) -> Faction;

    /// Grid position of the issuer.
    fn position(&self) -> Option<GridCoord>;

    /// Organization the issuer belongs to.
    fn organization(&self) -> Option<&str>;
}

/// [`CommandCapable`] view over a mutable [`Actor`] record.
#[derive(Debug)]
pub struct ActorAdapter<'a> {
    actor: &'a mut Actor,
}

impl<'a> ActorAdapter<'a> {
    /// Wrap an actor record.
    pub const fn new(actor: &'a mut Actor) -> Self {
        Self { actor }
    }
}

impl CommandCapable for ActorAdapter<'_> {
    fn actor_id(&self) -> ActorId {
        self.actor.id
    }

    fn points(&self, pool: CpPool) -> u32 {
        self.actor.gauges.get(pool)
    }

    fn gauges(&self) -> CpGauges {
        self.actor.gauges
    }

    fn consume_points(&mut self, cost: &CpCost) -> Result<CostReceipt, PointsError> {
        apply_cost(&mut self.actor.gauges, cost)
    }

    fn rank(&self) -> Rank {
        self.actor.rank
    }

    fn faction(&self) -> Faction {
        self.actor.faction
    }

    fn position(&self) -> Option<GridCoord> {
        self.actor.position
    }

    fn organization(&self) -> Option<&str> {
        self.actor.organization.as_deref()
    }
}
