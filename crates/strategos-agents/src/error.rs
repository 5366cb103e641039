//! Error types for the `strategos-agents` crate.
//!
//! Each operation family has its own enum. All of them map onto the shared
//! [`ErrorKind`] taxonomy so the service layer can report a category
//! without matching on every variant.

use strategos_ledger::PointsError;
use strategos_types::{
    ActorId, CardId, CardStatus, ErrorKind, Faction, OperationStatus, Rank,
};
use strategos_world::SpatialError;

/// Errors from card provisioning, assignment, and eligibility checks.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthorityError {
    /// The card already has a holder.
    #[error("card {card} is already assigned to {holder}")]
    CardAlreadyAssigned {
        /// The card.
        card: CardId,
        /// Its current holder.
        holder: ActorId,
    },

    /// The actor already holds the maximum number of cards.
    #[error("actor {actor} already holds {held} cards (limit {limit})")]
    CardLimitExceeded {
        /// The actor.
        actor: ActorId,
        /// Cards currently held.
        held: usize,
        /// Per-actor limit.
        limit: usize,
    },

    /// The actor already holds a card from the same template.
    #[error("actor {actor} already holds a card from template {template}")]
    DuplicateCardTemplate {
        /// The actor.
        actor: ActorId,
        /// The template id.
        template: String,
    },

    /// The card is locked or revoked.
    #[error("card {card} is not assignable (status {status:?})")]
    CardUnavailable {
        /// The card.
        card: CardId,
        /// Its status.
        status: CardStatus,
    },

    /// The card belongs to another faction or session.
    #[error("card {card} belongs to {card_faction}, actor is {actor_faction}")]
    FactionMismatch {
        /// The card.
        card: CardId,
        /// Faction the card was provisioned for.
        card_faction: Faction,
        /// The actor's faction.
        actor_faction: Faction,
    },

    /// The actor neither holds the card nor an intrinsic entry for it.
    #[error("actor {actor} is not authorized to use card {card}")]
    NotAuthorized {
        /// The actor.
        actor: ActorId,
        /// The card.
        card: CardId,
    },

    /// The command is outside the card's allowed set.
    #[error("command {code} is not allowed by card {card}")]
    CommandNotAllowed {
        /// The command code.
        code: String,
        /// The card.
        card: CardId,
    },

    /// The actor's rank is below the template minimum.
    #[error("rank {actual:?} is below the required {required:?}")]
    RankTooLow {
        /// Template minimum.
        required: Rank,
        /// Actor's rank.
        actual: Rank,
    },

    /// The template is organization-scoped and the actor is elsewhere.
    #[error("card requires organization {required}, actor belongs to {actual:?}")]
    OrganizationMismatch {
        /// Required organization.
        required: String,
        /// Actor's organization.
        actual: Option<String>,
    },

    /// The card references a template missing from the catalog.
    #[error("card template {0} is not in the catalog")]
    UnknownTemplate(String),
}

impl AuthorityError {
    /// Taxonomy category of this error.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::CardAlreadyAssigned { .. } | Self::CardUnavailable { .. } => ErrorKind::Lifecycle,
            Self::CardLimitExceeded { .. }
            | Self::DuplicateCardTemplate { .. }
            | Self::UnknownTemplate(_) => ErrorKind::Validation,
            Self::FactionMismatch { .. }
            | Self::NotAuthorized { .. }
            | Self::CommandNotAllowed { .. }
            | Self::RankTooLow { .. }
            | Self::OrganizationMismatch { .. } => ErrorKind::Authorization,
        }
    }
}

/// Errors from the operation lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OperationError {
    /// The requested unit batch exceeds the per-cell limit.
    #[error("unit batch {requested} exceeds the limit of {limit}")]
    BatchLimitExceeded {
        /// Requested batch.
        requested: u32,
        /// Limit.
        limit: u32,
    },

    /// The author does not possess the referenced card.
    #[error("actor {actor} does not hold card {card}")]
    CardNotHeld {
        /// The author.
        actor: ActorId,
        /// The card.
        card: CardId,
    },

    /// Only the author may perform this step.
    #[error("actor {actor} is not the author of this operation")]
    NotAuthor {
        /// The actor attempting the step.
        actor: ActorId,
    },

    /// The transition is illegal from the current state.
    #[error("cannot {action} an operation in state {from:?}")]
    InvalidTransition {
        /// Current state.
        from: OperationStatus,
        /// Attempted action.
        action: &'static str,
    },

    /// Target validation failed.
    #[error(transparent)]
    Spatial(#[from] SpatialError),

    /// Payment failed.
    #[error(transparent)]
    Points(#[from] PointsError),
}

impl OperationError {
    /// Taxonomy category of this error.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::BatchLimitExceeded { .. } => ErrorKind::Validation,
            Self::CardNotHeld { .. } | Self::NotAuthor { .. } => ErrorKind::Authorization,
            Self::InvalidTransition { .. } => ErrorKind::Lifecycle,
            Self::Spatial(e) => e.kind(),
            Self::Points(e) => e.kind(),
        }
    }
}

/// Errors from command dispatch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// Card resolution or eligibility failed.
    #[error(transparent)]
    Authority(#[from] AuthorityError),

    /// The command code is not in the catalog.
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// A tactical command has no registered handler.
    #[error("no tactical handler registered for {0}")]
    NoTacticalHandler(String),

    /// A tactical command was issued without a target unit.
    #[error("tactical command {0} requires a unit id")]
    MissingUnit(String),

    /// A strategic handler refused the command.
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// Payment failed.
    #[error(transparent)]
    Points(#[from] PointsError),
}

impl DispatchError {
    /// Taxonomy category of this error.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Authority(e) => e.kind(),
            Self::UnknownCommand(_)
            | Self::NoTacticalHandler(_)
            | Self::MissingUnit(_)
            | Self::PreconditionFailed(_) => ErrorKind::Validation,
            Self::Points(e) => e.kind(),
        }
    }
}
