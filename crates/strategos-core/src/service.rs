//! Storage-backed services: the entry points for inbound requests.
//!
//! Each service loads the records a request touches, runs the pure logic
//! from `strategos-agents` or `strategos-world`, and persists only after
//! that logic succeeds. Every storage call is bounded by the configured
//! timeout.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use strategos_agents::{
    AuthorityError, CommandOutcome, CommandRequest, DispatchError, Dispatcher, OperationDraft,
    OperationError, assign_card, create_operation, ensure_authority_cards, release_card,
};
use strategos_catalog::CatalogIndex;
use strategos_types::{
    Actor, ActorId, AuthorityCard, CardId, ErrorKind, Faction, GridCoord, Operation, OperationId,
    Session, SessionId, UnitId,
};
use strategos_world::{SpatialError, enter_cell, leave_cell};
use tracing::{info, warn};

use crate::clock::ClockError;
use crate::storage::{StorageError, Store, bounded};

/// Errors surfaced by the services.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    /// A referenced record does not exist.
    #[error("{kind} {id} not found")]
    NotFound {
        /// Record family.
        kind: &'static str,
        /// Record id.
        id: String,
    },

    /// The session has ended.
    #[error("session {0} has ended")]
    SessionEnded(SessionId),

    /// Records from different sessions were combined.
    #[error("{0} belongs to another session")]
    SessionMismatch(String),

    /// No shortcut is bound to the key.
    #[error("no shortcut bound to {0}")]
    UnknownShortcut(String),

    /// The session's reentry policy refuses the faction change.
    #[error("reentry as {requested} refused after playing {previous}")]
    ReentryRefused {
        /// Faction previously played.
        previous: Faction,
        /// Faction requested.
        requested: Faction,
    },

    /// The faction has no free slot.
    #[error("faction {0} has no free slot")]
    FactionFull(Faction),

    /// Card assignment or eligibility failed.
    #[error(transparent)]
    Authority(#[from] AuthorityError),

    /// Operation lifecycle failed.
    #[error(transparent)]
    Operation(#[from] OperationError),

    /// Command dispatch failed.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// Grid validation failed.
    #[error(transparent)]
    Spatial(#[from] SpatialError),

    /// Clock state is invalid.
    #[error(transparent)]
    Clock(#[from] ClockError),

    /// Storage failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ServiceError {
    /// Taxonomy category of this error.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } | Self::UnknownShortcut(_) | Self::SessionMismatch(_) => {
                ErrorKind::Validation
            }
            Self::SessionEnded(_) | Self::FactionFull(_) => ErrorKind::Lifecycle,
            Self::ReentryRefused { .. } => ErrorKind::Authorization,
            Self::Authority(e) => e.kind(),
            Self::Operation(e) => e.kind(),
            Self::Dispatch(e) => e.kind(),
            Self::Spatial(e) => e.kind(),
            Self::Clock(e) => e.kind(),
            Self::Storage(e) => e.kind(),
        }
    }
}

/// Load a record that must exist.
async fn require<T, F>(
    limit: Duration,
    kind: &'static str,
    id: impl Display,
    call: F,
) -> Result<T, ServiceError>
where
    F: Future<Output = Result<Option<T>, StorageError>>,
{
    bounded(limit, kind, call)
        .await?
        .ok_or_else(|| ServiceError::NotFound {
            kind,
            id: id.to_string(),
        })
}

async fn require_active_session<S: Store>(
    store: &S,
    limit: Duration,
    session_id: SessionId,
) -> Result<Session, ServiceError> {
    let session = require(limit, "session", session_id, store.load_session(session_id)).await?;
    if session.phase.is_terminal() {
        return Err(ServiceError::SessionEnded(session_id));
    }
    Ok(session)
}

/// Current game time of a session: its clock if one exists, else its
/// stored calendar.
async fn game_time<S: Store>(
    store: &S,
    limit: Duration,
    session: &Session,
) -> Result<NaiveDateTime, ServiceError> {
    if let Some(clock) = bounded(limit, "load_clock", store.load_clock(session.id)).await? {
        return Ok(clock.game_time);
    }
    session
        .calendar
        .to_datetime()
        .ok_or_else(|| ClockError::InvalidCalendar(session.id).into())
}

/// Write `before` back over an actor saved at `version`, after a dependent
/// write failed. A failure here is logged; the caller reports the original
/// error.
async fn restore_actor<S: Store>(store: &S, limit: Duration, mut before: Actor, version: u64) {
    let actor_id = before.id;
    before.version = version;
    match bounded(limit, "save_actor", store.save_actor(&before)).await {
        Ok(_) => info!(%actor_id, "Actor restored after a failed write"),
        Err(err) => warn!(%actor_id, %err, "Actor could not be restored after a failed write"),
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// What a command caller receives. Failures name the violated rule and
/// carry no internals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResponse {
    /// Whether the command took effect.
    pub success: bool,
    /// Result or failure message.
    pub message: String,
    /// Command points removed, when any were.
    pub cp_spent: Option<u64>,
    /// Whether payment used substitution.
    pub substituted: bool,
    /// Failure category, when the command was rejected.
    pub error_kind: Option<ErrorKind>,
}

impl From<CommandOutcome> for CommandResponse {
    fn from(outcome: CommandOutcome) -> Self {
        Self {
            success: outcome.success,
            message: outcome.message,
            cp_spent: outcome.cp_spent,
            substituted: outcome.substituted,
            error_kind: None,
        }
    }
}

impl From<ServiceError> for CommandResponse {
    fn from(err: ServiceError) -> Self {
        Self {
            success: false,
            message: err.to_string(),
            cp_spent: None,
            substituted: false,
            error_kind: Some(err.kind()),
        }
    }
}

/// Executes commands against persisted actors.
#[derive(Debug)]
pub struct CommandService<S> {
    store: Arc<S>,
    dispatcher: Dispatcher,
    timeout: Duration,
}

impl<S: Store> CommandService<S> {
    /// Create the service.
    pub const fn new(store: Arc<S>, dispatcher: Dispatcher, timeout: Duration) -> Self {
        Self {
            store,
            dispatcher,
            timeout,
        }
    }

    /// Execute `request` for `actor_id`.
    pub async fn execute(&self, actor_id: ActorId, request: CommandRequest) -> CommandResponse {
        match self.try_execute(actor_id, &request).await {
            Ok(outcome) => outcome.into(),
            Err(err) => {
                info!(%actor_id, code = %request.command_code, %err, "Command rejected");
                err.into()
            }
        }
    }

    /// Execute the command bound to shortcut `key`.
    pub async fn execute_shortcut(
        &self,
        actor_id: ActorId,
        key: &str,
        card_id: CardId,
        unit_id: Option<UnitId>,
        args: serde_json::Value,
    ) -> CommandResponse {
        let Some(code) = self.dispatcher.catalog().resolve_shortcut(key) else {
            return ServiceError::UnknownShortcut(key.to_owned()).into();
        };
        let request = CommandRequest {
            card_id,
            command_code: code.to_owned(),
            unit_id,
            args,
        };
        self.execute(actor_id, request).await
    }

    async fn try_execute(
        &self,
        actor_id: ActorId,
        request: &CommandRequest,
    ) -> Result<CommandOutcome, ServiceError> {
        let store = self.store.as_ref();
        let mut actor = require(self.timeout, "actor", actor_id, store.load_actor(actor_id)).await?;
        require_active_session(store, self.timeout, actor.session_id).await?;

        let card = bounded(self.timeout, "authority_card", store.load_card(request.card_id))
            .await?
            .filter(|c| c.session_id == actor.session_id);

        let before = actor.gauges;
        let outcome = self.dispatcher.execute(&mut actor, card.as_ref(), request)?;
        if actor.gauges != before {
            bounded(self.timeout, "save_actor", store.save_actor(&actor)).await?;
        }
        Ok(outcome)
    }
}

// ---------------------------------------------------------------------------
// Cards
// ---------------------------------------------------------------------------

/// Counts from a provisioning run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProvisionReport {
    /// Whether the session already recorded the current catalog version.
    pub up_to_date: bool,
    /// Cards created.
    pub created: usize,
    /// Cards whose derived fields changed.
    pub updated: usize,
    /// Cards already current.
    pub unchanged: usize,
}

/// Provisions and assigns authority cards.
#[derive(Debug)]
pub struct CardService<S> {
    store: Arc<S>,
    catalog: Arc<CatalogIndex>,
    timeout: Duration,
}

impl<S: Store> CardService<S> {
    /// Create the service.
    pub const fn new(store: Arc<S>, catalog: Arc<CatalogIndex>, timeout: Duration) -> Self {
        Self {
            store,
            catalog,
            timeout,
        }
    }

    /// Bring the session's cards in line with the catalog.
    ///
    /// Every faction slot is reconciled on each call, so slots added after
    /// the last run are picked up even when the catalog version did not
    /// change. Only changed cards are written. Holders and statuses are
    /// preserved.
    pub async fn provision(&self, session_id: SessionId) -> Result<ProvisionReport, ServiceError> {
        let store = self.store.as_ref();
        let mut session =
            require(self.timeout, "session", session_id, store.load_session(session_id)).await?;
        let version = self.catalog.version();

        let existing = bounded(self.timeout, "list_cards", store.list_cards(session_id)).await?;
        let mut report = ProvisionReport {
            up_to_date: session.catalog_version.as_deref() == Some(version),
            ..ProvisionReport::default()
        };
        let factions: Vec<Faction> = session.faction_slots.keys().copied().collect();
        for faction in factions {
            let plan = ensure_authority_cards(session_id, faction, &self.catalog, &existing);
            report.created = report.created.saturating_add(plan.created);
            report.updated = report.updated.saturating_add(plan.updated);
            report.unchanged = report.unchanged.saturating_add(plan.unchanged);
            for card in &plan.upserts {
                bounded(self.timeout, "save_card", store.save_card(card)).await?;
            }
        }

        if !report.up_to_date {
            session.catalog_version = Some(version.to_owned());
            bounded(self.timeout, "save_session", store.save_session(&session)).await?;
        }

        info!(
            %session_id,
            catalog_version = version,
            created = report.created,
            updated = report.updated,
            unchanged = report.unchanged,
            "Authority cards provisioned"
        );
        Ok(report)
    }

    /// Assign a card to an actor.
    pub async fn assign(
        &self,
        card_id: CardId,
        actor_id: ActorId,
        requester: Option<ActorId>,
    ) -> Result<AuthorityCard, ServiceError> {
        let (mut card, mut actor) = self.load_pair(card_id, actor_id).await?;
        let held: Vec<AuthorityCard> =
            bounded(self.timeout, "list_cards", self.store.list_cards(actor.session_id))
                .await?
                .into_iter()
                .filter(|c| c.holder == Some(actor_id))
                .collect();

        let before = actor.clone();
        assign_card(&mut card, &mut actor, &held, requester)?;
        self.persist_pair(&mut card, &mut actor, before).await?;
        Ok(card)
    }

    /// Release a card held by an actor.
    pub async fn release(
        &self,
        card_id: CardId,
        actor_id: ActorId,
    ) -> Result<AuthorityCard, ServiceError> {
        let (mut card, mut actor) = self.load_pair(card_id, actor_id).await?;
        let before = actor.clone();
        release_card(&mut card, &mut actor)?;
        self.persist_pair(&mut card, &mut actor, before).await?;
        Ok(card)
    }

    async fn load_pair(
        &self,
        card_id: CardId,
        actor_id: ActorId,
    ) -> Result<(AuthorityCard, Actor), ServiceError> {
        let store = self.store.as_ref();
        let card = require(self.timeout, "authority_card", card_id, store.load_card(card_id)).await?;
        let actor = require(self.timeout, "actor", actor_id, store.load_actor(actor_id)).await?;
        if card.session_id != actor.session_id {
            return Err(ServiceError::SessionMismatch(format!("card {card_id}")));
        }
        Ok((card, actor))
    }

    /// Save the actor, then the card. A failed card write puts the actor
    /// back to `before`, so `held_cards` never lists a card whose holder
    /// was not stored.
    async fn persist_pair(
        &self,
        card: &mut AuthorityCard,
        actor: &mut Actor,
        before: Actor,
    ) -> Result<(), ServiceError> {
        let store = self.store.as_ref();
        actor.version = bounded(self.timeout, "save_actor", store.save_actor(actor)).await?;
        match bounded(self.timeout, "save_card", store.save_card(card)).await {
            Ok(version) => {
                card.version = version;
                Ok(())
            }
            Err(err) => {
                restore_actor(store, self.timeout, before, actor.version).await;
                Err(err.into())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Creates, issues, and aborts operations.
#[derive(Debug)]
pub struct OperationService<S> {
    store: Arc<S>,
    timeout: Duration,
}

impl<S: Store> OperationService<S> {
    /// Create the service.
    pub const fn new(store: Arc<S>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Validate and charge a draft, storing the new operation.
    ///
    /// The charged actor is written first. If the operation cannot be
    /// stored afterwards, the charge is written back out.
    pub async fn create(
        &self,
        actor_id: ActorId,
        draft: OperationDraft,
    ) -> Result<Operation, ServiceError> {
        let store = self.store.as_ref();
        let mut actor = require(self.timeout, "actor", actor_id, store.load_actor(actor_id)).await?;
        let session = require_active_session(store, self.timeout, actor.session_id).await?;
        let now = game_time(store, self.timeout, &session).await?;

        let before = actor.clone();
        let mut op = create_operation(draft, &mut actor, &session.grid, now)?;
        actor.version = bounded(self.timeout, "save_actor", store.save_actor(&actor)).await?;
        match bounded(self.timeout, "save_operation", store.save_operation(&op)).await {
            Ok(version) => {
                op.version = version;
                Ok(op)
            }
            Err(err) => {
                restore_actor(store, self.timeout, before, actor.version).await;
                Err(err.into())
            }
        }
    }

    /// Issue a draft operation at the session's current game time.
    pub async fn issue(
        &self,
        operation_id: OperationId,
        actor_id: ActorId,
    ) -> Result<Operation, ServiceError> {
        self.transition(operation_id, |op, now| {
            strategos_agents::issue(op, actor_id, now)
        })
        .await
    }

    /// Abort an operation. `by` is `None` for system aborts.
    pub async fn abort(
        &self,
        operation_id: OperationId,
        by: Option<ActorId>,
        reason: &str,
    ) -> Result<Operation, ServiceError> {
        self.transition(operation_id, |op, now| {
            strategos_agents::abort(op, by, reason, now)
        })
        .await
    }

    async fn transition<F>(&self, operation_id: OperationId, step: F) -> Result<Operation, ServiceError>
    where
        F: FnOnce(&mut Operation, NaiveDateTime) -> Result<(), OperationError>,
    {
        let store = self.store.as_ref();
        let mut op = require(
            self.timeout,
            "operation",
            operation_id,
            store.load_operation(operation_id),
        )
        .await?;
        let session =
            require(self.timeout, "session", op.session_id, store.load_session(op.session_id)).await?;
        let now = game_time(store, self.timeout, &session).await?;
        step(&mut op, now)?;
        op.version = bounded(self.timeout, "save_operation", store.save_operation(&op)).await?;
        Ok(op)
    }
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

/// Session membership and grid occupancy.
#[derive(Debug)]
pub struct SessionService<S> {
    store: Arc<S>,
    timeout: Duration,
}

impl<S: Store> SessionService<S> {
    /// Create the service.
    pub const fn new(store: Arc<S>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Take a faction slot. `previous` is the faction the player last
    /// played in this session, if any.
    pub async fn join(
        &self,
        session_id: SessionId,
        requested: Faction,
        previous: Option<Faction>,
    ) -> Result<Session, ServiceError> {
        let store = self.store.as_ref();
        let mut session = require_active_session(store, self.timeout, session_id).await?;
        if let Some(previous) = previous
            && !session.may_reenter(previous, requested)
        {
            return Err(ServiceError::ReentryRefused {
                previous,
                requested,
            });
        }
        let slot = session
            .faction_slots
            .get_mut(&requested)
            .filter(|slot| slot.joined < slot.max_players)
            .ok_or(ServiceError::FactionFull(requested))?;
        slot.joined = slot.joined.saturating_add(1);

        session.version = bounded(self.timeout, "save_session", store.save_session(&session)).await?;
        Ok(session)
    }

    /// Move units of `faction` onto `cell`. Returns the faction's new
    /// count there.
    pub async fn deploy(
        &self,
        session_id: SessionId,
        faction: Faction,
        cell: GridCoord,
        units: u32,
    ) -> Result<u32, ServiceError> {
        self.update_grid(session_id, |session| {
            enter_cell(&mut session.grid, cell, faction, units)
        })
        .await
    }

    /// Remove units of `faction` from `cell`. Returns what remains.
    pub async fn withdraw(
        &self,
        session_id: SessionId,
        faction: Faction,
        cell: GridCoord,
        units: u32,
    ) -> Result<u32, ServiceError> {
        self.update_grid(session_id, |session| {
            leave_cell(&mut session.grid, cell, faction, units)
        })
        .await
    }

    async fn update_grid<F>(&self, session_id: SessionId, change: F) -> Result<u32, ServiceError>
    where
        F: FnOnce(&mut Session) -> Result<u32, SpatialError>,
    {
        let store = self.store.as_ref();
        let mut session = require_active_session(store, self.timeout, session_id).await?;
        let count = change(&mut session)?;
        bounded(self.timeout, "save_session", store.save_session(&session)).await?;
        Ok(count)
    }
}
