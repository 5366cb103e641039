//! Persistence boundary.
//!
//! [`Store`] covers the five record families the core reads and writes.
//! Every record carries a `version`: a save succeeds only when the stored
//! version equals the record's, and returns the new version. A record
//! with version 0 has never been stored. This optimistic check is the only
//! concurrency guard between the scheduler and command execution.
//!
//! Callers wrap each call in [`bounded`] so a stalled backend surfaces as
//! [`StorageError::Timeout`] instead of hanging a tick.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use strategos_types::{
    Actor, ActorId, AuthorityCard, CardId, ErrorKind, Operation, OperationId, Session, SessionClock,
    SessionId,
};
use tokio::sync::RwLock;

/// Errors from a storage backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// The record does not exist.
    #[error("{kind} {id} not found")]
    NotFound {
        /// Record family.
        kind: &'static str,
        /// Record id.
        id: String,
    },

    /// The record was changed by another writer.
    #[error("{kind} {id} version conflict: expected {expected}, found {found}")]
    VersionConflict {
        /// Record family.
        kind: &'static str,
        /// Record id.
        id: String,
        /// Version the writer started from.
        expected: u64,
        /// Version currently stored.
        found: u64,
    },

    /// The call did not finish within its bound.
    #[error("storage call {operation} timed out after {millis} ms")]
    Timeout {
        /// Name of the call.
        operation: &'static str,
        /// The bound.
        millis: u128,
    },

    /// The backend failed.
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    /// Taxonomy category of this error.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::Validation,
            Self::VersionConflict { .. } | Self::Timeout { .. } | Self::Backend(_) => {
                ErrorKind::Infrastructure
            }
        }
    }
}

/// Run a storage call under `limit`.
///
/// # Errors
///
/// The call's own error, or [`StorageError::Timeout`].
pub async fn bounded<T, F>(limit: Duration, operation: &'static str, call: F) -> Result<T, StorageError>
where
    F: Future<Output = Result<T, StorageError>>,
{
    tokio::time::timeout(limit, call)
        .await
        .unwrap_or(Err(StorageError::Timeout {
            operation,
            millis: limit.as_millis(),
        }))
}

/// Storage abstraction over sessions, clocks, actors, cards, and
/// operations.
pub trait Store: Send + Sync {
    /// Sessions whose phase is not terminal.
    fn list_active_sessions(
        &self,
    ) -> impl Future<Output = Result<Vec<Session>, StorageError>> + Send;

    /// Load a session.
    fn load_session(
        &self,
        id: SessionId,
    ) -> impl Future<Output = Result<Option<Session>, StorageError>> + Send;

    /// Insert or update a session. Returns the new version.
    fn save_session(
        &self,
        session: &Session,
    ) -> impl Future<Output = Result<u64, StorageError>> + Send;

    /// Load the clock of a session.
    fn load_clock(
        &self,
        session_id: SessionId,
    ) -> impl Future<Output = Result<Option<SessionClock>, StorageError>> + Send;

    /// Insert or update a clock. Returns the new version.
    fn save_clock(
        &self,
        clock: &SessionClock,
    ) -> impl Future<Output = Result<u64, StorageError>> + Send;

    /// Load an actor.
    fn load_actor(
        &self,
        id: ActorId,
    ) -> impl Future<Output = Result<Option<Actor>, StorageError>> + Send;

    /// Insert or update an actor. Returns the new version.
    fn save_actor(&self, actor: &Actor) -> impl Future<Output = Result<u64, StorageError>> + Send;

    /// Load an authority card.
    fn load_card(
        &self,
        id: CardId,
    ) -> impl Future<Output = Result<Option<AuthorityCard>, StorageError>> + Send;

    /// All cards of a session.
    fn list_cards(
        &self,
        session_id: SessionId,
    ) -> impl Future<Output = Result<Vec<AuthorityCard>, StorageError>> + Send;

    /// Insert or update a card. Returns the new version.
    fn save_card(
        &self,
        card: &AuthorityCard,
    ) -> impl Future<Output = Result<u64, StorageError>> + Send;

    /// Load an operation.
    fn load_operation(
        &self,
        id: OperationId,
    ) -> impl Future<Output = Result<Option<Operation>, StorageError>> + Send;

    /// Operations of a session in `issued` or `executing` state.
    fn list_pending_operations(
        &self,
        session_id: SessionId,
    ) -> impl Future<Output = Result<Vec<Operation>, StorageError>> + Send;

    /// Insert or update an operation. Returns the new version.
    fn save_operation(
        &self,
        operation: &Operation,
    ) -> impl Future<Output = Result<u64, StorageError>> + Send;
}

/// Version check shared by backends: `stored` is the current version, or
/// `None` when the record is new.
///
/// # Errors
///
/// Returns [`StorageError::VersionConflict`] on mismatch.
pub fn next_version(
    kind: &'static str,
    id: impl ToString,
    expected: u64,
    stored: Option<u64>,
) -> Result<u64, StorageError> {
    let found = stored.unwrap_or(0);
    if found != expected {
        return Err(StorageError::VersionConflict {
            kind,
            id: id.to_string(),
            expected,
            found,
        });
    }
    expected
        .checked_add(1)
        .ok_or_else(|| StorageError::Backend(format!("{kind} version overflow")))
}

#[derive(Debug, Default)]
struct Tables {
    sessions: HashMap<SessionId, Session>,
    clocks: HashMap<SessionId, SessionClock>,
    actors: HashMap<ActorId, Actor>,
    cards: HashMap<CardId, AuthorityCard>,
    operations: HashMap<OperationId, Operation>,
}

/// In-process [`Store`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

/// Insert `record` into `table` after the version check, stamping the new
/// version on the stored copy.
fn put<K, V>(
    table: &mut HashMap<K, V>,
    kind: &'static str,
    key: K,
    record: &V,
    version_of: impl Fn(&V) -> u64,
    set_version: impl Fn(&mut V, u64),
) -> Result<u64, StorageError>
where
    K: std::hash::Hash + Eq + std::fmt::Display,
    V: Clone,
{
    let next = next_version(kind, &key, version_of(record), table.get(&key).map(&version_of))?;
    let mut stored = record.clone();
    set_version(&mut stored, next);
    table.insert(key, stored);
    Ok(next)
}

impl Store for MemoryStore {
    async fn list_active_sessions(&self) -> Result<Vec<Session>, StorageError> {
        let tables = self.tables.read().await;
        let mut sessions: Vec<Session> = tables
            .sessions
            .values()
            .filter(|s| !s.phase.is_terminal())
            .cloned()
            .collect();
        sessions.sort_by_key(|s| s.id);
        Ok(sessions)
    }

    async fn load_session(&self, id: SessionId) -> Result<Option<Session>, StorageError> {
        Ok(self.tables.read().await.sessions.get(&id).cloned())
    }

    async fn save_session(&self, session: &Session) -> Result<u64, StorageError> {
        let mut tables = self.tables.write().await;
        put(
            &mut tables.sessions,
            "session",
            session.id,
            session,
            |s| s.version,
            |s, v| s.version = v,
        )
    }

    async fn load_clock(&self, session_id: SessionId) -> Result<Option<SessionClock>, StorageError> {
        Ok(self.tables.read().await.clocks.get(&session_id).cloned())
    }

    async fn save_clock(&self, clock: &SessionClock) -> Result<u64, StorageError> {
        let mut tables = self.tables.write().await;
        put(
            &mut tables.clocks,
            "session_clock",
            clock.session_id,
            clock,
            |c| c.version,
            |c, v| c.version = v,
        )
    }

    async fn load_actor(&self, id: ActorId) -> Result<Option<Actor>, StorageError> {
        Ok(self.tables.read().await.actors.get(&id).cloned())
    }

    async fn save_actor(&self, actor: &Actor) -> Result<u64, StorageError> {
        let mut tables = self.tables.write().await;
        put(
            &mut tables.actors,
            "actor",
            actor.id,
            actor,
            |a| a.version,
            |a, v| a.version = v,
        )
    }

    async fn load_card(&self, id: CardId) -> Result<Option<AuthorityCard>, StorageError> {
        Ok(self.tables.read().await.cards.get(&id).cloned())
    }

    async fn list_cards(&self, session_id: SessionId) -> Result<Vec<AuthorityCard>, StorageError> {
        let tables = self.tables.read().await;
        let mut cards: Vec<AuthorityCard> = tables
            .cards
            .values()
            .filter(|c| c.session_id == session_id)
            .cloned()
            .collect();
        cards.sort_by_key(|c| c.id);
        Ok(cards)
    }

    async fn save_card(&self, card: &AuthorityCard) -> Result<u64, StorageError> {
        let mut tables = self.tables.write().await;
        put(
            &mut tables.cards,
            "authority_card",
            card.id,
            card,
            |c| c.version,
            |c, v| c.version = v,
        )
    }

    async fn load_operation(&self, id: OperationId) -> Result<Option<Operation>, StorageError> {
        Ok(self.tables.read().await.operations.get(&id).cloned())
    }

    async fn list_pending_operations(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<Operation>, StorageError> {
        let tables = self.tables.read().await;
        let mut ops: Vec<Operation> = tables
            .operations
            .values()
            .filter(|o| o.session_id == session_id && o.status.is_pending())
            .cloned()
            .collect();
        ops.sort_by_key(|o| o.id);
        Ok(ops)
    }

    async fn save_operation(&self, operation: &Operation) -> Result<u64, StorageError> {
        let mut tables = self.tables.write().await;
        put(
            &mut tables.operations,
            "operation",
            operation.id,
            operation,
            |o| o.version,
            |o, v| o.version = v,
        )
    }
}
