//! [`PgStore`]: the core's [`Store`] trait over `PostgreSQL`.
//!
//! Every table shares one layout: `id`, `session_id`, `status`, a JSONB
//! `body`, and `version`. The version check is done in SQL: inserts only
//! succeed for new ids, updates only succeed when the stored version still
//! matches. A zero-row result is reported as a version conflict carrying
//! the version actually stored.

use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::PgPool;
use strategos_core::config::StorageConfig;
use strategos_core::storage::{StorageError, Store};
use strategos_types::{
    Actor, ActorId, AuthorityCard, CardId, CardStatus, Operation, OperationId, OperationStatus,
    Session, SessionClock, SessionId, SessionPhase,
};
use uuid::Uuid;

use crate::error::DbError;
use crate::postgres::open_pool;

/// The five record tables.
#[derive(Debug, Clone, Copy)]
enum Table {
    Sessions,
    Clocks,
    Actors,
    Cards,
    Operations,
}

impl Table {
    const fn name(self) -> &'static str {
        match self {
            Self::Sessions => "sessions",
            Self::Clocks => "session_clocks",
            Self::Actors => "actors",
            Self::Cards => "authority_cards",
            Self::Operations => "operations",
        }
    }

    const fn kind(self) -> &'static str {
        match self {
            Self::Sessions => "session",
            Self::Clocks => "session_clock",
            Self::Actors => "actor",
            Self::Cards => "authority_card",
            Self::Operations => "operation",
        }
    }
}

/// A record persisted as a versioned JSONB document.
trait Record: Serialize + DeserializeOwned + Clone + Send + Sync {
    const TABLE: Table;

    fn key(&self) -> Uuid;
    fn session(&self) -> Uuid;
    fn status(&self) -> &'static str;
    fn version(&self) -> u64;
    fn set_version(&mut self, version: u64);
}

impl Record for Session {
    const TABLE: Table = Table::Sessions;

    fn key(&self) -> Uuid {
        self.id.into_inner()
    }
    fn session(&self) -> Uuid {
        self.id.into_inner()
    }
    fn status(&self) -> &'static str {
        self.phase.as_str()
    }
    fn version(&self) -> u64 {
        self.version
    }
    fn set_version(&mut self, version: u64) {
        self.version = version;
    }
}

impl Record for SessionClock {
    const TABLE: Table = Table::Clocks;

    fn key(&self) -> Uuid {
        self.session_id.into_inner()
    }
    fn session(&self) -> Uuid {
        self.session_id.into_inner()
    }
    fn status(&self) -> &'static str {
        if self.paused { "paused" } else { self.phase.as_str() }
    }
    fn version(&self) -> u64 {
        self.version
    }
    fn set_version(&mut self, version: u64) {
        self.version = version;
    }
}

impl Record for Actor {
    const TABLE: Table = Table::Actors;

    fn key(&self) -> Uuid {
        self.id.into_inner()
    }
    fn session(&self) -> Uuid {
        self.session_id.into_inner()
    }
    fn status(&self) -> &'static str {
        self.faction.as_str()
    }
    fn version(&self) -> u64 {
        self.version
    }
    fn set_version(&mut self, version: u64) {
        self.version = version;
    }
}

impl Record for AuthorityCard {
    const TABLE: Table = Table::Cards;

    fn key(&self) -> Uuid {
        self.id.into_inner()
    }
    fn session(&self) -> Uuid {
        self.session_id.into_inner()
    }
    fn status(&self) -> &'static str {
        match self.status {
            CardStatus::Available => "available",
            CardStatus::Assigned => "assigned",
            CardStatus::Locked => "locked",
            CardStatus::Revoked => "revoked",
        }
    }
    fn version(&self) -> u64 {
        self.version
    }
    fn set_version(&mut self, version: u64) {
        self.version = version;
    }
}

impl Record for Operation {
    const TABLE: Table = Table::Operations;

    fn key(&self) -> Uuid {
        self.id.into_inner()
    }
    fn session(&self) -> Uuid {
        self.session_id.into_inner()
    }
    fn status(&self) -> &'static str {
        self.status.as_str()
    }
    fn version(&self) -> u64 {
        self.version
    }
    fn set_version(&mut self, version: u64) {
        self.version = version;
    }
}

fn to_db_version(version: u64) -> Result<i64, StorageError> {
    i64::try_from(version)
        .map_err(|err| StorageError::Backend(format!("version {version} does not fit BIGINT: {err}")))
}

fn decode<T: Record>(body: serde_json::Value, version: i64) -> Result<T, StorageError> {
    let mut record: T = serde_json::from_value(body).map_err(DbError::from)?;
    let version =
        u64::try_from(version).map_err(|source| DbError::VersionRange { version, source })?;
    record.set_version(version);
    Ok(record)
}

/// `PostgreSQL` implementation of [`Store`].
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Open and migrate a pool from `storage`, then wrap it.
    ///
    /// # Errors
    ///
    /// See [`open_pool`].
    pub async fn connect(storage: &StorageConfig) -> Result<Self, DbError> {
        Ok(Self {
            pool: open_pool(storage).await?,
        })
    }

    /// Close every pooled connection.
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!("PostgreSQL pool closed");
    }

    async fn fetch<T: Record>(&self, id: Uuid) -> Result<Option<T>, StorageError> {
        let sql = format!("SELECT body, version FROM {} WHERE id = $1", T::TABLE.name());
        let row: Option<(serde_json::Value, i64)> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::from)?;
        row.map(|(body, version)| decode(body, version)).transpose()
    }

    /// Rows of `T` in a session whose status is one of `statuses`.
    async fn fetch_in_session<T: Record>(
        &self,
        session_id: Uuid,
        statuses: Option<&[&str]>,
    ) -> Result<Vec<T>, StorageError> {
        let table = T::TABLE.name();
        let sql = match statuses {
            Some(_) => format!(
                "SELECT body, version FROM {table} \
                 WHERE session_id = $1 AND status = ANY($2) ORDER BY id"
            ),
            None => format!("SELECT body, version FROM {table} WHERE session_id = $1 ORDER BY id"),
        };
        let mut query = sqlx::query_as::<_, (serde_json::Value, i64)>(&sql).bind(session_id);
        if let Some(statuses) = statuses {
            query = query.bind(statuses.iter().map(|s| (*s).to_owned()).collect::<Vec<String>>());
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::from)?;
        rows.into_iter()
            .map(|(body, version)| decode(body, version))
            .collect()
    }

    async fn put<T: Record>(&self, record: &T) -> Result<u64, StorageError> {
        let table = T::TABLE;
        let expected = record.version();
        let next = expected
            .checked_add(1)
            .ok_or_else(|| StorageError::Backend(format!("{} version overflow", table.kind())))?;

        let mut stored = record.clone();
        stored.set_version(next);
        let body = serde_json::to_value(&stored).map_err(DbError::from)?;

        let sql = if expected == 0 {
            format!(
                "INSERT INTO {} (id, session_id, status, body, version) \
                 VALUES ($1, $2, $3, $4, $5) ON CONFLICT (id) DO NOTHING",
                table.name()
            )
        } else {
            format!(
                "UPDATE {} SET session_id = $2, status = $3, body = $4, version = $5, \
                 updated_at = now() WHERE id = $1 AND version = $6",
                table.name()
            )
        };
        let mut query = sqlx::query(&sql)
            .bind(record.key())
            .bind(record.session())
            .bind(record.status())
            .bind(body)
            .bind(to_db_version(next)?);
        if expected != 0 {
            query = query.bind(to_db_version(expected)?);
        }
        let affected = query
            .execute(&self.pool)
            .await
            .map_err(DbError::from)?
            .rows_affected();

        if affected == 0 {
            let sql = format!("SELECT version FROM {} WHERE id = $1", table.name());
            let found: Option<i64> = sqlx::query_scalar(&sql)
                .bind(record.key())
                .fetch_optional(&self.pool)
                .await
                .map_err(DbError::from)?;
            return Err(StorageError::VersionConflict {
                kind: table.kind(),
                id: record.key().to_string(),
                expected,
                found: found.and_then(|v| u64::try_from(v).ok()).unwrap_or(0),
            });
        }

        tracing::debug!(
            kind = table.kind(),
            id = %record.key(),
            version = next,
            "Record saved"
        );
        Ok(next)
    }
}

impl Store for PgStore {
    async fn list_active_sessions(&self) -> Result<Vec<Session>, StorageError> {
        let rows: Vec<(serde_json::Value, i64)> = sqlx::query_as(
            "SELECT body, version FROM sessions WHERE status <> $1 ORDER BY id",
        )
        .bind(SessionPhase::Ended.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::from)?;
        rows.into_iter()
            .map(|(body, version)| decode(body, version))
            .collect()
    }

    async fn load_session(&self, id: SessionId) -> Result<Option<Session>, StorageError> {
        self.fetch(id.into_inner()).await
    }

    async fn save_session(&self, session: &Session) -> Result<u64, StorageError> {
        self.put(session).await
    }

    async fn load_clock(&self, session_id: SessionId) -> Result<Option<SessionClock>, StorageError> {
        self.fetch(session_id.into_inner()).await
    }

    async fn save_clock(&self, clock: &SessionClock) -> Result<u64, StorageError> {
        self.put(clock).await
    }

    async fn load_actor(&self, id: ActorId) -> Result<Option<Actor>, StorageError> {
        self.fetch(id.into_inner()).await
    }

    async fn save_actor(&self, actor: &Actor) -> Result<u64, StorageError> {
        self.put(actor).await
    }

    async fn load_card(&self, id: CardId) -> Result<Option<AuthorityCard>, StorageError> {
        self.fetch(id.into_inner()).await
    }

    async fn list_cards(&self, session_id: SessionId) -> Result<Vec<AuthorityCard>, StorageError> {
        self.fetch_in_session(session_id.into_inner(), None).await
    }

    async fn save_card(&self, card: &AuthorityCard) -> Result<u64, StorageError> {
        self.put(card).await
    }

    async fn load_operation(&self, id: OperationId) -> Result<Option<Operation>, StorageError> {
        self.fetch(id.into_inner()).await
    }

    async fn list_pending_operations(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<Operation>, StorageError> {
        let pending = [
            OperationStatus::Issued.as_str(),
            OperationStatus::Executing.as_str(),
        ];
        self.fetch_in_session(session_id.into_inner(), Some(&pending))
            .await
    }

    async fn save_operation(&self, operation: &Operation) -> Result<u64, StorageError> {
        self.put(operation).await
    }
}
