//! The tick scheduler.
//!
//! One recurring driver walks every non-terminal session in order and
//! awaits each tick before starting the next. Per session a tick:
//!
//! 1. Loads the clock, seeding it from the session calendar on first use
//! 2. Advances game time from elapsed wall-clock time (no-op under 1 s)
//! 3. Syncs the session calendar fields
//! 4. Advances pending operations
//! 5. Evaluates victory and ends the session when it is decided
//! 6. Folds the tick duration into the clock statistics and commits
//!
//! A failing session is logged, alerted, and counted on its clock; the
//! pass continues with the next session. A session whose calendar cannot
//! seed a clock has its failures counted in memory until one can.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use strategos_agents::advance;
use strategos_types::{
    ErrorKind, GameCalendar, NotificationKind, OperationStatus, Session, SessionClock, SessionId,
    SessionPhase, VictoryRecord,
};
use tokio::sync::Mutex;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::alerts::{Alert, AlertCode, AlertLevel, AlertSink, Alerter};
use crate::clock::{
    self, ClockAdvance, ClockError, advance_clock, record_failure, record_success, seed_clock,
};
use crate::config::SchedulerConfig;
use crate::storage::{StorageError, Store, bounded};
use crate::victory::{VictoryRules, VictorySnapshot, evaluate};

/// Errors raised while ticking one session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TickError {
    /// Clock arithmetic or configuration failed.
    #[error(transparent)]
    Clock(#[from] ClockError),

    /// A storage call failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl TickError {
    /// Taxonomy category of this error.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Clock(e) => e.kind(),
            Self::Storage(e) => e.kind(),
        }
    }
}

/// What one session tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickReport {
    /// The clock is paused.
    Paused,
    /// Under a second since the last tick; nothing changed.
    Idle,
    /// The clock took its first wall-clock reference.
    Started,
    /// Game time advanced.
    Advanced {
        /// Game time before the tick.
        from: NaiveDateTime,
        /// Game time after the tick.
        to: NaiveDateTime,
        /// Operation state transitions applied.
        transitions: usize,
        /// Set when this tick ended the session.
        victory: Option<VictoryRecord>,
    },
}

/// Counts from one pass over all sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PassSummary {
    /// Sessions visited.
    pub sessions: usize,
    /// Sessions whose game time advanced.
    pub advanced: usize,
    /// Sessions skipped as idle, paused, or just started.
    pub skipped: usize,
    /// Sessions whose tick failed.
    pub failed: usize,
    /// Sessions that ended in this pass.
    pub ended: usize,
}

/// Drives all session clocks.
#[derive(Debug)]
pub struct Scheduler<S, K> {
    store: Arc<S>,
    alerter: Arc<Alerter<K>>,
    config: SchedulerConfig,
    rules: VictoryRules,
    unclocked_failures: Mutex<HashMap<SessionId, u32>>,
}

impl<S: Store, K: AlertSink> Scheduler<S, K> {
    /// Create a scheduler with the default victory rules.
    pub fn new(store: Arc<S>, alerter: Arc<Alerter<K>>, config: SchedulerConfig) -> Self {
        Self {
            store,
            alerter,
            config,
            rules: VictoryRules::default(),
            unclocked_failures: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the victory rules.
    #[must_use]
    pub const fn with_rules(mut self, rules: VictoryRules) -> Self {
        self.rules = rules;
        self
    }

    const fn timeout(&self) -> Duration {
        self.config.storage_timeout()
    }

    /// Run passes every tick interval until `shutdown` resolves.
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let period = self.config.tick_interval().max(Duration::from_millis(1));
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            tick_interval_ms = self.config.tick_interval_ms,
            lag_threshold_ms = self.config.lag_threshold_ms,
            "Scheduler starting"
        );

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    info!("Scheduler stopping");
                    break;
                }
                _ = interval.tick() => {
                    match self.run_pass(Utc::now()).await {
                        Ok(summary) if summary.failed > 0 || summary.ended > 0 => {
                            info!(
                                sessions = summary.sessions,
                                advanced = summary.advanced,
                                failed = summary.failed,
                                ended = summary.ended,
                                "Scheduler pass completed"
                            );
                        }
                        Ok(summary) => {
                            debug!(sessions = summary.sessions, advanced = summary.advanced, "Scheduler pass completed");
                        }
                        Err(err) => error!(%err, "Scheduler pass could not list sessions"),
                    }
                }
            }
        }
    }

    /// Tick every non-terminal session once, sequentially.
    ///
    /// # Errors
    ///
    /// Only when the session list itself cannot be loaded. Per-session
    /// failures are absorbed and counted in the summary.
    pub async fn run_pass(&self, now: DateTime<Utc>) -> Result<PassSummary, StorageError> {
        let sessions = bounded(
            self.timeout(),
            "list_active_sessions",
            self.store.list_active_sessions(),
        )
        .await?;

        let mut summary = PassSummary {
            sessions: sessions.len(),
            ..PassSummary::default()
        };

        for session in sessions {
            let session_id = session.id;
            match self.tick_session(session, now).await {
                Ok(TickReport::Advanced { victory, .. }) => {
                    summary.advanced = summary.advanced.saturating_add(1);
                    if victory.is_some() {
                        summary.ended = summary.ended.saturating_add(1);
                    }
                }
                Ok(TickReport::Paused | TickReport::Idle | TickReport::Started) => {
                    summary.skipped = summary.skipped.saturating_add(1);
                }
                Err(err) => {
                    summary.failed = summary.failed.saturating_add(1);
                    self.handle_failure(session_id, &err, now).await;
                }
            }
        }
        Ok(summary)
    }

    /// Tick one session.
    ///
    /// # Errors
    ///
    /// Clock and storage errors. Writes made before the failing step
    /// remain committed.
    pub async fn tick_session(
        &self,
        mut session: Session,
        now: DateTime<Utc>,
    ) -> Result<TickReport, TickError> {
        let started = Instant::now();
        let mut clock = self.load_or_seed_clock(&session).await?;

        let (from, to) = match advance_clock(&mut clock, now)? {
            ClockAdvance::Paused => return Ok(TickReport::Paused),
            ClockAdvance::Skipped => return Ok(TickReport::Idle),
            ClockAdvance::Started => {
                self.commit_clock(&clock).await?;
                debug!(session_id = %session.id, game_time = %clock.game_time, "Session clock started");
                return Ok(TickReport::Started);
            }
            ClockAdvance::Advanced { from, to } => (from, to),
        };

        session.calendar = GameCalendar::from_datetime(to);

        let transitions = self.advance_operations(&mut session, to).await?;

        let decision = evaluate(
            &VictorySnapshot::from_economy(&session.economy, to),
            &self.rules,
        );
        let victory = decision.record(to);
        if let Some(record) = &victory {
            session.phase = SessionPhase::Ended;
            clock.phase = SessionPhase::Ended;
            session.victory = Some(record.clone());
            session.notify(
                NotificationKind::Victory,
                format!("{} {:?} victory: {}", record.winner, record.victory_type, record.reason),
                to,
            );
        }

        bounded(self.timeout(), "save_session", self.store.save_session(&session)).await?;

        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let lagging = record_success(
            &mut clock.stats,
            duration_ms,
            self.config.stats_sample_cap,
            self.config.lag_threshold_ms,
        );
        if lagging || victory.is_some() {
            clock.stats.last_alert_at = Some(now);
        }
        self.commit_clock(&clock).await?;

        debug!(
            session_id = %session.id,
            game_time = %to,
            transitions,
            duration_ms,
            "Session ticked"
        );

        if lagging {
            warn!(session_id = %session.id, duration_ms, threshold_ms = self.config.lag_threshold_ms, "Session tick lagging");
            self.alerter
                .emit(
                    Alert::new(
                        AlertLevel::Warning,
                        AlertCode::TickLag,
                        format!("tick took {duration_ms} ms"),
                    )
                    .for_session(session.id)
                    .with_detail(serde_json::json!({
                        "duration_ms": duration_ms,
                        "threshold_ms": self.config.lag_threshold_ms,
                        "avg_ms": clock.stats.avg_ms,
                    })),
                )
                .await;
        }

        if let Some(record) = &victory {
            info!(
                session_id = %session.id,
                winner = %record.winner,
                victory_type = ?record.victory_type,
                "Session ended"
            );
            self.alerter
                .emit(
                    Alert::new(AlertLevel::Info, AlertCode::Victory, record.reason.clone())
                        .for_session(session.id)
                        .with_detail(serde_json::json!({
                            "winner": record.winner,
                            "victory_type": record.victory_type,
                            "decided_at": record.decided_at,
                        })),
                )
                .await;
        }

        Ok(TickReport::Advanced {
            from,
            to,
            transitions,
            victory,
        })
    }

    /// Pause a session clock.
    ///
    /// # Errors
    ///
    /// Storage errors, or [`StorageError::NotFound`] for unknown sessions.
    pub async fn pause(&self, session_id: SessionId) -> Result<(), TickError> {
        self.update_clock(session_id, clock::pause).await
    }

    /// Resume a session clock without converting the paused interval.
    ///
    /// # Errors
    ///
    /// Storage errors, or [`StorageError::NotFound`] for unknown sessions.
    pub async fn resume(&self, session_id: SessionId) -> Result<(), TickError> {
        self.update_clock(session_id, clock::resume).await
    }

    async fn update_clock(
        &self,
        session_id: SessionId,
        change: fn(&mut SessionClock),
    ) -> Result<(), TickError> {
        let session = bounded(self.timeout(), "load_session", self.store.load_session(session_id))
            .await?
            .ok_or_else(|| StorageError::NotFound {
                kind: "session",
                id: session_id.to_string(),
            })?;
        let mut clock = self.load_or_seed_clock(&session).await?;
        change(&mut clock);
        self.commit_clock(&clock).await?;
        info!(%session_id, paused = clock.paused, "Session clock updated");
        Ok(())
    }

    async fn load_or_seed_clock(&self, session: &Session) -> Result<SessionClock, TickError> {
        if let Some(clock) =
            bounded(self.timeout(), "load_clock", self.store.load_clock(session.id)).await?
        {
            return Ok(clock);
        }
        let mut clock = seed_clock(session)?;
        if let Some(failures) = self.unclocked_failures.lock().await.get(&session.id).copied() {
            clock.stats.consecutive_failures = failures;
        }
        Ok(clock)
    }

    async fn commit_clock(&self, clock: &SessionClock) -> Result<u64, TickError> {
        let version = bounded(self.timeout(), "save_clock", self.store.save_clock(clock)).await?;
        self.unclocked_failures.lock().await.remove(&clock.session_id);
        Ok(version)
    }

    async fn advance_operations(
        &self,
        session: &mut Session,
        now: NaiveDateTime,
    ) -> Result<usize, TickError> {
        let pending = bounded(
            self.timeout(),
            "list_pending_operations",
            self.store.list_pending_operations(session.id),
        )
        .await?;

        let mut transitions = 0usize;
        for mut op in pending {
            let entered = advance(&mut op, now);
            if entered.is_empty() {
                continue;
            }
            transitions = transitions.saturating_add(entered.len());
            if op.status == OperationStatus::Completed {
                session.notify(
                    NotificationKind::Operation,
                    format!("{:?} operation at {} completed", op.objective, op.target),
                    now,
                );
            }
            bounded(self.timeout(), "save_operation", self.store.save_operation(&op)).await?;
        }
        Ok(transitions)
    }

    async fn handle_failure(&self, session_id: SessionId, err: &TickError, now: DateTime<Utc>) {
        error!(%session_id, %err, kind = ?err.kind(), "Session tick failed");

        let failures = match self.record_tick_failure(session_id, now).await {
            Ok(failures) => Some(failures),
            Err(record_err) => {
                warn!(%session_id, err = %record_err, "Could not record tick failure");
                None
            }
        };

        self.alerter
            .emit(
                Alert::new(
                    AlertLevel::Critical,
                    AlertCode::TickFailure,
                    format!("tick failed: {err}"),
                )
                .for_session(session_id)
                .with_detail(serde_json::json!({
                    "kind": format!("{:?}", err.kind()),
                    "consecutive_failures": failures,
                })),
            )
            .await;
    }

    async fn record_tick_failure(
        &self,
        session_id: SessionId,
        now: DateTime<Utc>,
    ) -> Result<u32, TickError> {
        let session = bounded(self.timeout(), "load_session", self.store.load_session(session_id))
            .await?
            .ok_or_else(|| StorageError::NotFound {
                kind: "session",
                id: session_id.to_string(),
            })?;
        let mut clock = match self.load_or_seed_clock(&session).await {
            Ok(clock) => clock,
            Err(TickError::Clock(ClockError::InvalidCalendar(_))) => {
                let mut tally = self.unclocked_failures.lock().await;
                let failures = tally.entry(session_id).or_insert(0);
                *failures = failures.saturating_add(1);
                return Ok(*failures);
            }
            Err(err) => return Err(err),
        };
        let failures = record_failure(&mut clock.stats);
        clock.stats.last_alert_at = Some(now);
        self.commit_clock(&clock).await?;
        Ok(failures)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{TimeDelta, TimeZone};
    use rust_decimal_macros::dec;
    use strategos_agents::{OperationDraft, create_operation, issue};
    use strategos_types::{
        Actor, Annotations, CardId, CpCost, CpGauges, Faction, FactionStanding, GridCoord,
        LogisticsCaps, OperationObjective, Rank, StrategicGrid, TimeScale,
    };

    use super::*;
    use crate::alerts::MemoryAlertSink;
    use crate::config::AlertConfig;
    use crate::storage::MemoryStore;

    type TestScheduler = Scheduler<MemoryStore, MemoryAlertSink>;

    fn wall(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap() + TimeDelta::try_seconds(seconds).unwrap()
    }

    fn session(scale: TimeScale) -> Session {
        let mut s = Session::new(
            "Vermillion",
            GameCalendar {
                year: 799,
                month: 4,
                day: 1,
                hour: 0,
                minute: 0,
            },
            scale,
            StrategicGrid::filled(6, 6, 0),
            5,
        );
        let balanced = FactionStanding {
            star_systems: 30,
            population_share: dec!(0.5),
            fleet_ships: 1000,
        };
        s.economy.empire = balanced;
        s.economy.alliance = balanced;
        s
    }

    fn scheduler() -> (Arc<MemoryStore>, TestScheduler) {
        let store = Arc::new(MemoryStore::new());
        let alerter = Arc::new(Alerter::new(MemoryAlertSink::new(), &AlertConfig::default()));
        let scheduler = Scheduler::new(Arc::clone(&store), alerter, SchedulerConfig::default());
        (store, scheduler)
    }

    async fn stored_clock(store: &MemoryStore, id: SessionId) -> SessionClock {
        store.load_clock(id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn clock_is_seeded_lazily_and_same_second_ticks_are_no_ops() {
        let (store, scheduler) = scheduler();
        let s = session(TimeScale::default());
        store.save_session(&s).await.unwrap();
        assert!(store.load_clock(s.id).await.unwrap().is_none());

        let summary = scheduler.run_pass(wall(0)).await.unwrap();
        assert_eq!(summary.skipped, 1);
        let seeded = stored_clock(&store, s.id).await;
        assert_eq!(seeded.game_time, s.calendar.to_datetime().unwrap());

        let summary = scheduler.run_pass(wall(5)).await.unwrap();
        assert_eq!(summary.advanced, 1);
        let after = stored_clock(&store, s.id).await;
        assert_eq!(after.game_time - seeded.game_time, TimeDelta::try_minutes(5).unwrap());
        assert_eq!(after.stats.samples, 1);

        let same_second = wall(5) + TimeDelta::try_milliseconds(300).unwrap();
        let summary = scheduler.run_pass(same_second).await.unwrap();
        assert_eq!(summary.skipped, 1);
        assert_eq!(stored_clock(&store, s.id).await.game_time, after.game_time);

        let stored = store.load_session(s.id).await.unwrap().unwrap();
        assert_eq!(stored.calendar, GameCalendar::from_datetime(after.game_time));
    }

    #[tokio::test]
    async fn executing_operation_completes_at_ceiling_through_ticks() {
        let (store, scheduler) = scheduler();
        let s = session(TimeScale {
            real_seconds: 1,
            game_seconds: 86_400,
        });
        store.save_session(&s).await.unwrap();

        let mut author = Actor::new(s.id, "Yang", Faction::Alliance, Rank::Admiral, CpGauges::new(5, 5));
        let card = CardId::new();
        author.held_cards.insert(card);
        let start = s.calendar.to_datetime().unwrap();
        let mut op = create_operation(
            OperationDraft {
                card_id: card,
                objective: OperationObjective::Defense,
                target: GridCoord::new(1, 1),
                cost: CpCost::default(),
                wait_hours: 1,
                execution_hours: 5000,
                logistics: LogisticsCaps {
                    unit_batch_limit: 100,
                    supply_limit: 100,
                },
                annotations: Annotations::new(),
            },
            &mut author,
            &s.grid,
            start,
        )
        .unwrap();
        issue(&mut op, author.id, start).unwrap();
        store.save_operation(&op).await.unwrap();

        scheduler.run_pass(wall(0)).await.unwrap();
        scheduler.run_pass(wall(2)).await.unwrap();
        let executing = store.load_operation(op.id).await.unwrap().unwrap();
        assert_eq!(executing.status, OperationStatus::Executing);

        scheduler.run_pass(wall(31)).await.unwrap();
        let done = store.load_operation(op.id).await.unwrap().unwrap();
        assert_eq!(done.status, OperationStatus::Completed);
        assert_eq!(
            done.timeline.finished_at,
            Some(start + TimeDelta::try_days(30).unwrap())
        );
        assert!(store.list_pending_operations(s.id).await.unwrap().is_empty());

        let stored = store.load_session(s.id).await.unwrap().unwrap();
        assert!(stored
            .notifications
            .iter()
            .any(|n| n.kind == NotificationKind::Operation));
    }

    #[tokio::test]
    async fn failing_session_does_not_stop_others() {
        let (store, scheduler) = scheduler();
        let broken = session(TimeScale {
            real_seconds: 0,
            game_seconds: 60,
        });
        let healthy = session(TimeScale::default());
        store.save_session(&broken).await.unwrap();
        store.save_session(&healthy).await.unwrap();

        scheduler.run_pass(wall(0)).await.unwrap();
        let summary = scheduler.run_pass(wall(10)).await.unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.advanced, 1);

        let healthy_clock = stored_clock(&store, healthy.id).await;
        assert_eq!(
            healthy_clock.game_time - healthy.calendar.to_datetime().unwrap(),
            TimeDelta::try_minutes(10).unwrap()
        );

        let broken_clock = stored_clock(&store, broken.id).await;
        assert_eq!(broken_clock.stats.consecutive_failures, 1);
        assert!(broken_clock.stats.last_alert_at.is_some());

        scheduler.run_pass(wall(20)).await.unwrap();
        assert_eq!(stored_clock(&store, broken.id).await.stats.consecutive_failures, 2);

        let alerts = scheduler.alerter.sink().by_code(AlertCode::TickFailure).await;
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts.first().unwrap().session_id, Some(broken.id));
    }

    #[tokio::test]
    async fn failures_without_a_clock_are_still_counted() {
        let (store, scheduler) = scheduler();
        let mut s = session(TimeScale::default());
        s.calendar.month = 13;
        store.save_session(&s).await.unwrap();

        for _ in 0..2 {
            let summary = scheduler.run_pass(wall(0)).await.unwrap();
            assert_eq!(summary.failed, 1);
        }
        assert!(store.load_clock(s.id).await.unwrap().is_none());

        let alerts = scheduler.alerter.sink().by_code(AlertCode::TickFailure).await;
        let counts: Vec<Option<u64>> = alerts
            .iter()
            .map(|a| {
                a.detail
                    .as_ref()
                    .and_then(|d| d.get("consecutive_failures"))
                    .and_then(serde_json::Value::as_u64)
            })
            .collect();
        assert_eq!(counts, vec![Some(1), Some(2)]);

        let mut repaired = store.load_session(s.id).await.unwrap().unwrap();
        repaired.calendar.month = 4;
        store.save_session(&repaired).await.unwrap();

        let summary = scheduler.run_pass(wall(10)).await.unwrap();
        assert_eq!(summary.skipped, 1);
        assert_eq!(stored_clock(&store, s.id).await.stats.consecutive_failures, 2);
        assert!(scheduler.unclocked_failures.lock().await.is_empty());

        scheduler.run_pass(wall(20)).await.unwrap();
        assert_eq!(stored_clock(&store, s.id).await.stats.consecutive_failures, 0);
    }

    #[tokio::test]
    async fn victory_ends_session_and_alerts() {
        let (store, scheduler) = scheduler();
        let mut s = session(TimeScale::default());
        s.economy.empire.star_systems = 2;
        store.save_session(&s).await.unwrap();

        scheduler.run_pass(wall(0)).await.unwrap();
        let summary = scheduler.run_pass(wall(2)).await.unwrap();
        assert_eq!(summary.ended, 1);

        let ended = store.load_session(s.id).await.unwrap().unwrap();
        assert_eq!(ended.phase, SessionPhase::Ended);
        assert_eq!(ended.victory.as_ref().unwrap().winner, Faction::Alliance);
        assert_eq!(stored_clock(&store, s.id).await.phase, SessionPhase::Ended);
        assert_eq!(scheduler.alerter.sink().by_code(AlertCode::Victory).await.len(), 1);

        let summary = scheduler.run_pass(wall(10)).await.unwrap();
        assert_eq!(summary.sessions, 0);
    }

    #[tokio::test]
    async fn paused_session_does_not_advance() {
        let (store, scheduler) = scheduler();
        let s = session(TimeScale::default());
        store.save_session(&s).await.unwrap();
        scheduler.run_pass(wall(0)).await.unwrap();

        scheduler.pause(s.id).await.unwrap();
        scheduler.run_pass(wall(100)).await.unwrap();
        let frozen = stored_clock(&store, s.id).await.game_time;
        assert_eq!(frozen, s.calendar.to_datetime().unwrap());

        scheduler.resume(s.id).await.unwrap();
        scheduler.run_pass(wall(200)).await.unwrap();
        scheduler.run_pass(wall(203)).await.unwrap();
        assert_eq!(
            stored_clock(&store, s.id).await.game_time - frozen,
            TimeDelta::try_minutes(3).unwrap()
        );
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let (store, scheduler) = scheduler();
        store.save_session(&session(TimeScale::default())).await.unwrap();
        let shutdown = tokio::time::sleep(Duration::from_millis(30));
        tokio::time::timeout(Duration::from_secs(5), scheduler.run(shutdown))
            .await
            .unwrap();
    }
}
