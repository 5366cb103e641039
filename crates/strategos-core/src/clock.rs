//! Session clocks: game-time advancement and loop statistics.
//!
//! Game time moves only when at least one full wall-clock second has
//! passed since the last advancing tick, which makes repeated ticks inside
//! the same second idempotent. Elapsed wall-clock time is converted with
//! the session's `real_seconds : game_seconds` ratio at millisecond
//! precision. All arithmetic is checked and game time never regresses.

use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use strategos_types::{ErrorKind, LoopStats, Session, SessionClock, SessionId, TimeScale};

/// Smallest wall-clock gap, in milliseconds, that advances game time.
pub const MIN_TICK_GAP_MS: i64 = 1000;

/// Errors that can occur during clock operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClockError {
    /// The session's scale has a zero real-seconds term.
    #[error("session {session_id} has an invalid time scale {real}:{game}")]
    InvalidScale {
        /// The session.
        session_id: SessionId,
        /// Real-seconds term.
        real: u32,
        /// Game-seconds term.
        game: u32,
    },

    /// The stored calendar does not form a valid date.
    #[error("session {0} has an invalid calendar")]
    InvalidCalendar(SessionId),

    /// Game time would leave the representable range.
    #[error("game time overflow for session {0}")]
    TimeOverflow(SessionId),
}

impl ClockError {
    /// Taxonomy category of this error.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidScale { .. } | Self::InvalidCalendar(_) => ErrorKind::Validation,
            Self::TimeOverflow(_) => ErrorKind::Infrastructure,
        }
    }
}

/// What a call to [`advance_clock`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockAdvance {
    /// The clock is paused; nothing changed.
    Paused,
    /// First observation; the wall-clock reference was set.
    Started,
    /// Less than a second since the last tick; nothing changed.
    Skipped,
    /// Game time moved forward.
    Advanced {
        /// Game time before the tick.
        from: NaiveDateTime,
        /// Game time after the tick.
        to: NaiveDateTime,
    },
}

/// Create a clock for `session`, seeded from its stored calendar.
///
/// # Errors
///
/// Returns [`ClockError::InvalidCalendar`] when the calendar fields do not
/// form a date.
pub fn seed_clock(session: &Session) -> Result<SessionClock, ClockError> {
    let game_time = session
        .calendar
        .to_datetime()
        .ok_or(ClockError::InvalidCalendar(session.id))?;
    Ok(SessionClock {
        session_id: session.id,
        game_time,
        last_real_tick: None,
        scale: session.time_scale,
        phase: session.phase,
        paused: false,
        stats: LoopStats::default(),
        version: 0,
    })
}

/// Convert elapsed wall-clock time to elapsed game time.
///
/// # Errors
///
/// Returns [`ClockError::InvalidScale`] for a zero real-seconds term and
/// [`ClockError::TimeOverflow`] when the product does not fit.
pub fn game_elapsed(
    session_id: SessionId,
    real: TimeDelta,
    scale: TimeScale,
) -> Result<TimeDelta, ClockError> {
    if scale.real_seconds == 0 {
        return Err(ClockError::InvalidScale {
            session_id,
            real: scale.real_seconds,
            game: scale.game_seconds,
        });
    }
    let game_ms = real
        .num_milliseconds()
        .checked_mul(i64::from(scale.game_seconds))
        .and_then(|ms| ms.checked_div(i64::from(scale.real_seconds)))
        .ok_or(ClockError::TimeOverflow(session_id))?;
    TimeDelta::try_milliseconds(game_ms).ok_or(ClockError::TimeOverflow(session_id))
}

/// Advance `clock` to wall-clock instant `now`.
///
/// # Errors
///
/// Scale and overflow errors from [`game_elapsed`]; the clock is left
/// unchanged on error.
pub fn advance_clock(
    clock: &mut SessionClock,
    now: DateTime<Utc>,
) -> Result<ClockAdvance, ClockError> {
    if clock.paused {
        return Ok(ClockAdvance::Paused);
    }
    let Some(last) = clock.last_real_tick else {
        clock.last_real_tick = Some(now);
        return Ok(ClockAdvance::Started);
    };

    let real = now.signed_duration_since(last);
    if real.num_milliseconds() < MIN_TICK_GAP_MS {
        return Ok(ClockAdvance::Skipped);
    }

    let delta = game_elapsed(clock.session_id, real, clock.scale)?;
    let from = clock.game_time;
    let to = from
        .checked_add_signed(delta)
        .ok_or(ClockError::TimeOverflow(clock.session_id))?
        .max(from);

    clock.game_time = to;
    clock.last_real_tick = Some(now);
    Ok(ClockAdvance::Advanced { from, to })
}

/// Pause the clock. Idempotent.
pub const fn pause(clock: &mut SessionClock) {
    clock.paused = true;
}

/// Resume the clock, discarding the wall-clock reference so the paused
/// interval is not converted into game time.
pub const fn resume(clock: &mut SessionClock) {
    clock.paused = false;
    clock.last_real_tick = None;
}

/// Fold a successful tick of `duration_ms` into the rolling statistics.
///
/// The average weights at most `sample_cap` samples. Returns `true` when
/// the tick exceeded `lag_threshold_ms`.
pub fn record_success(
    stats: &mut LoopStats,
    duration_ms: u64,
    sample_cap: u64,
    lag_threshold_ms: u64,
) -> bool {
    let samples = stats.samples.saturating_add(1).min(sample_cap.max(1));
    let previous_weight = samples.saturating_sub(1);
    let weighted = u128::from(stats.avg_ms)
        .saturating_mul(u128::from(previous_weight))
        .saturating_add(u128::from(duration_ms));
    let avg = weighted
        .checked_div(u128::from(samples))
        .and_then(|avg| u64::try_from(avg).ok())
        .unwrap_or(duration_ms);

    stats.last_ms = duration_ms;
    stats.avg_ms = avg;
    stats.max_ms = stats.max_ms.max(duration_ms);
    stats.samples = samples;
    stats.consecutive_failures = 0;

    duration_ms > lag_threshold_ms
}

/// Count a failed tick. Returns the new consecutive-failure count.
pub const fn record_failure(stats: &mut LoopStats) -> u32 {
    stats.consecutive_failures = stats.consecutive_failures.saturating_add(1);
    stats.consecutive_failures
}
