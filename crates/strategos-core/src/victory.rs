//! End-of-session victory evaluation.
//!
//! [`evaluate`] is a pure function of a [`VictorySnapshot`] and the
//! [`VictoryRules`]. Rules apply in priority order:
//!
//! 1. Capital conquered by the opposing belligerent: decisive if the
//!    conqueror holds at least 90% of the population and at least ten
//!    times the loser's fleet (a loser with no ships counts as infinitely
//!    outnumbered), limited otherwise.
//! 2. A belligerent down to three or fewer star systems: limited victory
//!    for the other. The Empire's count is checked first.
//! 3. The end-of-term deadline has passed: local victory for the strictly
//!    larger population share, the tie-break faction on an exact tie.
//! 4. Otherwise the session continues.

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use strategos_types::{EconomySnapshot, Faction, FactionStanding, VictoryRecord, VictoryType};

/// Faction that wins a deadline tie on population share.
pub const TIE_BREAK_FACTION: Faction = Faction::Alliance;

/// Star systems at or below which a belligerent has lost.
pub const MIN_STAR_SYSTEMS: u32 = 3;

/// Fleet ratio a conqueror needs for a decisive victory.
pub const DECISIVE_FLEET_RATIO: u64 = 10;

/// Tunables of the victory rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VictoryRules {
    /// End of the term; reaching it forces a decision.
    pub deadline: NaiveDateTime,
    /// Winner of a deadline tie.
    pub tie_break: Faction,
    /// Population share a conqueror needs for a decisive victory.
    pub decisive_share: Decimal,
    /// Fleet ratio a conqueror needs for a decisive victory.
    pub decisive_fleet_ratio: u64,
    /// Star-system floor.
    pub min_star_systems: u32,
}

impl Default for VictoryRules {
    fn default() -> Self {
        let deadline = NaiveDate::from_ymd_opt(801, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .unwrap_or(NaiveDateTime::MAX);
        Self {
            deadline,
            tie_break: TIE_BREAK_FACTION,
            decisive_share: Decimal::new(90, 2),
            decisive_fleet_ratio: DECISIVE_FLEET_RATIO,
            min_star_systems: MIN_STAR_SYSTEMS,
        }
    }
}

/// World state the evaluator looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VictorySnapshot {
    /// Current game time.
    pub game_time: NaiveDateTime,
    /// Belligerent that took the other's capital, if any.
    pub capital_conqueror: Option<Faction>,
    /// Imperial standing.
    pub empire: FactionStanding,
    /// Alliance standing.
    pub alliance: FactionStanding,
}

impl VictorySnapshot {
    /// Build from a session's economy snapshot at `game_time`.
    pub const fn from_economy(economy: &EconomySnapshot, game_time: NaiveDateTime) -> Self {
        Self {
            game_time,
            capital_conqueror: economy.capital_conqueror,
            empire: economy.empire,
            alliance: economy.alliance,
        }
    }

    const fn standing(&self, faction: Faction) -> &FactionStanding {
        match faction {
            Faction::Empire | Faction::Fezzan | Faction::Rebel => &self.empire,
            Faction::Alliance => &self.alliance,
        }
    }
}

/// Outcome of one evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VictoryDecision {
    /// Whether the session ends now.
    pub should_end: bool,
    /// Winning faction.
    pub winner: Option<Faction>,
    /// Victory type.
    pub victory_type: Option<VictoryType>,
    /// Which rule fired.
    pub reason: Option<String>,
}

impl VictoryDecision {
    /// The session continues.
    pub fn continue_session() -> Self {
        Self::default()
    }

    fn end(winner: Faction, victory_type: VictoryType, reason: String) -> Self {
        Self {
            should_end: true,
            winner: Some(winner),
            victory_type: Some(victory_type),
            reason: Some(reason),
        }
    }

    /// Record to store on the session, if the session ends.
    pub fn record(&self, decided_at: NaiveDateTime) -> Option<VictoryRecord> {
        if !self.should_end {
            return None;
        }
        Some(VictoryRecord {
            winner: self.winner?,
            victory_type: self.victory_type?,
            reason: self.reason.clone().unwrap_or_default(),
            decided_at,
        })
    }
}

/// Decide whether the session ends.
pub fn evaluate(snapshot: &VictorySnapshot, rules: &VictoryRules) -> VictoryDecision {
    if let Some(conqueror) = snapshot.capital_conqueror
        && let Some(loser) = conqueror.opponent()
    {
        return conquest(snapshot, rules, conqueror, loser);
    }

    for (faction, standing) in [
        (Faction::Empire, &snapshot.empire),
        (Faction::Alliance, &snapshot.alliance),
    ] {
        if standing.star_systems <= rules.min_star_systems
            && let Some(winner) = faction.opponent()
        {
            return VictoryDecision::end(
                winner,
                VictoryType::Limited,
                format!(
                    "{faction} reduced to {} star systems",
                    standing.star_systems
                ),
            );
        }
    }

    if snapshot.game_time >= rules.deadline {
        let empire = snapshot.empire.population_share;
        let alliance = snapshot.alliance.population_share;
        let (winner, reason) = match empire.cmp(&alliance) {
            std::cmp::Ordering::Greater => (Faction::Empire, "larger population share at term end"),
            std::cmp::Ordering::Less => (Faction::Alliance, "larger population share at term end"),
            std::cmp::Ordering::Equal => (rules.tie_break, "population tied at term end"),
        };
        return VictoryDecision::end(winner, VictoryType::Local, reason.to_owned());
    }

    VictoryDecision::continue_session()
}

fn conquest(
    snapshot: &VictorySnapshot,
    rules: &VictoryRules,
    conqueror: Faction,
    loser: Faction,
) -> VictoryDecision {
    let winner = snapshot.standing(conqueror);
    let beaten = snapshot.standing(loser);

    let share_ok = winner.population_share >= rules.decisive_share;
    let fleet_ok = beaten.fleet_ships == 0
        || beaten
            .fleet_ships
            .checked_mul(rules.decisive_fleet_ratio)
            .is_some_and(|needed| winner.fleet_ships >= needed);

    if share_ok && fleet_ok {
        VictoryDecision::end(
            conqueror,
            VictoryType::Decisive,
            format!("{conqueror} took the {loser} capital with overwhelming superiority"),
        )
    } else {
        VictoryDecision::end(
            conqueror,
            VictoryType::Limited,
            format!("{conqueror} took the {loser} capital"),
        )
    }
}
