//! Operation lifecycle: draft, issued, executing, then completed or aborted.
//!
//! Creation validates before it charges: batch size first, then card
//! possession, then the target's terrain, and only then the command-point
//! cost. Progression after issue is driven by game time alone through
//! [`advance`], which the scheduler calls on every tick.
//!
//! Completion is bounded by [`OPERATION_CEILING_HOURS`] measured from
//! issue, independent of the nominal wait and execution windows.

use chrono::{NaiveDateTime, TimeDelta};
use strategos_ledger::apply_cost;
use strategos_types::{
    Actor, ActorId, Annotations, AuditEntry, CardId, CpCost, GridCoord, LogisticsCaps, Operation,
    OperationId, OperationObjective, OperationStatus, OperationTimeline, StrategicGrid,
};
use strategos_world::{SpatialError, assess_terrain};

use crate::error::OperationError;

/// Largest unit batch an operation may move into one cell.
pub const MAX_UNIT_BATCH: u32 = 300;

/// Absolute lifetime of an issued operation, in game hours (30 days).
pub const OPERATION_CEILING_HOURS: u32 = 30 * 24;

/// Input for [`create_operation`].
#[derive(Debug, Clone, PartialEq)]
pub struct OperationDraft {
    /// Card the operation is planned under.
    pub card_id: CardId,
    /// Objective type.
    pub objective: OperationObjective,
    /// Target cell.
    pub target: GridCoord,
    /// Command-point cost charged at creation.
    pub cost: CpCost,
    /// Hours between issue and the start of execution.
    pub wait_hours: u32,
    /// Nominal execution window in hours.
    pub execution_hours: u32,
    /// Logistics caps.
    pub logistics: LogisticsCaps,
    /// Forward-compatible extension data.
    pub annotations: Annotations,
}

/// Validate a draft, charge its cost to `author`, and build the operation.
///
/// Nothing is charged unless every validation passes.
///
/// # Errors
///
/// - [`OperationError::BatchLimitExceeded`] when the batch is above 300
/// - [`OperationError::CardNotHeld`] when the author lacks the card
/// - [`OperationError::Spatial`] when the target is impassable
/// - [`OperationError::Points`] when the cost cannot be covered
pub fn create_operation(
    draft: OperationDraft,
    author: &mut Actor,
    grid: &StrategicGrid,
    now: NaiveDateTime,
) -> Result<Operation, OperationError> {
    if draft.logistics.unit_batch_limit > MAX_UNIT_BATCH {
        return Err(OperationError::BatchLimitExceeded {
            requested: draft.logistics.unit_batch_limit,
            limit: MAX_UNIT_BATCH,
        });
    }

    let holds_card =
        author.held_cards.contains(&draft.card_id) || author.capability(draft.card_id).is_some();
    if !holds_card {
        return Err(OperationError::CardNotHeld {
            actor: author.id,
            card: draft.card_id,
        });
    }

    let terrain = assess_terrain(grid, draft.target);
    if terrain.impassable {
        return Err(SpatialError::ImpassableTerrain {
            cell: draft.target,
            terrain: terrain.terrain_type,
        }
        .into());
    }

    let receipt = apply_cost(&mut author.gauges, &draft.cost)?;

    let operation = Operation {
        id: OperationId::new(),
        session_id: author.session_id,
        author: author.id,
        faction: author.faction,
        card_id: draft.card_id,
        objective: draft.objective,
        target: draft.target,
        cost: draft.cost,
        substituted: receipt.substituted,
        timeline: OperationTimeline {
            issued_at: None,
            wait_hours: draft.wait_hours,
            execution_hours: draft.execution_hours,
            started_at: None,
            finished_at: None,
        },
        logistics: draft.logistics,
        status: OperationStatus::Draft,
        audit: vec![AuditEntry {
            note: format!("drafted {:?} against {}", draft.objective, draft.target),
            author: Some(author.id),
            at: now,
        }],
        annotations: draft.annotations,
        version: 0,
    };

    tracing::info!(
        operation = %operation.id,
        author = %author.id,
        target = %operation.target,
        substituted = receipt.substituted,
        "Operation drafted"
    );
    Ok(operation)
}

/// Issue a draft operation, stamping the issue time.
///
/// # Errors
///
/// Returns [`OperationError::NotAuthor`] for anyone but the author, and
/// [`OperationError::InvalidTransition`] unless the operation is a draft.
pub fn issue(op: &mut Operation, by: ActorId, now: NaiveDateTime) -> Result<(), OperationError> {
    if by != op.author {
        return Err(OperationError::NotAuthor { actor: by });
    }
    if op.status != OperationStatus::Draft {
        return Err(OperationError::InvalidTransition {
            from: op.status,
            action: "issue",
        });
    }
    op.status = OperationStatus::Issued;
    op.timeline.issued_at = Some(now);
    push_audit(op, "issued", Some(by), now);
    tracing::info!(operation = %op.id, issued_at = %now, "Operation issued");
    Ok(())
}

/// Abort a non-terminal operation.
///
/// `by` is `None` when the system aborts on its own behalf.
///
/// # Errors
///
/// Returns [`OperationError::NotAuthor`] when an actor other than the
/// author aborts, and [`OperationError::InvalidTransition`] for terminal
/// operations.
pub fn abort(
    op: &mut Operation,
    by: Option<ActorId>,
    reason: &str,
    now: NaiveDateTime,
) -> Result<(), OperationError> {
    if let Some(actor) = by
        && actor != op.author
    {
        return Err(OperationError::NotAuthor { actor });
    }
    if op.status.is_terminal() {
        return Err(OperationError::InvalidTransition {
            from: op.status,
            action: "abort",
        });
    }
    op.status = OperationStatus::Aborted;
    op.timeline.finished_at = Some(now);
    push_audit(op, &format!("aborted: {reason}"), by, now);
    tracing::info!(operation = %op.id, reason, "Operation aborted");
    Ok(())
}

/// When execution is due to start, if the operation has been issued.
///
/// Never later than [`completion_due`].
pub fn start_due(timeline: &OperationTimeline) -> Option<NaiveDateTime> {
    let issued = timeline.issued_at?;
    let start = add_hours(issued, timeline.wait_hours);
    match (start, completion_due(timeline)) {
        (Some(start), Some(done)) => Some(start.min(done)),
        (start, done) => start.or(done),
    }
}

/// When the operation completes: the nominal end or the ceiling,
/// whichever comes first.
pub fn completion_due(timeline: &OperationTimeline) -> Option<NaiveDateTime> {
    let issued = timeline.issued_at?;
    let nominal = add_hours(
        issued,
        timeline.wait_hours.saturating_add(timeline.execution_hours),
    );
    let ceiling = add_hours(issued, OPERATION_CEILING_HOURS);
    match (nominal, ceiling) {
        (Some(nominal), Some(ceiling)) => Some(nominal.min(ceiling)),
        (nominal, ceiling) => nominal.or(ceiling),
    }
}

/// Move an operation forward to wherever game time `now` puts it.
///
/// Returns the states entered, in order. Operations that are not issued
/// or executing are left alone.
pub fn advance(op: &mut Operation, now: NaiveDateTime) -> Vec<OperationStatus> {
    let mut entered = Vec::new();

    if op.status == OperationStatus::Issued
        && let Some(due) = start_due(&op.timeline)
        && now >= due
    {
        op.status = OperationStatus::Executing;
        op.timeline.started_at = Some(due);
        push_audit(op, "execution started", None, now);
        entered.push(OperationStatus::Executing);
    }

    if op.status == OperationStatus::Executing
        && let Some(due) = completion_due(&op.timeline)
        && now >= due
    {
        op.status = OperationStatus::Completed;
        op.timeline.finished_at = Some(due);
        let nominal = op
            .timeline
            .wait_hours
            .saturating_add(op.timeline.execution_hours);
        let note = if nominal > OPERATION_CEILING_HOURS {
            "completed at the 30-day ceiling"
        } else {
            "completed"
        };
        push_audit(op, note, None, now);
        entered.push(OperationStatus::Completed);
    }

    if !entered.is_empty() {
        tracing::debug!(operation = %op.id, status = op.status.as_str(), "Operation advanced");
    }
    entered
}

fn add_hours(at: NaiveDateTime, hours: u32) -> Option<NaiveDateTime> {
    TimeDelta::try_hours(i64::from(hours)).and_then(|delta| at.checked_add_signed(delta))
}

fn push_audit(op: &mut Operation, note: &str, author: Option<ActorId>, at: NaiveDateTime) {
    op.audit.push(AuditEntry {
        note: note.to_owned(),
        author,
        at,
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::NaiveDate;
    use strategos_ledger::PointsError;
    use strategos_types::{CpGauges, CpPool, Faction, Rank, SessionId};

    use super::*;

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(796, 5, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn author() -> (Actor, CardId) {
        let mut actor = Actor::new(
            SessionId::new(),
            "Bucock",
            Faction::Alliance,
            Rank::Admiral,
            CpGauges::new(10, 10),
        );
        let card = CardId::new();
        actor.held_cards.insert(card);
        (actor, card)
    }

    fn draft(card_id: CardId, batch: u32) -> OperationDraft {
        OperationDraft {
            card_id,
            objective: OperationObjective::Occupation,
            target: GridCoord::new(2, 2),
            cost: CpCost::single(CpPool::Military, 4),
            wait_hours: 12,
            execution_hours: 48,
            logistics: LogisticsCaps {
                unit_batch_limit: batch,
                supply_limit: 1000,
            },
            annotations: Annotations::new(),
        }
    }

    fn grid() -> StrategicGrid {
        StrategicGrid::filled(5, 5, 0)
    }

    fn issued(wait_hours: u32, execution_hours: u32) -> Operation {
        let (mut actor, card) = author();
        let mut d = draft(card, 100);
        d.wait_hours = wait_hours;
        d.execution_hours = execution_hours;
        let mut op = create_operation(d, &mut actor, &grid(), at(1, 0)).unwrap();
        issue(&mut op, actor.id, at(1, 0)).unwrap();
        op
    }

    #[test]
    fn batch_of_301_is_rejected_300_accepted() {
        let (mut actor, card) = author();
        let err = create_operation(draft(card, 301), &mut actor, &grid(), at(1, 0)).unwrap_err();
        assert!(matches!(
            err,
            OperationError::BatchLimitExceeded { requested: 301, limit: 300 }
        ));
        assert_eq!(actor.gauges, CpGauges::new(10, 10));

        let op = create_operation(draft(card, 300), &mut actor, &grid(), at(1, 0)).unwrap();
        assert_eq!(op.status, OperationStatus::Draft);
        assert_eq!(actor.gauges, CpGauges::new(10, 6));
        assert!(!op.substituted);
        assert_eq!(op.audit.len(), 1);
    }

    #[test]
    fn validation_precedes_charging() {
        let (mut actor, _) = author();
        let err =
            create_operation(draft(CardId::new(), 10), &mut actor, &grid(), at(1, 0)).unwrap_err();
        assert!(matches!(err, OperationError::CardNotHeld { .. }));

        let (mut actor, card) = author();
        let mut d = draft(card, 10);
        d.target = GridCoord::new(9, 9);
        let err = create_operation(d, &mut actor, &grid(), at(1, 0)).unwrap_err();
        assert!(matches!(
            err,
            OperationError::Spatial(SpatialError::ImpassableTerrain { .. })
        ));
        assert_eq!(actor.gauges, CpGauges::new(10, 10));
    }

    #[test]
    fn substitution_is_recorded_and_shortfall_rejected() {
        let (mut actor, card) = author();
        actor.gauges = CpGauges::new(10, 1);
        let op = create_operation(draft(card, 10), &mut actor, &grid(), at(1, 0)).unwrap();
        assert!(op.substituted);
        assert_eq!(actor.gauges, CpGauges::new(4, 0));

        let err = create_operation(draft(card, 10), &mut actor, &grid(), at(1, 0)).unwrap_err();
        assert!(matches!(
            err,
            OperationError::Points(PointsError::InsufficientPoints { .. })
        ));
        assert_eq!(actor.gauges, CpGauges::new(4, 0));
    }

    #[test]
    fn issue_only_from_draft_and_only_by_author() {
        let (mut actor, card) = author();
        let mut op = create_operation(draft(card, 10), &mut actor, &grid(), at(1, 0)).unwrap();
        assert!(matches!(
            issue(&mut op, ActorId::new(), at(1, 1)),
            Err(OperationError::NotAuthor { .. })
        ));
        issue(&mut op, actor.id, at(1, 1)).unwrap();
        assert_eq!(op.timeline.issued_at, Some(at(1, 1)));
        assert!(matches!(
            issue(&mut op, actor.id, at(1, 2)),
            Err(OperationError::InvalidTransition { from: OperationStatus::Issued, .. })
        ));
    }

    #[test]
    fn advance_follows_wait_then_execution() {
        let mut op = issued(12, 48);
        assert!(advance(&mut op, at(1, 11)).is_empty());
        assert_eq!(advance(&mut op, at(1, 12)), vec![OperationStatus::Executing]);
        assert_eq!(op.timeline.started_at, Some(at(1, 12)));
        assert!(advance(&mut op, at(3, 11)).is_empty());
        assert_eq!(advance(&mut op, at(3, 12)), vec![OperationStatus::Completed]);
        assert!(advance(&mut op, at(20, 0)).is_empty());
        assert_eq!(op.audit.len(), 4);
    }

    #[test]
    fn executing_operation_completes_at_30_day_ceiling() {
        let mut op = issued(1, 2000);
        advance(&mut op, at(1, 1));
        assert_eq!(op.status, OperationStatus::Executing);

        assert!(advance(&mut op, at(30, 23)).is_empty());
        assert_eq!(advance(&mut op, at(31, 0)), vec![OperationStatus::Completed]);
        assert_eq!(op.timeline.finished_at, Some(at(31, 0)));
        assert_eq!(op.audit.last().unwrap().note, "completed at the 30-day ceiling");
    }

    #[test]
    fn wait_beyond_ceiling_cascades_to_completed() {
        let mut op = issued(1000, 10);
        assert_eq!(
            advance(&mut op, at(31, 0)),
            vec![OperationStatus::Executing, OperationStatus::Completed]
        );
    }

    #[test]
    fn abort_is_terminal() {
        let mut op = issued(12, 48);
        assert!(matches!(
            abort(&mut op, Some(ActorId::new()), "no", at(1, 2)),
            Err(OperationError::NotAuthor { .. })
        ));
        abort(&mut op, None, "supply lines cut", at(1, 2)).unwrap();
        assert_eq!(op.status, OperationStatus::Aborted);
        assert!(advance(&mut op, at(20, 0)).is_empty());
        assert!(abort(&mut op, None, "again", at(1, 3)).is_err());
    }
}
