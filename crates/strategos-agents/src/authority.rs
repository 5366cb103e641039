//! Authority cards: provisioning from catalog templates, assignment, and
//! execution-time eligibility.
//!
//! Cards are provisioned per session and faction, one per template scoped
//! to that faction or shared. Provisioning is idempotent and diff-based:
//! every call re-derives the catalog-owned fields, and a card is only
//! reported for writing when one of them changed. Holder and status are
//! never touched by provisioning, so catalog upgrades propagate without
//! discarding assignments.

use std::collections::BTreeSet;

use strategos_catalog::{CardTemplate, CatalogIndex};
use strategos_types::{
    Actor, ActorId, Annotations, AuthorityCard, CapabilityGroup, CardId, CardStatus, Faction,
    SessionId,
};

use crate::error::AuthorityError;

/// Maximum cards one actor may hold.
pub const MAX_CARDS_PER_ACTOR: usize = 16;

/// Cards that provisioning wants written, with counts for logging.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvisionPlan {
    /// New or changed cards to persist.
    pub upserts: Vec<AuthorityCard>,
    /// Cards created from templates that had no card yet.
    pub created: usize,
    /// Existing cards whose derived fields changed.
    pub updated: usize,
    /// Existing cards already up to date.
    pub unchanged: usize,
}

impl ProvisionPlan {
    /// Whether nothing needs writing.
    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty()
    }
}

/// Upsert cards for `faction` in `session_id` from the catalog.
///
/// `existing` are the session's current cards (any faction; others are
/// ignored). Cards whose template disappeared from the catalog are left
/// as they are.
pub fn ensure_authority_cards(
    session_id: SessionId,
    faction: Faction,
    catalog: &CatalogIndex,
    existing: &[AuthorityCard],
) -> ProvisionPlan {
    let mut plan = ProvisionPlan::default();

    for template in catalog.templates_for(faction) {
        let current = existing.iter().find(|c| {
            c.session_id == session_id && c.faction == faction && c.template_id == template.id
        });
        match current {
            Some(card) => {
                let mut refreshed = card.clone();
                if apply_template(&mut refreshed, template, catalog.version()) {
                    plan.updated = plan.updated.saturating_add(1);
                    plan.upserts.push(refreshed);
                } else {
                    plan.unchanged = plan.unchanged.saturating_add(1);
                }
            }
            None => {
                plan.created = plan.created.saturating_add(1);
                plan.upserts
                    .push(derive_card(session_id, faction, template, catalog.version()));
            }
        }
    }

    tracing::debug!(
        %session_id,
        %faction,
        created = plan.created,
        updated = plan.updated,
        unchanged = plan.unchanged,
        "Authority cards reconciled with catalog"
    );
    plan
}

/// Build a fresh, unassigned card from a template.
pub fn derive_card(
    session_id: SessionId,
    faction: Faction,
    template: &CardTemplate,
    catalog_version: &str,
) -> AuthorityCard {
    AuthorityCard {
        id: CardId::new(),
        session_id,
        template_id: template.id.clone(),
        title: template.title.clone(),
        category: template.category.clone(),
        faction,
        scope: template.faction,
        command_codes: template.command_codes.iter().cloned().collect(),
        command_groups: template.command_groups.iter().copied().collect(),
        manual_ref: template.manual_ref.clone(),
        permissions: template.permissions.iter().cloned().collect(),
        catalog_version: catalog_version.to_owned(),
        holder: None,
        assigned_by: None,
        status: CardStatus::Available,
        max_holders: template.max_holders,
        annotations: Annotations::new(),
        version: 0,
    }
}

/// Copy the catalog-owned fields of `template` onto `card`.
///
/// Returns `true` when anything changed.
fn apply_template(card: &mut AuthorityCard, template: &CardTemplate, catalog_version: &str) -> bool {
    let codes: BTreeSet<String> = template.command_codes.iter().cloned().collect();
    let groups: BTreeSet<CapabilityGroup> = template.command_groups.iter().copied().collect();
    let permissions: BTreeSet<String> = template.permissions.iter().cloned().collect();

    let mut changed = false;
    changed |= replace_if_different(&mut card.template_id, &template.id);
    changed |= replace_if_different(&mut card.title, &template.title);
    changed |= replace_if_different(&mut card.category, &template.category);
    changed |= replace_if_different(&mut card.scope, &template.faction);
    changed |= replace_if_different(&mut card.command_codes, &codes);
    changed |= replace_if_different(&mut card.command_groups, &groups);
    changed |= replace_if_different(&mut card.manual_ref, &template.manual_ref);
    changed |= replace_if_different(&mut card.permissions, &permissions);
    changed |= replace_if_different(&mut card.max_holders, &template.max_holders);
    changed |= replace_if_different(&mut card.catalog_version, &catalog_version.to_owned());
    changed
}

fn replace_if_different<T: PartialEq + Clone>(slot: &mut T, value: &T) -> bool {
    if slot == value {
        return false;
    }
    slot.clone_from(value);
    true
}

/// Assign `card` to `actor`.
///
/// `held_cards` are the cards the actor currently holds; they are used to
/// reject a second card from the same template. `requester` is recorded
/// as the card's `assigned_by`.
///
/// # Errors
///
/// - [`AuthorityError::CardUnavailable`] for locked or revoked cards
/// - [`AuthorityError::CardAlreadyAssigned`] when the card has a holder
/// - [`AuthorityError::FactionMismatch`] across factions or sessions
/// - [`AuthorityError::CardLimitExceeded`] when the actor is at the limit
/// - [`AuthorityError::DuplicateCardTemplate`] for a repeated template
pub fn assign_card(
    card: &mut AuthorityCard,
    actor: &mut Actor,
    held_cards: &[AuthorityCard],
    requester: Option<ActorId>,
) -> Result<(), AuthorityError> {
    if matches!(card.status, CardStatus::Locked | CardStatus::Revoked) {
        return Err(AuthorityError::CardUnavailable {
            card: card.id,
            status: card.status,
        });
    }
    if let Some(holder) = card.holder {
        return Err(AuthorityError::CardAlreadyAssigned {
            card: card.id,
            holder,
        });
    }
    if card.faction != actor.faction || card.session_id != actor.session_id {
        return Err(AuthorityError::FactionMismatch {
            card: card.id,
            card_faction: card.faction,
            actor_faction: actor.faction,
        });
    }
    if actor.held_cards.len() >= MAX_CARDS_PER_ACTOR {
        return Err(AuthorityError::CardLimitExceeded {
            actor: actor.id,
            held: actor.held_cards.len(),
            limit: MAX_CARDS_PER_ACTOR,
        });
    }
    let duplicate = held_cards.iter().any(|held| {
        held.id != card.id && held.holder == Some(actor.id) && held.template_id == card.template_id
    });
    if duplicate {
        return Err(AuthorityError::DuplicateCardTemplate {
            actor: actor.id,
            template: card.template_id.clone(),
        });
    }

    card.holder = Some(actor.id);
    card.assigned_by = requester;
    card.status = CardStatus::Assigned;
    actor.held_cards.insert(card.id);

    tracing::info!(
        card = %card.id,
        template = card.template_id,
        actor = %actor.id,
        held = actor.held_cards.len(),
        "Authority card assigned"
    );
    Ok(())
}

/// Release `card` from `actor`.
///
/// # Errors
///
/// Returns [`AuthorityError::NotAuthorized`] when the actor is not the
/// holder.
pub fn release_card(card: &mut AuthorityCard, actor: &mut Actor) -> Result<(), AuthorityError> {
    if card.holder != Some(actor.id) {
        return Err(AuthorityError::NotAuthorized {
            actor: actor.id,
            card: card.id,
        });
    }
    card.holder = None;
    card.assigned_by = None;
    if card.status == CardStatus::Assigned {
        card.status = CardStatus::Available;
    }
    actor.held_cards.remove(&card.id);
    tracing::info!(card = %card.id, actor = %actor.id, "Authority card released");
    Ok(())
}

/// The command set an actor may use through one card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedGrant<'a> {
    /// Card the grant answers to.
    pub card_id: CardId,
    /// Template id, for rank and organization checks.
    pub template_id: &'a str,
    /// Allowed command codes.
    pub command_codes: &'a BTreeSet<String>,
    /// Allowed capability groups.
    pub command_groups: &'a BTreeSet<CapabilityGroup>,
}

impl ResolvedGrant<'_> {
    /// Whether `code` (in `group`, if known) is allowed.
    pub fn allows(&self, code: &str, group: Option<CapabilityGroup>) -> bool {
        self.command_codes.contains(code)
            || group.is_some_and(|g| self.command_groups.contains(&g))
    }
}

/// Resolve what `actor` may do with `card_id`.
///
/// A provisioned card counts only when the actor is its holder; otherwise
/// an intrinsic capability entry with the same card id is used.
///
/// # Errors
///
/// Returns [`AuthorityError::NotAuthorized`] when neither applies.
pub fn resolve_grant<'a>(
    card_id: CardId,
    card: Option<&'a AuthorityCard>,
    actor: &'a Actor,
) -> Result<ResolvedGrant<'a>, AuthorityError> {
    if let Some(card) = card.filter(|c| c.id == card_id && c.holder == Some(actor.id))
        && card.status == CardStatus::Assigned
    {
        return Ok(ResolvedGrant {
            card_id,
            template_id: &card.template_id,
            command_codes: &card.command_codes,
            command_groups: &card.command_groups,
        });
    }
    if let Some(entry) = actor.capability(card_id) {
        return Ok(ResolvedGrant {
            card_id,
            template_id: &entry.template_id,
            command_codes: &entry.command_codes,
            command_groups: &entry.command_groups,
        });
    }
    Err(AuthorityError::NotAuthorized {
        actor: actor.id,
        card: card_id,
    })
}

/// Check the template's rank and organization requirements for `actor`.
///
/// # Errors
///
/// Returns [`AuthorityError::RankTooLow`] or
/// [`AuthorityError::OrganizationMismatch`].
pub fn check_template_requirements(
    template: &CardTemplate,
    actor: &Actor,
) -> Result<(), AuthorityError> {
    if !actor.rank.meets(template.min_rank) {
        return Err(AuthorityError::RankTooLow {
            required: template.min_rank,
            actual: actor.rank,
        });
    }
    if let Some(required) = &template.organization
        && actor.organization.as_ref() != Some(required)
    {
        return Err(AuthorityError::OrganizationMismatch {
            required: required.clone(),
            actual: actor.organization.clone(),
        });
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;

    use strategos_catalog::{CatalogData, CommandsFragment};
    use strategos_types::{CpGauges, FactionScope, Rank};

    use super::*;

    fn template(id: &str, scope: FactionScope) -> CardTemplate {
        CardTemplate {
            id: id.to_owned(),
            title: format!("{id} title"),
            category: "fleet".to_owned(),
            faction: scope,
            command_codes: vec!["fleet_move".to_owned()],
            command_groups: Vec::new(),
            manual_ref: None,
            permissions: Vec::new(),
            min_rank: Rank::Commodore,
            organization: None,
            max_holders: 1,
        }
    }

    fn catalog(version: &str, templates: Vec<CardTemplate>) -> CatalogIndex {
        CatalogIndex::build(CatalogData {
            commands: CommandsFragment {
                version: version.to_owned(),
                commands: BTreeMap::new(),
            },
            authority_cards: templates,
            shortcuts: Vec::new(),
        })
        .unwrap()
    }

    fn actor(session_id: SessionId) -> Actor {
        Actor::new(
            session_id,
            "Yang",
            Faction::Alliance,
            Rank::Admiral,
            CpGauges::new(20, 20),
        )
    }

    fn cards_for(session_id: SessionId, n: usize) -> Vec<AuthorityCard> {
        (0..n)
            .map(|i| {
                derive_card(
                    session_id,
                    Faction::Alliance,
                    &template(&format!("t{i}"), FactionScope::Alliance),
                    "1",
                )
            })
            .collect()
    }

    #[test]
    fn provisioning_creates_then_is_idempotent() {
        let session = SessionId::new();
        let index = catalog(
            "1",
            vec![
                template("alliance_fleet", FactionScope::Alliance),
                template("empire_fleet", FactionScope::Empire),
                template("press", FactionScope::Shared),
            ],
        );

        let first = ensure_authority_cards(session, Faction::Alliance, &index, &[]);
        assert_eq!(first.created, 2);
        assert_eq!(first.upserts.len(), 2);

        let second = ensure_authority_cards(session, Faction::Alliance, &index, &first.upserts);
        assert!(second.is_empty());
        assert_eq!(second.unchanged, 2);
    }

    #[test]
    fn derived_card_matches_template_and_needs_no_rewrite() {
        let session = SessionId::new();
        let mut press = template("press", FactionScope::Shared);
        press.permissions = vec!["broadcast".to_owned()];
        press.max_holders = 3;
        let index = catalog("7", vec![press.clone()]);

        let card = derive_card(session, Faction::Empire, &press, "7");
        assert_eq!(card.template_id, "press");
        assert_eq!(card.faction, Faction::Empire);
        assert_eq!(card.scope, FactionScope::Shared);
        assert!(card.permissions.contains("broadcast"));
        assert_eq!(card.max_holders, 3);
        assert_eq!(card.catalog_version, "7");
        assert_eq!(card.status, CardStatus::Available);

        let plan = ensure_authority_cards(session, Faction::Empire, &index, &[card]);
        assert!(plan.is_empty());
        assert_eq!(plan.unchanged, 1);
    }

    #[test]
    fn catalog_upgrade_keeps_holder() {
        let session = SessionId::new();
        let v1 = catalog("1", vec![template("alliance_fleet", FactionScope::Alliance)]);
        let mut cards = ensure_authority_cards(session, Faction::Alliance, &v1, &[]).upserts;
        let mut yang = actor(session);
        let card = cards.first_mut().unwrap();
        assign_card(card, &mut yang, &[], None).unwrap();
        let card_id = card.id;

        let mut upgraded = template("alliance_fleet", FactionScope::Alliance);
        upgraded.command_codes.push("fleet_attack".to_owned());
        let v2 = catalog("2", vec![upgraded]);
        let plan = ensure_authority_cards(session, Faction::Alliance, &v2, &cards);

        assert_eq!(plan.updated, 1);
        let refreshed = plan.upserts.first().unwrap();
        assert_eq!(refreshed.id, card_id);
        assert_eq!(refreshed.holder, Some(yang.id));
        assert_eq!(refreshed.status, CardStatus::Assigned);
        assert_eq!(refreshed.catalog_version, "2");
        assert!(refreshed.command_codes.contains("fleet_attack"));
    }

    #[test]
    fn sixteenth_card_ok_seventeenth_rejected() {
        let session = SessionId::new();
        let mut yang = actor(session);
        let mut cards = cards_for(session, 17);
        let mut held: Vec<AuthorityCard> = Vec::new();

        for card in cards.iter_mut().take(MAX_CARDS_PER_ACTOR) {
            assign_card(card, &mut yang, &held, None).unwrap();
            held.push(card.clone());
        }
        assert_eq!(yang.held_cards.len(), 16);

        let last = cards.last_mut().unwrap();
        let err = assign_card(last, &mut yang, &held, None).unwrap_err();
        assert!(matches!(
            err,
            AuthorityError::CardLimitExceeded { held: 16, limit: 16, .. }
        ));
        assert!(last.holder.is_none());
    }

    #[test]
    fn second_holder_is_rejected() {
        let session = SessionId::new();
        let mut yang = actor(session);
        let mut other = actor(session);
        let mut card = cards_for(session, 1).remove(0);
        assign_card(&mut card, &mut yang, &[], None).unwrap();
        assert!(matches!(
            assign_card(&mut card, &mut other, &[], None),
            Err(AuthorityError::CardAlreadyAssigned { .. })
        ));
    }

    #[test]
    fn duplicate_template_is_rejected() {
        let session = SessionId::new();
        let mut yang = actor(session);
        let tpl = template("staff", FactionScope::Alliance);
        let mut a = derive_card(session, Faction::Alliance, &tpl, "1");
        let mut b = derive_card(session, Faction::Alliance, &tpl, "1");
        assign_card(&mut a, &mut yang, &[], None).unwrap();
        assert!(matches!(
            assign_card(&mut b, &mut yang, std::slice::from_ref(&a), None),
            Err(AuthorityError::DuplicateCardTemplate { .. })
        ));
    }

    #[test]
    fn locked_and_foreign_cards_are_rejected() {
        let session = SessionId::new();
        let mut yang = actor(session);
        let mut locked = cards_for(session, 1).remove(0);
        locked.status = CardStatus::Locked;
        assert!(matches!(
            assign_card(&mut locked, &mut yang, &[], None),
            Err(AuthorityError::CardUnavailable { .. })
        ));

        let mut imperial = derive_card(
            session,
            Faction::Empire,
            &template("imperial", FactionScope::Empire),
            "1",
        );
        assert!(matches!(
            assign_card(&mut imperial, &mut yang, &[], None),
            Err(AuthorityError::FactionMismatch { .. })
        ));
    }

    #[test]
    fn release_reverses_assignment() {
        let session = SessionId::new();
        let mut yang = actor(session);
        let mut other = actor(session);
        let mut card = cards_for(session, 1).remove(0);
        let requester = Some(other.id);
        assign_card(&mut card, &mut yang, &[], requester).unwrap();
        assert_eq!(card.assigned_by, requester);

        assert!(release_card(&mut card, &mut other).is_err());
        release_card(&mut card, &mut yang).unwrap();
        assert!(card.holder.is_none());
        assert_eq!(card.status, CardStatus::Available);
        assert!(yang.held_cards.is_empty());
        assign_card(&mut card, &mut other, &[], None).unwrap();
    }

    #[test]
    fn grant_resolves_from_card_or_intrinsic_entry() {
        let session = SessionId::new();
        let mut yang = actor(session);
        let mut card = cards_for(session, 1).remove(0);

        assert!(resolve_grant(card.id, Some(&card), &yang).is_err());
        assign_card(&mut card, &mut yang, &[], None).unwrap();
        let grant = resolve_grant(card.id, Some(&card), &yang).unwrap();
        assert!(grant.allows("fleet_move", None));
        assert!(!grant.allows("fleet_attack", Some(CapabilityGroup::Tactical)));

        let intrinsic_id = CardId::new();
        yang.capabilities.push(strategos_types::CapabilityEntry {
            card_id: intrinsic_id,
            template_id: "t0".to_owned(),
            command_codes: BTreeSet::new(),
            command_groups: [CapabilityGroup::Tactical].into_iter().collect(),
        });
        let grant = resolve_grant(intrinsic_id, None, &yang).unwrap();
        assert!(grant.allows("fleet_attack", Some(CapabilityGroup::Tactical)));
    }

    #[test]
    fn rank_and_organization_requirements() {
        let session = SessionId::new();
        let mut yang = actor(session);
        let mut tpl = template("staff", FactionScope::Alliance);
        assert!(check_template_requirements(&tpl, &yang).is_ok());

        yang.rank = Rank::Captain;
        assert!(matches!(
            check_template_requirements(&tpl, &yang),
            Err(AuthorityError::RankTooLow { .. })
        ));

        yang.rank = Rank::Admiral;
        tpl.organization = Some("thirteenth_fleet".to_owned());
        assert!(matches!(
            check_template_requirements(&tpl, &yang),
            Err(AuthorityError::OrganizationMismatch { .. })
        ));
        yang.organization = Some("thirteenth_fleet".to_owned());
        assert!(check_template_requirements(&tpl, &yang).is_ok());
    }
}
