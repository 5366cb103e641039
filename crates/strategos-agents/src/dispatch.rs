//! Command execution: authorize, charge, and route to a handler.
//!
//! The dispatcher is handler-agnostic. Tactical commands are charged by
//! the dispatcher at the catalog figure and then handed to a real-time
//! handler keyed by command code. Every other group goes to a strategic
//! handler, which checks its own precondition and may consume a variable,
//! data-dependent amount; the dispatcher reports what was actually spent
//! from the before/after gauge delta.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strategos_catalog::{CatalogIndex, CommandEntry};
use strategos_ledger::{CostReceipt, PointsError};
use strategos_types::{Actor, AuthorityCard, CardId, CpCost, SessionId, UnitId};

use crate::authority::{check_template_requirements, resolve_grant};
use crate::capability::{ActorAdapter, CommandCapable};
use crate::error::{AuthorityError, DispatchError};
use crate::handlers::CatalogCostHandler;

/// What a handler reports back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerOutcome {
    /// Whether the command took effect.
    pub success: bool,
    /// Human-readable result.
    pub message: String,
}

impl HandlerOutcome {
    /// A successful outcome.
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    /// A failed outcome.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Real-time handler for one tactical command code.
pub trait TacticalHandler: Send + Sync {
    /// Execute against a single unit.
    fn execute_tactical(&self, unit_id: UnitId, params: &serde_json::Value) -> HandlerOutcome;
}

/// Everything a strategic handler may see while executing.
pub struct StrategicContext<'a> {
    /// Session the command runs in.
    pub session_id: SessionId,
    /// Command code being executed.
    pub command_code: &'a str,
    /// Catalog metadata for the command.
    pub command: &'a CommandEntry,
    /// Caller-supplied arguments.
    pub args: &'a serde_json::Value,
    /// The issuer.
    pub actor: &'a mut dyn CommandCapable,
    substituted: bool,
}

impl<'a> StrategicContext<'a> {
    /// Build a context around `actor`.
    pub fn new(
        session_id: SessionId,
        command_code: &'a str,
        command: &'a CommandEntry,
        args: &'a serde_json::Value,
        actor: &'a mut dyn CommandCapable,
    ) -> Self {
        Self {
            session_id,
            command_code,
            command,
            args,
            actor,
            substituted: false,
        }
    }

    /// Charge `cost` to the issuer, remembering whether substitution
    /// was needed.
    ///
    /// # Errors
    ///
    /// Returns [`PointsError::InsufficientPoints`] with the gauges
    /// unchanged.
    pub fn charge(&mut self, cost: &CpCost) -> Result<CostReceipt, PointsError> {
        let receipt = self.actor.consume_points(cost)?;
        self.substituted |= receipt.substituted;
        Ok(receipt)
    }

    /// Whether any charge so far used substitution.
    pub const fn substituted(&self) -> bool {
        self.substituted
    }
}

/// Handler for non-tactical commands.
pub trait StrategicHandler: Send + Sync {
    /// Refuse the command before anything is charged.
    ///
    /// # Errors
    ///
    /// [`DispatchError::PreconditionFailed`] for a handler-specific
    /// refusal, or [`DispatchError::Points`] when the issuer cannot pay.
    fn check_precondition(&self, ctx: &StrategicContext<'_>) -> Result<(), DispatchError>;

    /// Execute the command, charging the issuer through the context.
    fn execute(&self, ctx: &mut StrategicContext<'_>) -> HandlerOutcome;
}

/// Handlers keyed by command code, with a generic strategic fallback.
#[derive(Clone)]
pub struct HandlerRegistry {
    tactical: HashMap<String, Arc<dyn TacticalHandler>>,
    strategic: HashMap<String, Arc<dyn StrategicHandler>>,
    fallback: Arc<dyn StrategicHandler>,
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new(Arc::new(CatalogCostHandler))
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("tactical", &self.tactical.keys().collect::<Vec<_>>())
            .field("strategic", &self.strategic.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl HandlerRegistry {
    /// Registry with `fallback` as the generic strategic handler.
    pub fn new(fallback: Arc<dyn StrategicHandler>) -> Self {
        Self {
            tactical: HashMap::new(),
            strategic: HashMap::new(),
            fallback,
        }
    }

    /// Register the tactical handler for `code`.
    pub fn register_tactical(&mut self, code: impl Into<String>, handler: Arc<dyn TacticalHandler>) {
        self.tactical.insert(code.into(), handler);
    }

    /// Register a dedicated strategic handler for `code`.
    pub fn register_strategic(
        &mut self,
        code: impl Into<String>,
        handler: Arc<dyn StrategicHandler>,
    ) {
        self.strategic.insert(code.into(), handler);
    }

    /// Tactical handler for `code`, if any.
    pub fn tactical(&self, code: &str) -> Option<&Arc<dyn TacticalHandler>> {
        self.tactical.get(code)
    }

    /// Strategic handler for `code`, falling back to the generic one.
    pub fn strategic(&self, code: &str) -> &Arc<dyn StrategicHandler> {
        self.strategic.get(code).unwrap_or(&self.fallback)
    }
}

/// One inbound command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRequest {
    /// Card the command is issued under.
    pub card_id: CardId,
    /// Catalog command code.
    pub command_code: String,
    /// Target unit, required for tactical commands.
    #[serde(default)]
    pub unit_id: Option<UnitId>,
    /// Handler arguments.
    #[serde(default)]
    pub args: serde_json::Value,
}

/// Result of a dispatched command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutcome {
    /// Whether the handler reported success.
    pub success: bool,
    /// Handler message.
    pub message: String,
    /// Command points actually removed, when any were.
    pub cp_spent: Option<u64>,
    /// Whether payment used cross-pool substitution.
    pub substituted: bool,
}

/// Authorizes, charges, and routes commands.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    catalog: Arc<CatalogIndex>,
    handlers: HandlerRegistry,
}

impl Dispatcher {
    /// Create a dispatcher over an immutable catalog.
    pub const fn new(catalog: Arc<CatalogIndex>, handlers: HandlerRegistry) -> Self {
        Self { catalog, handlers }
    }

    /// The catalog commands are checked against.
    pub fn catalog(&self) -> &CatalogIndex {
        &self.catalog
    }

    /// Execute `request` for `actor`.
    ///
    /// `card` is the provisioned card named by the request, if one exists;
    /// otherwise the actor's intrinsic capability entries are consulted.
    /// Nothing is charged until every check passes.
    ///
    /// # Errors
    ///
    /// Authorization, unknown-command, missing-handler, precondition, and
    /// payment failures. A handler that runs and reports failure is not an
    /// error; its outcome carries `success == false`.
    pub fn execute(
        &self,
        actor: &mut Actor,
        card: Option<&AuthorityCard>,
        request: &CommandRequest,
    ) -> Result<CommandOutcome, DispatchError> {
        let code = request.command_code.as_str();
        let entry = self.authorize(actor, card, request)?;
        let session_id = actor.session_id;

        if entry.group.is_tactical() {
            let handler = self
                .handlers
                .tactical(code)
                .ok_or_else(|| DispatchError::NoTacticalHandler(code.to_owned()))?;
            let unit_id = request
                .unit_id
                .ok_or_else(|| DispatchError::MissingUnit(code.to_owned()))?;

            let receipt = ActorAdapter::new(actor).consume_points(&entry.cost())?;
            let outcome = handler.execute_tactical(unit_id, &request.args);
            tracing::info!(
                %session_id,
                code,
                %unit_id,
                success = outcome.success,
                cp_spent = receipt.total_spent(),
                "Tactical command dispatched"
            );
            return Ok(CommandOutcome {
                success: outcome.success,
                message: outcome.message,
                cp_spent: spent(receipt.total_spent()),
                substituted: receipt.substituted,
            });
        }

        let handler = self.handlers.strategic(code);
        let mut adapter = ActorAdapter::new(actor);
        let before = adapter.gauges().total();
        let mut ctx = StrategicContext::new(session_id, code, entry, &request.args, &mut adapter);
        handler.check_precondition(&ctx)?;
        let outcome = handler.execute(&mut ctx);
        let substituted = ctx.substituted();
        let after = adapter.gauges().total();
        let cp_spent = before.saturating_sub(after);

        tracing::info!(
            %session_id,
            code,
            success = outcome.success,
            cp_spent,
            "Strategic command dispatched"
        );
        Ok(CommandOutcome {
            success: outcome.success,
            message: outcome.message,
            cp_spent: spent(cp_spent),
            substituted,
        })
    }

    /// Resolve the grant, command entry, and template requirements.
    fn authorize<'c>(
        &'c self,
        actor: &Actor,
        card: Option<&AuthorityCard>,
        request: &CommandRequest,
    ) -> Result<&'c CommandEntry, DispatchError> {
        let code = request.command_code.as_str();
        let grant = resolve_grant(request.card_id, card, actor)?;

        if !grant.allows(code, self.catalog.group_of(code)) {
            return Err(AuthorityError::CommandNotAllowed {
                code: code.to_owned(),
                card: grant.card_id,
            }
            .into());
        }

        let entry = self
            .catalog
            .command(code)
            .ok_or_else(|| DispatchError::UnknownCommand(code.to_owned()))?;

        let template = self
            .catalog
            .template(grant.template_id)
            .ok_or_else(|| AuthorityError::UnknownTemplate(grant.template_id.to_owned()))?;
        check_template_requirements(template, actor)?;

        Ok(entry)
    }
}

const fn spent(total: u64) -> Option<u64> {
    if total == 0 { None } else { Some(total) }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};
    use std::sync::Mutex;

    use strategos_catalog::{CardTemplate, CatalogData, CommandsFragment};
    use strategos_types::{
        CapabilityEntry, CapabilityGroup, CpGauges, CpPool, Faction, FactionScope, Rank,
    };

    use super::*;
    use crate::authority::{assign_card, derive_card};

    #[derive(Default)]
    struct RecordingTactical {
        calls: Mutex<Vec<UnitId>>,
    }

    impl TacticalHandler for RecordingTactical {
        fn execute_tactical(&self, unit_id: UnitId, _params: &serde_json::Value) -> HandlerOutcome {
            self.calls.lock().unwrap().push(unit_id);
            HandlerOutcome::ok("engaged")
        }
    }

    /// Consumes a data-dependent amount on top of the catalog figure.
    struct Levy;

    impl StrategicHandler for Levy {
        fn check_precondition(&self, ctx: &StrategicContext<'_>) -> Result<(), DispatchError> {
            if ctx.actor.rank().meets(Rank::ViceAdmiral) {
                Ok(())
            } else {
                Err(DispatchError::PreconditionFailed("rank too low to levy".to_owned()))
            }
        }

        fn execute(&self, ctx: &mut StrategicContext<'_>) -> HandlerOutcome {
            let extra = ctx
                .args
                .get("extra")
                .and_then(serde_json::Value::as_u64)
                .and_then(|v| u32::try_from(v).ok())
                .unwrap_or(0);
            let cost = CpCost {
                political: Some(ctx.command.cost().amount(CpPool::Political).saturating_add(extra)),
                military: None,
            };
            match ctx.charge(&cost) {
                Ok(_) => HandlerOutcome::ok("levied"),
                Err(e) => HandlerOutcome::failed(e.to_string()),
            }
        }
    }

    fn command(group: CapabilityGroup, pool: CpPool, cost: u32) -> CommandEntry {
        CommandEntry {
            group,
            cp_type: Some(pool),
            cp_cost: Some(cost),
            label: String::new(),
            manual_ref: None,
            wait_hours: 0,
            execution_hours: 0,
        }
    }

    fn catalog() -> Arc<CatalogIndex> {
        let mut commands = BTreeMap::new();
        commands.insert(
            "fleet_attack".to_owned(),
            command(CapabilityGroup::Tactical, CpPool::Military, 3),
        );
        commands.insert(
            "levy".to_owned(),
            command(CapabilityGroup::Politics, CpPool::Political, 2),
        );
        commands.insert(
            "promote".to_owned(),
            command(CapabilityGroup::Personnel, CpPool::Political, 1),
        );
        let template = CardTemplate {
            id: "fleet_commander".to_owned(),
            title: "Fleet Commander".to_owned(),
            category: "fleet".to_owned(),
            faction: FactionScope::Shared,
            command_codes: vec!["levy".to_owned(), "ghost".to_owned()],
            command_groups: vec![CapabilityGroup::Tactical],
            manual_ref: None,
            permissions: Vec::new(),
            min_rank: Rank::Commodore,
            organization: None,
            max_holders: 1,
        };
        Arc::new(
            CatalogIndex::build(CatalogData {
                commands: CommandsFragment {
                    version: "1".to_owned(),
                    commands,
                },
                authority_cards: vec![template],
                shortcuts: Vec::new(),
            })
            .unwrap(),
        )
    }

    fn setup() -> (Dispatcher, Arc<RecordingTactical>, Actor, AuthorityCard) {
        let catalog = catalog();
        let tactical = Arc::new(RecordingTactical::default());
        let mut handlers = HandlerRegistry::default();
        handlers.register_tactical("fleet_attack", tactical.clone());
        handlers.register_strategic("levy", Arc::new(Levy));

        let mut actor = Actor::new(
            strategos_types::SessionId::new(),
            "Mittermeyer",
            Faction::Empire,
            Rank::Admiral,
            CpGauges::new(10, 2),
        );
        let template = catalog.template("fleet_commander").unwrap().clone();
        let mut card = derive_card(actor.session_id, Faction::Empire, &template, "1");
        assign_card(&mut card, &mut actor, &[], None).unwrap();
        (Dispatcher::new(catalog, handlers), tactical, actor, card)
    }

    fn request(card_id: CardId, code: &str) -> CommandRequest {
        CommandRequest {
            card_id,
            command_code: code.to_owned(),
            unit_id: Some(UnitId::new()),
            args: serde_json::json!({}),
        }
    }

    #[test]
    fn tactical_command_charges_then_calls_handler() {
        let (dispatcher, tactical, mut actor, card) = setup();
        let outcome = dispatcher
            .execute(&mut actor, Some(&card), &request(card.id, "fleet_attack"))
            .unwrap();
        assert!(outcome.success);
        assert!(outcome.substituted);
        assert_eq!(outcome.cp_spent, Some(4));
        assert_eq!(actor.gauges, CpGauges::new(8, 0));
        assert_eq!(tactical.calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn strategic_spend_is_measured_from_gauges() {
        let (dispatcher, _, mut actor, card) = setup();
        let mut req = request(card.id, "levy");
        req.args = serde_json::json!({ "extra": 5 });
        let outcome = dispatcher.execute(&mut actor, Some(&card), &req).unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.cp_spent, Some(7));
        assert_eq!(actor.gauges, CpGauges::new(3, 2));
    }

    #[test]
    fn strategic_precondition_refuses_without_charging() {
        let (dispatcher, _, mut actor, card) = setup();
        actor.rank = Rank::Commodore;
        let err = dispatcher
            .execute(&mut actor, Some(&card), &request(card.id, "levy"))
            .unwrap_err();
        assert!(matches!(err, DispatchError::PreconditionFailed(_)));
        assert_eq!(actor.gauges, CpGauges::new(10, 2));
    }

    #[test]
    fn authorization_failures_are_typed() {
        let (dispatcher, _, mut actor, card) = setup();

        let err = dispatcher
            .execute(&mut actor, None, &request(CardId::new(), "levy"))
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Authority(AuthorityError::NotAuthorized { .. })
        ));

        let err = dispatcher
            .execute(&mut actor, Some(&card), &request(card.id, "promote"))
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Authority(AuthorityError::CommandNotAllowed { .. })
        ));

        let err = dispatcher
            .execute(&mut actor, Some(&card), &request(card.id, "ghost"))
            .unwrap_err();
        assert!(matches!(err, DispatchError::UnknownCommand(_)));

        actor.rank = Rank::Captain;
        let err = dispatcher
            .execute(&mut actor, Some(&card), &request(card.id, "fleet_attack"))
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Authority(AuthorityError::RankTooLow { .. })
        ));
        assert_eq!(actor.gauges, CpGauges::new(10, 2));
    }

    #[test]
    fn intrinsic_entry_authorizes_without_a_card() {
        let (dispatcher, _, mut actor, _) = setup();
        let intrinsic = CardId::new();
        actor.capabilities.push(CapabilityEntry {
            card_id: intrinsic,
            template_id: "fleet_commander".to_owned(),
            command_codes: ["promote".to_owned()].into_iter().collect(),
            command_groups: BTreeSet::new(),
        });
        let outcome = dispatcher
            .execute(&mut actor, None, &request(intrinsic, "promote"))
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.cp_spent, Some(1));
    }

    #[test]
    fn tactical_without_unit_or_handler_is_rejected() {
        let (dispatcher, _, mut actor, card) = setup();
        let mut req = request(card.id, "fleet_attack");
        req.unit_id = None;
        assert!(matches!(
            dispatcher.execute(&mut actor, Some(&card), &req),
            Err(DispatchError::MissingUnit(_))
        ));

        let bare = Dispatcher::new(dispatcher.catalog.clone(), HandlerRegistry::default());
        assert!(matches!(
            bare.execute(&mut actor, Some(&card), &request(card.id, "fleet_attack")),
            Err(DispatchError::NoTacticalHandler(_))
        ));
        assert_eq!(actor.gauges, CpGauges::new(10, 2));
    }
}
