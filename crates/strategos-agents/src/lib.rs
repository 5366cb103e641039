//! Authority cards, operations, and command dispatch for the Strategos
//! simulation core.
//!
//! Everything in this crate is synchronous and storage-agnostic: functions
//! take records by reference, validate, and mutate them in place. The
//! service layer in `strategos-core` loads and persists the records.
//!
//! # Modules
//!
//! - [`authority`] -- Card provisioning, assignment, and eligibility
//! - [`capability`] -- The interface command handlers see of an actor
//! - [`operation`] -- Operation lifecycle state machine
//! - [`dispatch`] -- Command authorization and routing
//! - [`handlers`] -- Stock strategic and tactical handlers
//! - [`error`] -- Error types

pub mod authority;
pub mod capability;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod operation;

pub use authority::{
    MAX_CARDS_PER_ACTOR, ProvisionPlan, ResolvedGrant, assign_card, check_template_requirements,
    derive_card, ensure_authority_cards, release_card, resolve_grant,
};
pub use capability::{ActorAdapter, CommandCapable};
pub use dispatch::{
    CommandOutcome, CommandRequest, Dispatcher, HandlerOutcome, HandlerRegistry,
    StrategicContext, StrategicHandler, TacticalHandler,
};
pub use error::{AuthorityError, DispatchError, OperationError};
pub use handlers::{CatalogCostHandler, ORDER_QUEUE_CAPACITY, OrderQueue, OrderQueueHandler, TacticalOrder};
pub use operation::{
    MAX_UNIT_BATCH, OPERATION_CEILING_HOURS, OperationDraft, abort, advance, completion_due,
    create_operation, issue, start_due,
};
