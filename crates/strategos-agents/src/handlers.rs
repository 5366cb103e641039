//! Stock command handlers.
//!
//! [`CatalogCostHandler`] is the generic strategic handler: it charges the
//! catalog cost once per requested `quantity`. [`OrderQueue`] hands
//! tactical commands off to a real-time consumer over a bounded channel.

use serde::{Deserialize, Serialize};
use strategos_ledger::quote;
use strategos_types::UnitId;
use tokio::sync::mpsc;

use crate::dispatch::{HandlerOutcome, StrategicContext, StrategicHandler, TacticalHandler};
use crate::error::DispatchError;

/// Pending tactical orders a consumer may lag behind before new ones are
/// refused.
pub const ORDER_QUEUE_CAPACITY: usize = 1024;

/// Generic strategic handler charging `catalog cost × quantity`.
///
/// `quantity` is read from the command arguments and defaults to 1.
#[derive(Debug, Clone, Copy, Default)]
pub struct CatalogCostHandler;

impl CatalogCostHandler {
    fn quantity(args: &serde_json::Value) -> Result<u32, String> {
        match args.get("quantity") {
            None | Some(serde_json::Value::Null) => Ok(1),
            Some(value) => value
                .as_u64()
                .and_then(|q| u32::try_from(q).ok())
                .filter(|q| *q > 0)
                .ok_or_else(|| format!("quantity must be a positive integer, got {value}")),
        }
    }
}

impl StrategicHandler for CatalogCostHandler {
    fn check_precondition(&self, ctx: &StrategicContext<'_>) -> Result<(), DispatchError> {
        let quantity = Self::quantity(ctx.args).map_err(DispatchError::PreconditionFailed)?;
        let cost = ctx.command.cost().scaled(quantity);
        quote(&ctx.actor.gauges(), &cost)?;
        Ok(())
    }

    fn execute(&self, ctx: &mut StrategicContext<'_>) -> HandlerOutcome {
        let quantity = Self::quantity(ctx.args).unwrap_or(1);
        let cost = ctx.command.cost().scaled(quantity);
        match ctx.charge(&cost) {
            Ok(_) => HandlerOutcome::ok(format!("{} x{quantity} executed", ctx.command.label)),
            Err(e) => HandlerOutcome::failed(e.to_string()),
        }
    }
}

/// A tactical command waiting for the real-time layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TacticalOrder {
    /// Command code.
    pub command_code: String,
    /// Target unit.
    pub unit_id: UnitId,
    /// Handler arguments.
    pub params: serde_json::Value,
}

/// Sending half of the tactical order channel.
#[derive(Debug, Clone)]
pub struct OrderQueue {
    tx: mpsc::Sender<TacticalOrder>,
}

impl OrderQueue {
    /// Create the queue and the receiver its consumer drains.
    pub fn channel() -> (Self, mpsc::Receiver<TacticalOrder>) {
        let (tx, rx) = mpsc::channel(ORDER_QUEUE_CAPACITY);
        (Self { tx }, rx)
    }

    /// Tactical handler that enqueues orders for `command_code`.
    pub fn handler_for(&self, command_code: impl Into<String>) -> OrderQueueHandler {
        OrderQueueHandler {
            command_code: command_code.into(),
            queue: self.clone(),
        }
    }
}

/// [`TacticalHandler`] that forwards to an [`OrderQueue`].
#[derive(Debug, Clone)]
pub struct OrderQueueHandler {
    command_code: String,
    queue: OrderQueue,
}

impl TacticalHandler for OrderQueueHandler {
    fn execute_tactical(&self, unit_id: UnitId, params: &serde_json::Value) -> HandlerOutcome {
        let order = TacticalOrder {
            command_code: self.command_code.clone(),
            unit_id,
            params: params.clone(),
        };
        match self.queue.tx.try_send(order) {
            Ok(()) => HandlerOutcome::ok(format!("{} queued for {unit_id}", self.command_code)),
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(code = self.command_code, %unit_id, "Tactical order queue full");
                HandlerOutcome::failed("tactical order queue is full")
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                HandlerOutcome::failed("tactical order consumer is not running")
            }
        }
    }
}
