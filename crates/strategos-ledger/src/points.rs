//! Cost application with cross-pool substitution.
//!
//! For each pool a cost requests:
//!
//! 1. If the pool's balance covers the amount, subtract it directly.
//! 2. Otherwise the deficit (`amount - balance`) must be covered by the
//!    other pool at [`SUBSTITUTION_RATE`] units per deficit unit. If the
//!    other pool is short, the whole cost fails and nothing changes.
//! 3. On success the requesting pool is zeroed and the converted amount
//!    is subtracted from the other pool.
//!
//! Political is settled before military. Gauges are `u32`, so they can
//! never go negative; all arithmetic is checked.

use strategos_types::{CpCost, CpGauges, CpPool, ErrorKind};

/// Units of the other pool consumed per unit of deficit.
pub const SUBSTITUTION_RATE: u32 = 2;

/// Errors from cost application.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PointsError {
    /// Neither the direct balance nor substitution covers the cost.
    #[error(
        "insufficient {pool:?} command points: need {required}, have {available}; \
         substitution needs {substitute_needed} {other:?} points, have {substitute_available}"
    )]
    InsufficientPoints {
        /// Pool that could not be covered.
        pool: CpPool,
        /// Amount requested from `pool`.
        required: u32,
        /// Balance of `pool` at the time of the check.
        available: u32,
        /// The substituting pool.
        other: CpPool,
        /// Units of `other` that substitution would need.
        substitute_needed: u64,
        /// Balance of `other` at the time of the check.
        substitute_available: u32,
    },
}

impl PointsError {
    /// Taxonomy category of this error.
    pub const fn kind(&self) -> ErrorKind {
        ErrorKind::Economy
    }
}

/// Result of a successful cost application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CostReceipt {
    /// Whether any part of the cost used cross-pool substitution.
    pub substituted: bool,
    /// Political points actually removed.
    pub political_spent: u32,
    /// Military points actually removed.
    pub military_spent: u32,
}

impl CostReceipt {
    /// Total points removed across both pools.
    pub fn total_spent(&self) -> u64 {
        u64::from(self.political_spent).saturating_add(u64::from(self.military_spent))
    }
}

/// Compute the gauges that would result from applying `cost`, without
/// touching the input.
///
/// # Errors
///
/// Returns [`PointsError::InsufficientPoints`] when a pool cannot be
/// covered even with substitution.
pub fn quote(gauges: &CpGauges, cost: &CpCost) -> Result<(CpGauges, CostReceipt), PointsError> {
    let mut next = *gauges;
    let mut receipt = CostReceipt::default();

    for pool in [CpPool::Political, CpPool::Military] {
        let amount = cost.amount(pool);
        if amount == 0 {
            continue;
        }
        settle_pool(&mut next, pool, amount, &mut receipt)?;
    }

    Ok((next, receipt))
}

/// Apply `cost` to `gauges` in place.
///
/// A zero cost always succeeds with `substituted == false`. On failure the
/// gauges are left unchanged.
///
/// # Errors
///
/// Returns [`PointsError::InsufficientPoints`] when a pool cannot be
/// covered even with substitution.
pub fn apply_cost(gauges: &mut CpGauges, cost: &CpCost) -> Result<CostReceipt, PointsError> {
    let (next, receipt) = quote(gauges, cost)?;
    *gauges = next;
    if receipt.substituted {
        tracing::debug!(
            political_spent = receipt.political_spent,
            military_spent = receipt.military_spent,
            "Command cost settled with substitution"
        );
    }
    Ok(receipt)
}

/// Whether `cost` could be applied to `gauges`.
pub fn can_afford(gauges: &CpGauges, cost: &CpCost) -> bool {
    quote(gauges, cost).is_ok()
}

/// Settle one pool's share of a cost against `gauges`.
fn settle_pool(
    gauges: &mut CpGauges,
    pool: CpPool,
    amount: u32,
    receipt: &mut CostReceipt,
) -> Result<(), PointsError> {
    let balance = gauges.get(pool);
    if let Some(remaining) = balance.checked_sub(amount) {
        *gauges.get_mut(pool) = remaining;
        add_spent(receipt, pool, amount);
        return Ok(());
    }

    let other = pool.other();
    let deficit = amount.saturating_sub(balance);
    let needed = u64::from(deficit).saturating_mul(u64::from(SUBSTITUTION_RATE));
    let other_balance = gauges.get(other);

    let insufficient = || PointsError::InsufficientPoints {
        pool,
        required: amount,
        available: balance,
        other,
        substitute_needed: needed,
        substitute_available: other_balance,
    };

    let needed_u32 = u32::try_from(needed).map_err(|_err| insufficient())?;
    let other_remaining = other_balance
        .checked_sub(needed_u32)
        .ok_or_else(insufficient)?;

    *gauges.get_mut(pool) = 0;
    *gauges.get_mut(other) = other_remaining;
    add_spent(receipt, pool, balance);
    add_spent(receipt, other, needed_u32);
    receipt.substituted = true;
    Ok(())
}

fn add_spent(receipt: &mut CostReceipt, pool: CpPool, amount: u32) {
    match pool {
        CpPool::Political => {
            receipt.political_spent = receipt.political_spent.saturating_add(amount);
        }
        CpPool::Military => {
            receipt.military_spent = receipt.military_spent.saturating_add(amount);
        }
    }
}
