//! Command-point economy for the Strategos simulation core.
//!
//! Every actor carries two command-point gauges, political and military.
//! Commands are priced in one or both pools. When a pool cannot cover its
//! share, the deficit is converted from the other pool at a fixed
//! exchange rate.
//!
//! # Modules
//!
//! - [`points`] -- Cost application with cross-pool substitution

pub mod points;

pub use points::{CostReceipt, PointsError, SUBSTITUTION_RATE, apply_cost, can_afford, quote};
