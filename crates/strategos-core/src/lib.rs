//! Session clocks, the tick scheduler, victory evaluation, and the
//! storage-backed services for the Strategos simulation core.
//!
//! The scheduler drives every active session's clock on a fixed cadence.
//! One pass advances each clock, moves due operations through their
//! lifecycle, evaluates victory, and persists the results. A failure in
//! one session is contained to that session and raised as an alert.
//!
//! # Modules
//!
//! - [`alerts`] -- Operational alerts with rate limiting and pluggable sinks.
//! - [`clock`] -- Per-session game clocks and loop statistics.
//! - [`config`] -- Configuration loading from `strategos-config.yaml`.
//! - [`scheduler`] -- The tick loop over all active sessions.
//! - [`service`] -- Command, card, operation, and session services.
//! - [`storage`] -- The [`Store`] trait and an in-memory implementation.
//! - [`victory`] -- Pure victory evaluation.
//!
//! [`Store`]: storage::Store

pub mod alerts;
pub mod clock;
pub mod config;
pub mod scheduler;
pub mod service;
pub mod storage;
pub mod victory;
