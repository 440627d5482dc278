//! Provisioning orchestration and expiry reconciliation.
//!
//! This crate ties the device layer to the subscription ledger:
//!
//! - [`Provisioner`] — enrollment flow: account, peer, config record,
//!   subscription window, with one-identity-per-account conflict checks
//! - [`Reconciler`] — the periodic sweep that drives expired subscriptions
//!   to the blocked state, isolating failures per item
//! - [`SweepSchedule`] — runs one sweep at startup and then on a fixed
//!   cadence, with an injectable [`Clock`]
//!
//! The front-end (bot, CLI, HTTP — whatever collects requests) calls these
//! in-process; nothing here listens on the network.

#![forbid(unsafe_code)]

pub mod clock;
pub mod error;
pub mod provision;
pub mod schedule;
pub mod sweep;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Result, ServiceError};
pub use provision::{Enrollment, Provisioner};
pub use schedule::SweepSchedule;
pub use sweep::{BlockedPeer, Reconciler, SweepReport};
