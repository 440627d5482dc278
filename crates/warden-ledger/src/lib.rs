//! Subscription ledger boundary for tunnelwarden.
//!
//! The core reads and writes accounts, subscription windows, config records
//! and audit events through the [`SubscriptionLedger`] trait. The shipped
//! [`MemoryLedger`] keeps everything in memory with JSON snapshots on disk;
//! a relational implementation can replace it behind the same trait.
//!
//! Audit events are write-once and append-only. Every appended event also
//! flows through an [`AuditSink`] so deployments get structured log output
//! without reading the ledger back.

#![forbid(unsafe_code)]

pub mod audit;
pub mod error;
pub mod ledger;
pub mod types;

pub use audit::{AuditEvent, AuditKind, AuditSink, RecordingAuditSink, TracingAuditSink};
pub use error::{LedgerError, Result};
pub use ledger::{MemoryLedger, SubscriptionLedger};
pub use types::{
    Account, AccountId, ConfigRecord, ExpiredEntry, NewConfig, Subscription, SubscriptionUpdate,
};
