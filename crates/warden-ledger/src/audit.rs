//! Audit events and sinks.
//!
//! Every security- or billing-relevant action appends one event: account id,
//! kind, optional target, structured detail payload, timestamp. Events are
//! never mutated. Sinks route appended events into the `tracing`
//! infrastructure (or capture them for tests).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::AccountId;

/// The kinds of audit event the core emits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditKind {
    /// A new account was created for an external id.
    AccountCreated,
    /// A client config was recorded for an account.
    ConfigCreated,
    /// A subscription window was created.
    SubscriptionCreated,
    /// A subscription window was extended or disabled.
    SubscriptionUpdated,
    /// The scheduled sweep blocked an expired client's access.
    AccessBlockedScheduled,
    /// The scheduled sweep failed to block an expired client's access.
    AccessBlockFailed,
}

impl AuditKind {
    /// The stable wire string for this kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AccountCreated => "ACCOUNT_CREATED",
            Self::ConfigCreated => "CONFIG_CREATED",
            Self::SubscriptionCreated => "SUBSCRIPTION_CREATED",
            Self::SubscriptionUpdated => "SUBSCRIPTION_UPDATED",
            Self::AccessBlockedScheduled => "ACCESS_BLOCKED_SCHEDULED",
            Self::AccessBlockFailed => "ACCESS_BLOCK_FAILED",
        }
    }
}

impl std::fmt::Display for AuditKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single append-only audit record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event id.
    pub id: Uuid,
    /// The account the event concerns.
    pub account_id: AccountId,
    /// Event kind.
    pub kind: AuditKind,
    /// Optional target id (e.g. a subscription id).
    pub target_id: Option<i64>,
    /// Optional target type (e.g. `subscriptions`, `configs`).
    pub target_type: Option<String>,
    /// Structured detail payload.
    pub detail: serde_json::Value,
    /// When the event happened.
    pub at: DateTime<Utc>,
}

impl AuditEvent {
    /// Creates an event with a fresh id at the given time.
    #[must_use]
    pub fn new(account_id: AccountId, kind: AuditKind, at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id,
            kind,
            target_id: None,
            target_type: None,
            detail: serde_json::Value::Null,
            at,
        }
    }

    /// Sets the target.
    #[must_use]
    pub fn with_target(mut self, target_id: i64, target_type: impl Into<String>) -> Self {
        self.target_id = Some(target_id);
        self.target_type = Some(target_type.into());
        self
    }

    /// Sets the detail payload.
    #[must_use]
    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = detail;
        self
    }
}

/// Destination for appended audit events.
pub trait AuditSink: Send + Sync {
    /// Receives one event, after it has been appended to the ledger.
    fn record(&self, event: &AuditEvent);
}

/// Sink that emits events into the `tracing` infrastructure.
#[derive(Clone, Debug, Default)]
pub struct TracingAuditSink;

impl TracingAuditSink {
    /// Creates the sink.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl AuditSink for TracingAuditSink {
    fn record(&self, event: &AuditEvent) {
        let detail = event.detail.to_string();
        tracing::info!(
            target: "warden_audit",
            event_id = %event.id,
            account_id = %event.account_id,
            kind = %event.kind,
            at = %event.at,
            detail = %detail,
            "[AUDIT] {}",
            event.kind
        );
    }
}

/// Sink that captures events in memory for assertions.
#[derive(Clone, Default)]
pub struct RecordingAuditSink {
    events: std::sync::Arc<parking_lot::Mutex<Vec<AuditEvent>>>,
}

impl RecordingAuditSink {
    /// Creates an empty recording sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every recorded event, in order.
    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }

    /// Returns recorded events of the given kind.
    #[must_use]
    pub fn of_kind(&self, kind: AuditKind) -> Vec<AuditEvent> {
        self.events.lock().iter().filter(|e| e.kind == kind).cloned().collect()
    }
}

impl AuditSink for RecordingAuditSink {
    fn record(&self, event: &AuditEvent) {
        self.events.lock().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case(AuditKind::AccountCreated, "ACCOUNT_CREATED")]
    #[test_case(AuditKind::SubscriptionCreated, "SUBSCRIPTION_CREATED")]
    #[test_case(AuditKind::SubscriptionUpdated, "SUBSCRIPTION_UPDATED")]
    #[test_case(AuditKind::AccessBlockedScheduled, "ACCESS_BLOCKED_SCHEDULED")]
    #[test_case(AuditKind::AccessBlockFailed, "ACCESS_BLOCK_FAILED")]
    fn kind_wire_strings(kind: AuditKind, expected: &str) {
        assert_eq!(kind.as_str(), expected);
        assert_eq!(
            serde_json::to_value(kind).expect("serializes"),
            serde_json::Value::String(expected.to_string())
        );
    }

    #[test]
    fn builder_sets_target_and_detail() {
        let event = AuditEvent::new(AccountId(7), AuditKind::ConfigCreated, Utc::now())
            .with_target(3, "configs")
            .with_detail(serde_json::json!({ "address": "10.0.0.4/32" }));

        assert_eq!(event.target_id, Some(3));
        assert_eq!(event.target_type.as_deref(), Some("configs"));
        assert_eq!(event.detail["address"], "10.0.0.4/32");
    }

    #[test]
    fn recording_sink_filters_by_kind() {
        let sink = RecordingAuditSink::new();
        sink.record(&AuditEvent::new(AccountId(1), AuditKind::AccountCreated, Utc::now()));
        sink.record(&AuditEvent::new(AccountId(1), AuditKind::ConfigCreated, Utc::now()));

        assert_eq!(sink.events().len(), 2);
        assert_eq!(sink.of_kind(AuditKind::ConfigCreated).len(), 1);
    }
}
