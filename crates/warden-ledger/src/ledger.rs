//! The ledger boundary trait and the in-process implementation.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use warden_persist::JsonStore;

use crate::audit::{AuditEvent, AuditKind, AuditSink, TracingAuditSink};
use crate::error::{LedgerError, Result};
use crate::types::{
    Account, AccountId, ConfigRecord, ExpiredEntry, NewConfig, Subscription, SubscriptionUpdate,
};

/// The ledger interface the core consumes.
///
/// Time-dependent operations take `now` explicitly so callers inject their
/// clock; the ledger itself never reads the wall clock.
pub trait SubscriptionLedger: Send + Sync {
    /// Looks up the account for an external id, creating it if absent.
    fn ensure_account(&self, external_id: i64, now: DateTime<Utc>) -> Account;

    /// Looks up an account by internal id.
    fn account(&self, id: AccountId) -> Option<Account>;

    /// Looks up an account by external id without creating it.
    fn account_for_external(&self, external_id: i64) -> Option<Account>;

    /// True when a config record exists for the account.
    fn config_exists(&self, id: AccountId) -> bool;

    /// True when a subscription window exists for the account.
    fn subscription_exists(&self, id: AccountId) -> bool;

    /// Records a provisioned config.
    ///
    /// # Errors
    ///
    /// `NotFound` when the account is absent; `Conflict` when a config
    /// already exists for it.
    fn create_config(&self, config: NewConfig, now: DateTime<Utc>) -> Result<ConfigRecord>;

    /// Returns the config record for an account, if any.
    fn config_for_account(&self, id: AccountId) -> Option<ConfigRecord>;

    /// Creates a subscription window of `days` days starting at `now`.
    ///
    /// # Errors
    ///
    /// `NotFound` when the account is absent; `Conflict` when a window
    /// already exists for it.
    fn create_subscription(&self, id: AccountId, days: i64, now: DateTime<Utc>) -> Result<Subscription>;

    /// Applies a [`SubscriptionUpdate`]: immediate disable sets the end to
    /// `now`; an extension adds days to the (possibly just-disabled) end.
    ///
    /// # Errors
    ///
    /// `NotFound` when the account or its subscription is absent.
    fn update_subscription(
        &self,
        id: AccountId,
        update: SubscriptionUpdate,
        now: DateTime<Utc>,
    ) -> Result<Subscription>;

    /// Every config whose subscription ended strictly before `now`.
    fn expired_entries(&self, now: DateTime<Utc>) -> Vec<ExpiredEntry>;

    /// Appends an audit event. Append-only; events are never mutated.
    fn append_audit(&self, event: AuditEvent);
}

#[derive(Default, Serialize, Deserialize)]
struct LedgerState {
    accounts: HashMap<i64, Account>,
    next_account_id: i64,
    subscriptions: HashMap<i64, Subscription>,
    configs: HashMap<i64, ConfigRecord>,
    audit_log: Vec<AuditEvent>,
}

/// In-process ledger: in-memory state with JSON snapshots on disk.
pub struct MemoryLedger {
    state: Mutex<LedgerState>,
    store: Option<JsonStore>,
    sink: Arc<dyn AuditSink>,
}

impl MemoryLedger {
    /// Opens a ledger backed by `<dir>/ledger.json`, loading prior state.
    #[must_use]
    pub fn open(dir: &Path) -> Self {
        let store = JsonStore::new(dir, "ledger");
        let state: LedgerState = store.load();
        debug!(
            accounts = state.accounts.len(),
            configs = state.configs.len(),
            "loaded ledger from disk"
        );
        Self {
            state: Mutex::new(state),
            store: Some(store),
            sink: Arc::new(TracingAuditSink::new()),
        }
    }

    /// A ledger with no disk snapshot, for tests and embedding.
    #[must_use]
    pub fn ephemeral() -> Self {
        Self {
            state: Mutex::new(LedgerState::default()),
            store: None,
            sink: Arc::new(TracingAuditSink::new()),
        }
    }

    /// Replaces the audit sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Every audit event appended so far, in order.
    #[must_use]
    pub fn audit_log(&self) -> Vec<AuditEvent> {
        self.state.lock().audit_log.clone()
    }

    fn snapshot(&self, state: &LedgerState) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save(state) {
                warn!(error = %e, "failed to snapshot ledger");
            }
        }
    }

    fn append_locked(&self, state: &mut LedgerState, event: AuditEvent) {
        self.sink.record(&event);
        state.audit_log.push(event);
    }
}

impl SubscriptionLedger for MemoryLedger {
    fn ensure_account(&self, external_id: i64, now: DateTime<Utc>) -> Account {
        let mut state = self.state.lock();
        if let Some(account) = state.accounts.get(&external_id) {
            return account.clone();
        }

        state.next_account_id += 1;
        let account = Account {
            id: AccountId(state.next_account_id),
            external_id,
            created_at: now,
        };
        state.accounts.insert(external_id, account.clone());

        let event = AuditEvent::new(account.id, AuditKind::AccountCreated, now)
            .with_target(external_id, "accounts")
            .with_detail(serde_json::json!({ "external_id": external_id }));
        self.append_locked(&mut state, event);
        self.snapshot(&state);
        account
    }

    fn account(&self, id: AccountId) -> Option<Account> {
        self.state.lock().accounts.values().find(|a| a.id == id).cloned()
    }

    fn account_for_external(&self, external_id: i64) -> Option<Account> {
        self.state.lock().accounts.get(&external_id).cloned()
    }

    fn config_exists(&self, id: AccountId) -> bool {
        self.state.lock().configs.contains_key(&id.0)
    }

    fn subscription_exists(&self, id: AccountId) -> bool {
        self.state.lock().subscriptions.contains_key(&id.0)
    }

    fn create_config(&self, config: NewConfig, now: DateTime<Utc>) -> Result<ConfigRecord> {
        let mut state = self.state.lock();
        if !state.accounts.values().any(|a| a.id == config.account_id) {
            return Err(LedgerError::not_found(format!("account {}", config.account_id)));
        }
        if state.configs.contains_key(&config.account_id.0) {
            return Err(LedgerError::conflict(format!("config for account {}", config.account_id)));
        }

        let record = ConfigRecord {
            account_id: config.account_id,
            address: config.address,
            public_key: config.public_key,
            qr_svg: config.qr_svg,
            created_at: now,
        };
        state.configs.insert(record.account_id.0, record.clone());

        let event = AuditEvent::new(record.account_id, AuditKind::ConfigCreated, now)
            .with_target(record.account_id.0, "configs")
            .with_detail(serde_json::json!({
                "address": record.address,
                "public_key": record.public_key,
            }));
        self.append_locked(&mut state, event);
        self.snapshot(&state);
        Ok(record)
    }

    fn config_for_account(&self, id: AccountId) -> Option<ConfigRecord> {
        self.state.lock().configs.get(&id.0).cloned()
    }

    fn create_subscription(&self, id: AccountId, days: i64, now: DateTime<Utc>) -> Result<Subscription> {
        let mut state = self.state.lock();
        if !state.accounts.values().any(|a| a.id == id) {
            return Err(LedgerError::not_found(format!("account {id}")));
        }
        if state.subscriptions.contains_key(&id.0) {
            return Err(LedgerError::conflict(format!("subscription for account {id}")));
        }

        let subscription = Subscription {
            account_id: id,
            start: now,
            end: now + TimeDelta::days(days),
            active: true,
        };
        state.subscriptions.insert(id.0, subscription.clone());

        let event = AuditEvent::new(id, AuditKind::SubscriptionCreated, now)
            .with_target(id.0, "subscriptions")
            .with_detail(serde_json::json!({
                "duration_days": days,
                "start": subscription.start,
                "end": subscription.end,
            }));
        self.append_locked(&mut state, event);
        self.snapshot(&state);
        Ok(subscription)
    }

    fn update_subscription(
        &self,
        id: AccountId,
        update: SubscriptionUpdate,
        now: DateTime<Utc>,
    ) -> Result<Subscription> {
        let mut state = self.state.lock();
        if !state.accounts.values().any(|a| a.id == id) {
            return Err(LedgerError::not_found(format!("account {id}")));
        }
        let Some(subscription) = state.subscriptions.get_mut(&id.0) else {
            return Err(LedgerError::not_found(format!("subscription for account {id}")));
        };

        let old_end = subscription.end;
        if update.disable_now {
            subscription.end = now;
            subscription.active = false;
        }
        if let Some(days) = update.additional_days {
            subscription.end += TimeDelta::days(days);
            subscription.active = true;
        }
        let updated = subscription.clone();

        let event = AuditEvent::new(id, AuditKind::SubscriptionUpdated, now)
            .with_target(id.0, "subscriptions")
            .with_detail(serde_json::json!({
                "old_end": old_end,
                "new_end": updated.end,
                "additional_days": update.additional_days,
                "disable_now": update.disable_now,
            }));
        self.append_locked(&mut state, event);
        self.snapshot(&state);
        Ok(updated)
    }

    fn expired_entries(&self, now: DateTime<Utc>) -> Vec<ExpiredEntry> {
        let state = self.state.lock();
        let mut entries: Vec<ExpiredEntry> = state
            .subscriptions
            .values()
            .filter(|s| s.is_expired(now))
            .filter_map(|s| {
                let config = state.configs.get(&s.account_id.0)?;
                let account = state.accounts.values().find(|a| a.id == s.account_id)?;
                Some(ExpiredEntry {
                    account_id: s.account_id,
                    external_id: account.external_id,
                    address: config.address.clone(),
                })
            })
            .collect();
        entries.sort_by_key(|e| e.account_id);
        entries
    }

    fn append_audit(&self, event: AuditEvent) {
        let mut state = self.state.lock();
        self.append_locked(&mut state, event);
        self.snapshot(&state);
    }
}
