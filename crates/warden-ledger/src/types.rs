//! Ledger record types.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Internal account identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(pub i64);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An account bound to an external identity (e.g. a chat user id).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Internal id.
    pub id: AccountId,
    /// The external id the front-end knows this account by.
    pub external_id: i64,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// A subscription window. At most one per account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// Owning account.
    pub account_id: AccountId,
    /// Window start.
    pub start: DateTime<Utc>,
    /// Window end; access is cut off once this is in the past.
    pub end: DateTime<Utc>,
    /// Whether the window has been activated.
    pub active: bool,
}

impl Subscription {
    /// True when the window ended strictly before `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.end < now
    }
}

/// A provisioned client config as the ledger records it. The private key is
/// deliberately absent: only the client ever holds it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigRecord {
    /// Owning account.
    pub account_id: AccountId,
    /// Allocated client address, single-host CIDR, unique across configs.
    pub address: String,
    /// The peer's public key on the device.
    pub public_key: String,
    /// SVG QR image of the client config.
    pub qr_svg: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Input for recording a freshly provisioned config.
#[derive(Clone, Debug)]
pub struct NewConfig {
    /// Owning account.
    pub account_id: AccountId,
    /// Allocated client address.
    pub address: String,
    /// The peer's public key.
    pub public_key: String,
    /// SVG QR image of the client config.
    pub qr_svg: String,
}

/// A change to a subscription window: extension, immediate disable, or both
/// (disable applies first, then the extension from "now").
#[derive(Clone, Copy, Debug, Default)]
pub struct SubscriptionUpdate {
    /// Days to add to the current end.
    pub additional_days: Option<i64>,
    /// Set the end to "now", cutting the window short.
    pub disable_now: bool,
}

impl SubscriptionUpdate {
    /// An extension by the given number of days.
    #[must_use]
    pub fn extend(days: i64) -> Self {
        Self {
            additional_days: Some(days),
            disable_now: false,
        }
    }

    /// An immediate disable.
    #[must_use]
    pub fn disable() -> Self {
        Self {
            additional_days: None,
            disable_now: true,
        }
    }
}

/// One expired item as handed to the reconciliation sweep.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExpiredEntry {
    /// Owning account.
    pub account_id: AccountId,
    /// The external id, for audit detail.
    pub external_id: i64,
    /// The address whose access should be cut.
    pub address: String,
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;

    use super::*;

    #[test]
    fn subscription_expiry_is_strict() {
        let now = Utc::now();
        let sub = Subscription {
            account_id: AccountId(1),
            start: now - TimeDelta::days(30),
            end: now,
            active: true,
        };
        assert!(!sub.is_expired(now));
        assert!(sub.is_expired(now + TimeDelta::seconds(1)));
    }
}
