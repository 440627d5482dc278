//! Enrollment and subscription maintenance.
//!
//! One identity per account: a second enrollment for the same external id
//! fails with a conflict before any device command runs. Partial device
//! failure mid-provision surfaces unchanged and leaves no ledger rows, so
//! a retry after reconciliation starts from a clean ledger state.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;
use warden_device::{PeerRegistry, ProvisionedPeer};
use warden_exec::CommandRunner;
use warden_ledger::{
    Account, ConfigRecord, LedgerError, NewConfig, Subscription, SubscriptionLedger,
    SubscriptionUpdate,
};

use crate::clock::Clock;
use crate::error::Result;

/// Everything the front-end needs to hand a freshly enrolled client.
#[derive(Clone, Debug)]
pub struct Enrollment {
    /// The (possibly just-created) account.
    pub account: Account,
    /// The recorded config.
    pub config: ConfigRecord,
    /// The subscription window.
    pub subscription: Subscription,
    /// Rendered client configuration text.
    pub config_text: String,
    /// Path of the config artifact on the device.
    pub config_path: String,
}

/// Orchestrates enrollment against the device and the ledger.
pub struct Provisioner<R, L> {
    registry: PeerRegistry<R>,
    ledger: Arc<L>,
    clock: Arc<dyn Clock>,
}

impl<R, L> Provisioner<R, L>
where
    R: CommandRunner,
    L: SubscriptionLedger,
{
    /// Creates a provisioner.
    #[must_use]
    pub fn new(registry: PeerRegistry<R>, ledger: Arc<L>, clock: Arc<dyn Clock>) -> Self {
        Self {
            registry,
            ledger,
            clock,
        }
    }

    /// Enrolls the external id: creates the account if needed, provisions a
    /// peer, records the config and opens a subscription window of `days`.
    ///
    /// # Errors
    ///
    /// `Conflict` when a subscription or config already exists for the
    /// account; device errors from provisioning pass through unchanged.
    pub async fn enroll(&self, external_id: i64, days: i64) -> Result<Enrollment> {
        let now = self.clock.now();
        let account = self.ledger.ensure_account(external_id, now);

        if self.ledger.subscription_exists(account.id) {
            return Err(LedgerError::conflict(format!("subscription for account {}", account.id)).into());
        }
        if self.ledger.config_exists(account.id) {
            return Err(LedgerError::conflict(format!("config for account {}", account.id)).into());
        }

        let peer: ProvisionedPeer = self.registry.provision(account.id.0).await?;

        let config = self.ledger.create_config(
            NewConfig {
                account_id: account.id,
                address: peer.client_address.clone(),
                public_key: peer.public_key.clone(),
                qr_svg: peer.qr_svg.clone(),
            },
            now,
        )?;
        let subscription = self.ledger.create_subscription(account.id, days, now)?;

        info!(
            external_id,
            account_id = %account.id,
            address = %peer.client_address,
            until = %subscription.end,
            "enrolled client"
        );

        Ok(Enrollment {
            account,
            config,
            subscription,
            config_text: peer.config_text,
            config_path: peer.config_path,
        })
    }

    /// Applies a window update (extension and/or immediate disable) and
    /// returns the updated window with the account's config record.
    ///
    /// # Errors
    ///
    /// `NotFound` when the account or its subscription is absent.
    pub fn update_window(
        &self,
        external_id: i64,
        update: SubscriptionUpdate,
    ) -> Result<(Subscription, Option<ConfigRecord>)> {
        let now: DateTime<Utc> = self.clock.now();
        let account = self
            .ledger
            .account_for_external(external_id)
            .ok_or_else(|| LedgerError::not_found(format!("account for external id {external_id}")))?;

        let subscription = self.ledger.update_subscription(account.id, update, now)?;
        let config = self.ledger.config_for_account(account.id);
        Ok((subscription, config))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeDelta, Utc};
    use warden_device::DeviceConfig;
    use warden_device::testing::{FAKE_SERVER_PUBLIC_KEY, FakeDevice};
    use warden_ledger::MemoryLedger;

    use crate::clock::ManualClock;

    use super::*;

    fn provisioner(device: &FakeDevice, clock: &ManualClock) -> Provisioner<FakeDevice, MemoryLedger> {
        Provisioner::new(
            PeerRegistry::new(device.clone(), DeviceConfig::default()),
            Arc::new(MemoryLedger::ephemeral()),
            Arc::new(clock.clone()),
        )
    }

    #[tokio::test]
    async fn enroll_provisions_and_records() {
        let device = FakeDevice::new();
        let clock = ManualClock::new(Utc::now());
        let service = provisioner(&device, &clock);

        let enrollment = service.enroll(42, 30).await.expect("enroll");

        assert_eq!(enrollment.account.external_id, 42);
        assert_eq!(enrollment.config.address, "10.0.0.2/32");
        assert!(enrollment.config_text.contains(FAKE_SERVER_PUBLIC_KEY));
        assert_eq!(enrollment.subscription.end, clock.now() + TimeDelta::days(30));
        assert_eq!(device.peers().len(), 1);
    }

    #[tokio::test]
    async fn second_enrollment_conflicts_before_touching_the_device() {
        let device = FakeDevice::new();
        let clock = ManualClock::new(Utc::now());
        let service = provisioner(&device, &clock);

        service.enroll(42, 30).await.expect("first enrollment");
        let commands_after_first = device.transcript().len();

        let err = service.enroll(42, 30).await.expect_err("duplicate");
        assert!(err.is_conflict());
        assert_eq!(device.transcript().len(), commands_after_first);
    }

    #[tokio::test]
    async fn device_failure_leaves_no_ledger_rows() {
        let device = FakeDevice::new();
        device.fail_on("wg set");
        let clock = ManualClock::new(Utc::now());
        let service = provisioner(&device, &clock);

        let err = service.enroll(42, 30).await.expect_err("device failure");
        assert!(matches!(err, crate::ServiceError::Device(_)));

        // The account exists but neither config nor subscription was
        // recorded, so a retry is not a conflict.
        assert!(matches!(
            service.enroll(42, 30).await,
            Err(crate::ServiceError::Device(_))
        ));
    }

    #[tokio::test]
    async fn update_window_extends_and_returns_config() {
        let device = FakeDevice::new();
        let clock = ManualClock::new(Utc::now());
        let service = provisioner(&device, &clock);

        let enrollment = service.enroll(42, 30).await.expect("enroll");
        let (updated, config) = service
            .update_window(42, SubscriptionUpdate::extend(7))
            .expect("extend");

        assert_eq!(updated.end, enrollment.subscription.end + TimeDelta::days(7));
        assert_eq!(config.expect("config").address, enrollment.config.address);
    }

    #[tokio::test]
    async fn update_window_for_unknown_external_id_is_not_found() {
        let device = FakeDevice::new();
        let clock = ManualClock::new(Utc::now());
        let service = provisioner(&device, &clock);

        let err = service
            .update_window(99, SubscriptionUpdate::disable())
            .expect_err("unknown account");
        assert!(matches!(err, crate::ServiceError::Ledger(LedgerError::NotFound(_))));
    }
}
