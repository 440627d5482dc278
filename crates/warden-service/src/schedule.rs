//! Sweep scheduling.
//!
//! The sweep runs once immediately at startup and then on a fixed cadence.
//! The loop is an explicit async function rather than an ambient callback:
//! the embedding process spawns it with its own runtime and stops it
//! through the shutdown channel.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};
use warden_exec::CommandRunner;
use warden_ledger::SubscriptionLedger;

use crate::sweep::Reconciler;

/// When the sweep runs.
#[derive(Clone, Copy, Debug)]
pub struct SweepSchedule {
    /// Time between sweeps. The first sweep runs immediately.
    pub every: Duration,
}

impl Default for SweepSchedule {
    /// Daily, the cadence subscription expiry actually needs.
    fn default() -> Self {
        Self {
            every: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl SweepSchedule {
    /// A schedule with the given cadence.
    #[must_use]
    pub fn every(every: Duration) -> Self {
        Self { every }
    }

    /// Runs the sweep loop until `shutdown` flips to `true`.
    ///
    /// The first tick fires immediately; later ticks follow the cadence,
    /// delayed rather than bunched when a sweep overruns.
    pub async fn run<R, L>(self, reconciler: &Reconciler<R, L>, mut shutdown: watch::Receiver<bool>)
    where
        R: CommandRunner,
        L: SubscriptionLedger,
    {
        let mut ticker = tokio::time::interval(self.every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(every_secs = self.every.as_secs(), "sweep schedule started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = reconciler.sweep().await;
                    debug!(
                        blocked = report.blocked.len(),
                        failed = report.failed,
                        skipped = report.skipped,
                        "scheduled sweep finished"
                    );
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("sweep schedule stopped");
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeDelta, Utc};
    use warden_device::AccessController;
    use warden_device::testing::FakeDevice;
    use warden_ledger::{MemoryLedger, NewConfig, SubscriptionLedger};

    use crate::clock::{Clock, ManualClock};

    use super::*;

    fn seed_expired(ledger: &MemoryLedger, clock: &ManualClock) {
        let yesterday = clock.now() - TimeDelta::days(1);
        let account = ledger.ensure_account(7, yesterday);
        ledger
            .create_config(
                NewConfig {
                    account_id: account.id,
                    address: "10.0.0.4/32".to_string(),
                    public_key: "PK=".to_string(),
                    qr_svg: "<svg/>".to_string(),
                },
                yesterday,
            )
            .expect("config");
        ledger.create_subscription(account.id, 0, yesterday).expect("subscription");
    }

    #[tokio::test(start_paused = true)]
    async fn first_sweep_runs_immediately() {
        let device = FakeDevice::new();
        let clock = ManualClock::new(Utc::now());
        let ledger = Arc::new(MemoryLedger::ephemeral());
        seed_expired(&ledger, &clock);

        let reconciler = Arc::new(Reconciler::new(
            AccessController::new(device.clone(), "wg0"),
            Arc::clone(&ledger),
            Arc::new(clock.clone()),
        ));

        let (stop_tx, stop_rx) = watch::channel(false);
        let schedule = SweepSchedule::every(Duration::from_secs(3600));
        let looped = {
            let reconciler = Arc::clone(&reconciler);
            tokio::spawn(async move { schedule.run(&reconciler, stop_rx).await })
        };

        // Let the startup tick run without advancing past the cadence.
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(device.drop_rules().len(), 2);

        stop_tx.send(true).expect("send stop");
        looped.await.expect("loop exits");
    }

    #[tokio::test(start_paused = true)]
    async fn later_sweeps_follow_the_cadence() {
        let device = FakeDevice::new();
        let clock = ManualClock::new(Utc::now());
        let ledger = Arc::new(MemoryLedger::ephemeral());

        let reconciler = Arc::new(Reconciler::new(
            AccessController::new(device.clone(), "wg0"),
            Arc::clone(&ledger),
            Arc::new(clock.clone()),
        ));

        let (stop_tx, stop_rx) = watch::channel(false);
        let schedule = SweepSchedule::every(Duration::from_secs(3600));
        let looped = {
            let reconciler = Arc::clone(&reconciler);
            tokio::spawn(async move { schedule.run(&reconciler, stop_rx).await })
        };

        // Startup sweep sees nothing expired.
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(device.drop_rules().is_empty());

        // A subscription expires before the next tick.
        seed_expired(&ledger, &clock);
        tokio::time::sleep(Duration::from_secs(3601)).await;
        assert_eq!(device.drop_rules().len(), 2);

        stop_tx.send(true).expect("send stop");
        looped.await.expect("loop exits");
    }
}
