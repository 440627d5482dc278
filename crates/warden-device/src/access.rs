//! Network-layer access control.
//!
//! Access state is never stored: an address is blocked exactly when its two
//! directional drop rules are present on the device, so both operations are
//! written as idempotent set/clear against the rule table. Rules are added
//! through a check-then-append pair and removed with delete-if-present, so
//! repeating either call leaves the rule table unchanged.
//!
//! Failure tolerance is asymmetric. Reachability is governed by the
//! firewall rules, so a failing rule addition propagates. A stale or
//! missing route only degrades routing for an address the firewall already
//! drops, and rule-set persistence only affects durability across device
//! restart; both are logged and swallowed.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex as SyncMutex;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use warden_exec::CommandRunner;

use crate::commands::{self, DropDirection};
use crate::error::Result;

/// Idempotent block/unblock of a client address, serialized per address.
#[derive(Clone)]
pub struct AccessController<R> {
    runner: R,
    interface: String,
    locks: Arc<SyncMutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl<R: CommandRunner> AccessController<R> {
    /// Creates a controller for the given tunnel interface.
    #[must_use]
    pub fn new(runner: R, interface: impl Into<String>) -> Self {
        Self {
            runner,
            interface: interface.into(),
            locks: Arc::new(SyncMutex::new(HashMap::new())),
        }
    }

    fn lock_for(&self, address: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock();
        locks.entry(address.to_string()).or_default().clone()
    }

    /// Cuts off network access for `address`.
    ///
    /// Adds both directional drop rules (idempotently), persists the rule
    /// set, and removes the routing entry. Route and persistence failures
    /// are logged, never propagated.
    pub async fn block(&self, address: &str) -> Result<()> {
        let lock = self.lock_for(address);
        let _serialized = lock.lock().await;

        self.ensure_drop_rule(DropDirection::Inbound, address).await?;
        self.ensure_drop_rule(DropDirection::Outbound, address).await?;
        self.persist_rule_set().await;
        self.remove_route(address).await;

        info!(address = %address, "blocked access");
        Ok(())
    }

    /// Restores network access for `address`.
    ///
    /// Removes both drop rules if present, persists the rule set, and
    /// re-adds the routing entry. Calling this for an address that was
    /// never blocked is a no-op, not an error.
    pub async fn unblock(&self, address: &str) -> Result<()> {
        let lock = self.lock_for(address);
        let _serialized = lock.lock().await;

        self.clear_drop_rule(DropDirection::Inbound, address).await?;
        self.clear_drop_rule(DropDirection::Outbound, address).await?;
        self.persist_rule_set().await;
        self.add_route(address).await;

        info!(address = %address, "unblocked access");
        Ok(())
    }

    /// Adds a drop rule unless it is already present.
    async fn ensure_drop_rule(&self, direction: DropDirection, address: &str) -> Result<()> {
        let check = commands::drop_rule_check(direction, &self.interface, address);
        match self.runner.run(&check).await {
            Ok(_) => {
                debug!(address = %address, ?direction, "drop rule already present");
                Ok(())
            }
            Err(e) if e.is_command_failure() => {
                self.runner
                    .run(&commands::drop_rule_add(direction, &self.interface, address))
                    .await?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Removes a drop rule, treating "no such rule" as already cleared.
    async fn clear_drop_rule(&self, direction: DropDirection, address: &str) -> Result<()> {
        let del = commands::drop_rule_del(direction, &self.interface, address);
        match self.runner.run(&del).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_command_failure() => {
                debug!(address = %address, ?direction, "drop rule was not present");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Persists and reloads the firewall rule set. A failure here leaves
    /// the live table correct but not durable across device restart.
    async fn persist_rule_set(&self) {
        if let Err(e) = self.runner.run(&commands::persist_rules()).await {
            warn!(error = %e, "failed to persist firewall rule set");
            return;
        }
        if let Err(e) = self.runner.run(&commands::reload_rules()).await {
            warn!(error = %e, "failed to reload firewall rule set");
        }
    }

    async fn add_route(&self, address: &str) {
        if let Err(e) = self.runner.run(&commands::route_add(address, &self.interface)).await {
            warn!(address = %address, error = %e, "failed to add route");
        }
    }

    async fn remove_route(&self, address: &str) {
        if let Err(e) = self.runner.run(&commands::route_del(address, &self.interface)).await {
            warn!(address = %address, error = %e, "failed to remove route");
        }
    }
}
