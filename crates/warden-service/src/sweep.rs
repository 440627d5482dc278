//! Expiry reconciliation.
//!
//! One sweep fetches every subscription past its end and drives each
//! address to the blocked state. Items fail independently: a failed block
//! is audited and skipped, never aborting the batch. A `try_lock` gate
//! keeps two sweeps from running at once; an overlapping call returns a
//! report marked skipped.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};
use warden_device::AccessController;
use warden_exec::CommandRunner;
use warden_ledger::{AccountId, AuditEvent, AuditKind, SubscriptionLedger};

use crate::clock::Clock;

/// One successfully blocked item.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockedPeer {
    /// Owning account.
    pub account_id: AccountId,
    /// External id, for the front-end's benefit.
    pub external_id: i64,
    /// The address that was blocked.
    pub address: String,
}

/// Outcome of one sweep.
#[derive(Clone, Debug, Default)]
pub struct SweepReport {
    /// Items successfully driven to the blocked state, in account order.
    pub blocked: Vec<BlockedPeer>,
    /// Items whose block failed and was audited.
    pub failed: usize,
    /// True when this call found another sweep in flight and did nothing.
    pub skipped: bool,
}

/// Periodically reconciles expired subscriptions to the blocked state.
pub struct Reconciler<R, L> {
    access: AccessController<R>,
    ledger: Arc<L>,
    clock: Arc<dyn Clock>,
    gate: Mutex<()>,
}

impl<R, L> Reconciler<R, L>
where
    R: CommandRunner,
    L: SubscriptionLedger,
{
    /// Creates a reconciler.
    #[must_use]
    pub fn new(access: AccessController<R>, ledger: Arc<L>, clock: Arc<dyn Clock>) -> Self {
        Self {
            access,
            ledger,
            clock,
            gate: Mutex::new(()),
        }
    }

    /// Runs one sweep and reports what it blocked.
    pub async fn sweep(&self) -> SweepReport {
        let Ok(_running) = self.gate.try_lock() else {
            warn!("sweep already in flight, skipping");
            return SweepReport {
                skipped: true,
                ..SweepReport::default()
            };
        };

        let now = self.clock.now();
        let entries = self.ledger.expired_entries(now);
        info!(expired = entries.len(), "sweep started");

        let mut report = SweepReport::default();
        for entry in entries {
            match self.access.block(&entry.address).await {
                Ok(()) => {
                    self.ledger.append_audit(
                        AuditEvent::new(entry.account_id, AuditKind::AccessBlockedScheduled, now)
                            .with_target(entry.account_id.0, "configs")
                            .with_detail(serde_json::json!({
                                "external_id": entry.external_id,
                                "address": entry.address,
                                "blocked_at": now,
                                "reason": "subscription expired",
                            })),
                    );
                    report.blocked.push(BlockedPeer {
                        account_id: entry.account_id,
                        external_id: entry.external_id,
                        address: entry.address,
                    });
                }
                Err(e) => {
                    warn!(
                        account_id = %entry.account_id,
                        address = %entry.address,
                        error = %e,
                        "failed to block expired client"
                    );
                    self.ledger.append_audit(
                        AuditEvent::new(entry.account_id, AuditKind::AccessBlockFailed, now)
                            .with_target(entry.account_id.0, "configs")
                            .with_detail(serde_json::json!({
                                "external_id": entry.external_id,
                                "address": entry.address,
                                "error": e.to_string(),
                            })),
                    );
                    report.failed += 1;
                }
            }
        }

        info!(blocked = report.blocked.len(), failed = report.failed, "sweep finished");
        report
    }

    /// The access controller this reconciler drives, for callers that also
    /// need manual block/unblock.
    #[must_use]
    pub fn access(&self) -> &AccessController<R> {
        &self.access
    }
}
