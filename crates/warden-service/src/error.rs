//! Error types for the service layer.

use thiserror::Error;
use warden_device::DeviceError;
use warden_ledger::LedgerError;

/// Result alias for service operations.
pub type Result<T, E = ServiceError> = std::result::Result<T, E>;

/// Errors surfaced by the service layer. Device and ledger errors pass
/// through unchanged so callers can map conflicts ("config already
/// exists") separately from transient device failures.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// A device operation failed.
    #[error(transparent)]
    Device(#[from] DeviceError),

    /// A ledger operation failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl ServiceError {
    /// True when the failure is a uniqueness conflict.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Ledger(LedgerError::Conflict(_)))
    }
}
