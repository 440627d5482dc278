//! Error types for the ledger boundary.

use thiserror::Error;

/// Result alias for ledger operations.
pub type Result<T, E = LedgerError> = std::result::Result<T, E>;

/// Errors surfaced at the ledger boundary.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    /// A referenced account, subscription or config does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// A uniqueness invariant is already satisfied (one config and one
    /// subscription per account).
    #[error("{0} already exists")]
    Conflict(String),
}

impl LedgerError {
    /// Shorthand for a `NotFound` with a formatted subject.
    #[must_use]
    pub fn not_found(subject: impl Into<String>) -> Self {
        Self::NotFound(subject.into())
    }

    /// Shorthand for a `Conflict` with a formatted subject.
    #[must_use]
    pub fn conflict(subject: impl Into<String>) -> Self {
        Self::Conflict(subject.into())
    }
}
