//! Error types for device operations.

use thiserror::Error;
use warden_exec::ExecError;

/// Result alias for device operations.
pub type Result<T, E = DeviceError> = std::result::Result<T, E>;

/// Errors that can occur while operating on the tunnel device.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// A device command failed; carries exit status and stderr.
    #[error(transparent)]
    Exec(#[from] ExecError),

    /// Every configured address range is exhausted.
    #[error("no available address in the configured ranges")]
    NoAddressAvailable,

    /// A client artifact could not be rendered.
    #[error("artifact rendering failed: {0}")]
    Artifact(String),
}
