//! Error types for device command execution.

use std::time::Duration;

use thiserror::Error;

/// Result alias for command execution.
pub type Result<T, E = ExecError> = std::result::Result<T, E>;

/// Errors that can occur while running a device command.
#[derive(Debug, Error)]
pub enum ExecError {
    /// The command ran and exited non-zero.
    #[error("command `{command}` exited with status {status}: {stderr}")]
    CommandFailed {
        /// Rendered command line.
        command: String,
        /// Process exit code (-1 when terminated by signal).
        status: i32,
        /// Captured standard error, trimmed.
        stderr: String,
    },

    /// The command did not complete within the configured timeout.
    #[error("command `{command}` timed out after {timeout:?}")]
    TimedOut {
        /// Rendered command line.
        command: String,
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// The transport itself failed before an exit status was observed.
    #[error("transport error: {0}")]
    Transport(String),

    /// Spawning or talking to the child process failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExecError {
    /// True when the failure is a non-zero exit rather than a transport fault.
    #[must_use]
    pub fn is_command_failure(&self) -> bool {
        matches!(self, Self::CommandFailed { .. })
    }
}
