//! Command execution transports for the tunnel device.
//!
//! Every mutation of the tunnel host (key generation, peer registration,
//! firewall edits, routing) goes through a [`CommandRunner`]. Two transports
//! are provided: [`LocalRunner`] for a device reachable through the local
//! Docker daemon and [`SshRunner`] for a remote host. Both honor the same
//! contract: trimmed stdout on success, [`ExecError`] carrying the exit
//! status and captured stderr on failure, and a bounded timeout on every
//! command.
//!
//! Commands are built with [`CommandLine`] — an explicit program + argument
//! list with an optional stdin payload. Nothing is ever interpolated into a
//! shell string.

#![forbid(unsafe_code)]

pub mod command;
pub mod error;
pub mod fake;
pub mod runner;

pub use command::CommandLine;
pub use error::{ExecError, Result};
pub use fake::FakeRunner;
pub use runner::{CommandRunner, LocalRunner, SshConfig, SshRunner, DEFAULT_TIMEOUT};
