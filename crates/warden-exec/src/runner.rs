//! Command transports.
//!
//! The tunnel daemon lives inside a Docker container on the device host.
//! [`LocalRunner`] talks to a local Docker daemon; [`SshRunner`] reaches a
//! remote host through the `ssh` binary and runs the same `docker exec`
//! there. Callers cannot tell the two apart: both return trimmed stdout or
//! an [`ExecError`] with the exit status and captured stderr.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command as TokioCommand;
use tracing::debug;

use crate::command::CommandLine;
use crate::error::{ExecError, Result};

/// Default per-command timeout. Remote sessions are prone to hanging, so
/// every command is bounded regardless of transport.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Trait for running commands against the tunnel device.
#[allow(async_fn_in_trait)]
pub trait CommandRunner: Send + Sync {
    /// Runs a command, returning trimmed stdout.
    async fn run(&self, cmd: &CommandLine) -> Result<String>;
}

/// Runs commands in the tunnel container through the local Docker daemon.
#[derive(Clone, Debug)]
pub struct LocalRunner {
    container: String,
    timeout: Duration,
}

impl LocalRunner {
    /// Creates a runner targeting the given container.
    #[must_use]
    pub fn new(container: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Sets the per-command timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl CommandRunner for LocalRunner {
    async fn run(&self, cmd: &CommandLine) -> Result<String> {
        let argv = docker_argv(&self.container, cmd);
        debug!(command = %cmd, container = %self.container, "running local device command");

        let mut child = TokioCommand::new("docker");
        child.args(&argv);
        spawn_and_capture(child, cmd, self.timeout).await
    }
}

/// Connection settings for a remote device host.
#[derive(Clone, Debug)]
pub struct SshConfig {
    /// Host name or address of the device.
    pub host: String,
    /// SSH port.
    pub port: u16,
    /// Login user.
    pub user: String,
    /// Path to the identity file.
    pub identity: PathBuf,
}

impl SshConfig {
    /// Creates a config with the default port 22.
    #[must_use]
    pub fn new(host: impl Into<String>, user: impl Into<String>, identity: impl Into<PathBuf>) -> Self {
        Self {
            host: host.into(),
            port: 22,
            user: user.into(),
            identity: identity.into(),
        }
    }

    /// Sets the SSH port.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

/// Runs commands in the tunnel container on a remote host over `ssh`.
#[derive(Clone, Debug)]
pub struct SshRunner {
    config: SshConfig,
    container: String,
    timeout: Duration,
}

impl SshRunner {
    /// Creates a runner for the given host and container.
    #[must_use]
    pub fn new(config: SshConfig, container: impl Into<String>) -> Self {
        Self {
            config,
            container: container.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Sets the per-command timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn ssh_argv(&self, cmd: &CommandLine) -> Vec<String> {
        let mut argv = vec![
            "-i".to_string(),
            self.config.identity.display().to_string(),
            "-p".to_string(),
            self.config.port.to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            format!("{}@{}", self.config.user, self.config.host),
            "--".to_string(),
        ];
        // The remote side joins its arguments back into a shell word list,
        // so each one is quoted before it crosses the wire.
        argv.push("docker".to_string());
        argv.extend(docker_argv(&self.container, cmd).iter().map(|a| shell_quote(a)));
        argv
    }
}

impl CommandRunner for SshRunner {
    async fn run(&self, cmd: &CommandLine) -> Result<String> {
        let argv = self.ssh_argv(cmd);
        debug!(command = %cmd, host = %self.config.host, "running remote device command");

        let mut child = TokioCommand::new("ssh");
        child.args(&argv);
        spawn_and_capture(child, cmd, self.timeout).await
    }
}

/// Wraps a device command in `docker exec` for the tunnel container.
fn docker_argv(container: &str, cmd: &CommandLine) -> Vec<String> {
    let mut argv = vec!["exec".to_string()];
    if cmd.stdin().is_some() {
        argv.push("-i".to_string());
    }
    argv.push(container.to_string());
    argv.push(cmd.program().to_string());
    argv.extend(cmd.argv().iter().cloned());
    argv
}

/// Quotes a single argument for the remote shell.
fn shell_quote(arg: &str) -> String {
    if !arg.is_empty() && arg.chars().all(|c| c.is_ascii_alphanumeric() || "-_./=:@+,".contains(c)) {
        return arg.to_string();
    }
    format!("'{}'", arg.replace('\'', "'\\''"))
}

/// Spawns the child, feeds stdin, and enforces the timeout.
async fn spawn_and_capture(
    mut child: TokioCommand,
    cmd: &CommandLine,
    timeout: Duration,
) -> Result<String> {
    child
        .stdin(if cmd.stdin().is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut handle = child.spawn()?;

    if let Some(payload) = cmd.stdin() {
        if let Some(mut stdin) = handle.stdin.take() {
            stdin.write_all(payload.as_bytes()).await?;
            stdin.shutdown().await?;
        }
    }

    let output = tokio::time::timeout(timeout, handle.wait_with_output())
        .await
        .map_err(|_| ExecError::TimedOut {
            command: cmd.rendered(),
            timeout,
        })??;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        Err(ExecError::CommandFailed {
            command: cmd.rendered(),
            status: output.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}
