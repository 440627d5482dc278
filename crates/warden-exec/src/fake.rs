//! Scripted in-memory transport for tests.
//!
//! Mirrors the real transports' contract without touching a process
//! boundary: responses are keyed by command prefix, every run is recorded,
//! and unmatched commands succeed with empty output.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::command::CommandLine;
use crate::error::{ExecError, Result};
use crate::runner::CommandRunner;

enum Scripted {
    Ok(String),
    Fail { status: i32, stderr: String },
}

#[derive(Default)]
struct FakeState {
    scripts: Vec<(String, Scripted)>,
    transcript: Vec<String>,
}

/// A scripted command runner. Cloning shares state, so the same fake can be
/// handed to several components and inspected afterwards.
#[derive(Clone, Default)]
pub struct FakeRunner {
    state: Arc<Mutex<FakeState>>,
}

impl FakeRunner {
    /// Creates an empty fake.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts a successful response for commands starting with `prefix`.
    /// Later scripts win over earlier ones when prefixes overlap.
    pub fn respond(&self, prefix: impl Into<String>, output: impl Into<String>) {
        self.state
            .lock()
            .scripts
            .push((prefix.into(), Scripted::Ok(output.into())));
    }

    /// Scripts a non-zero exit for commands starting with `prefix`.
    pub fn fail(&self, prefix: impl Into<String>, stderr: impl Into<String>) {
        self.state.lock().scripts.push((
            prefix.into(),
            Scripted::Fail {
                status: 1,
                stderr: stderr.into(),
            },
        ));
    }

    /// Returns every command run so far, in order, in rendered form.
    #[must_use]
    pub fn transcript(&self) -> Vec<String> {
        self.state.lock().transcript.clone()
    }

    /// Counts recorded commands starting with `prefix`.
    #[must_use]
    pub fn runs_matching(&self, prefix: &str) -> usize {
        self.state
            .lock()
            .transcript
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }
}

impl CommandRunner for FakeRunner {
    async fn run(&self, cmd: &CommandLine) -> Result<String> {
        let rendered = cmd.rendered();
        let mut state = self.state.lock();
        state.transcript.push(rendered.clone());

        let hit = state
            .scripts
            .iter()
            .rev()
            .find(|(prefix, _)| rendered.starts_with(prefix.as_str()));

        match hit {
            Some((_, Scripted::Ok(output))) => Ok(output.trim().to_string()),
            Some((_, Scripted::Fail { status, stderr })) => Err(ExecError::CommandFailed {
                command: rendered,
                status: *status,
                stderr: stderr.clone(),
            }),
            None => Ok(String::new()),
        }
    }
}
