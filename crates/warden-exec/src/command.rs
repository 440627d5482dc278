//! Structured command lines.
//!
//! The tunnel daemon and firewall tooling are driven by fixed command
//! strings. [`CommandLine`] keeps program and arguments as an explicit argv
//! so untrusted values (addresses, keys) can never splice into a shell
//! string; payloads that the original tooling piped through `echo` travel
//! on stdin instead.

use std::fmt;

/// A program invocation: argv plus an optional stdin payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandLine {
    program: String,
    args: Vec<String>,
    stdin: Option<String>,
}

impl CommandLine {
    /// Creates a command for the given program.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
        }
    }

    /// Appends a single argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets a payload to be written to the child's stdin.
    #[must_use]
    pub fn with_stdin(mut self, payload: impl Into<String>) -> Self {
        self.stdin = Some(payload.into());
        self
    }

    /// Returns the program name.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Returns the argument list.
    #[must_use]
    pub fn argv(&self) -> &[String] {
        &self.args
    }

    /// Returns the stdin payload, if any.
    #[must_use]
    pub fn stdin(&self) -> Option<&str> {
        self.stdin.as_deref()
    }

    /// Renders the command the way it would read in a shell, for logs and
    /// fake-transcript matching. The stdin payload is not included.
    #[must_use]
    pub fn rendered(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}
