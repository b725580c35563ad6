//! Test hosts: the execution resource each runnable unit owns.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       HostProvider                           │
//! │  create_host(&TestModule) ──────► TestHost                   │
//! └────────────────────────────────┼────────────────────────────┘
//!                                  ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         TestHost                             │
//! │  exec(Command) ───► ExecResult                               │
//! │  release()          (called exactly once by the owner)       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! A host is created when a module is wrapped into a runnable unit, before
//! anything executes. The unit that owns it calls
//! [`release`](TestHost::release) exactly once, whether the host ran, failed,
//! was cancelled, or never ran at all.
//!
//! # Built-in Providers
//!
//! | Provider | Module | Description |
//! |----------|--------|-------------|
//! | Local | [`local`] | Runs test applications as local child processes |

pub mod local;

use std::sync::Arc;

use async_trait::async_trait;

use crate::module::TestModule;

/// Result type for host operations.
pub type HostResult<T> = Result<T, HostError>;

/// Errors that can occur while creating or driving a host.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// Failed to create a host for a module.
    #[error("Failed to create host: {0}")]
    CreateFailed(String),

    /// Failed to start or communicate with the test process.
    ///
    /// A process that runs and exits non-zero is NOT an error.
    #[error("Failed to execute command: {0}")]
    ExecFailed(String),

    /// The host was used after release.
    #[error("Host already released: {0}")]
    Released(String),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A command to execute on a host.
///
/// # Example
///
/// ```
/// use dotnest::host::Command;
///
/// let cmd = Command::new("dotnet")
///     .arg("exec")
///     .arg("bin/Debug/net8.0/App.Tests.dll")
///     .args(["--filter", "Category=Fast"])
///     .working_dir("bin/Debug/net8.0")
///     .env("DOTNET_NOLOGO", "1");
///
/// assert_eq!(cmd.program, "dotnet");
/// assert_eq!(cmd.args.len(), 4);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// The program to run.
    pub program: String,

    /// Arguments passed to the program.
    pub args: Vec<String>,

    /// Working directory. `None` inherits the host's default.
    pub working_dir: Option<String>,

    /// Environment variables layered over the host environment.
    pub env: Vec<(String, String)>,
}

impl Command {
    /// Creates a new command for `program`.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            env: Vec::new(),
        }
    }

    /// Adds a single argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Adds multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets the working directory.
    pub fn working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Adds an environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Renders the command as a shell-quoted string for logging.
    ///
    /// # Example
    ///
    /// ```
    /// use dotnest::host::Command;
    /// let cmd = Command::new("dotnet").arg("exec").arg("My Tests.dll");
    /// assert_eq!(cmd.to_shell_string(), "dotnet exec 'My Tests.dll'");
    /// ```
    pub fn to_shell_string(&self) -> String {
        std::iter::once(&self.program)
            .chain(&self.args)
            .map(|s| shell_words::quote(s).into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Result of executing a command on a host.
#[derive(Debug, Clone)]
pub struct ExecResult {
    /// Process exit code. `-1` when the process was killed by a signal.
    pub exit_code: i32,

    /// Captured standard output.
    pub stdout: String,

    /// Captured standard error.
    pub stderr: String,

    /// Wall-clock execution time.
    pub duration: std::time::Duration,
}

impl ExecResult {
    /// Returns `true` if the process exited with code 0.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// A single line of output from a running command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputLine {
    /// A line from standard output.
    Stdout(String),
    /// A line from standard error.
    Stderr(String),
}

/// Callback invoked for each output line as it is produced.
///
/// Receives the unit's display name and the line.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use dotnest::host::{OutputCallback, OutputLine};
///
/// let callback: OutputCallback = Arc::new(|unit, line| match line {
///     OutputLine::Stdout(s) => println!("[{}] {}", unit, s),
///     OutputLine::Stderr(s) => eprintln!("[{}] {}", unit, s),
/// });
/// ```
pub type OutputCallback = Arc<dyn Fn(&str, &OutputLine) + Send + Sync>;

/// An execution resource owned by exactly one runnable unit.
#[async_trait]
pub trait TestHost: Send {
    /// Unique identifier, used for logging.
    fn id(&self) -> &str;

    /// Runs `cmd` to completion and captures its output.
    async fn exec(&mut self, cmd: &Command) -> HostResult<ExecResult>;

    /// Releases everything the host holds.
    ///
    /// Synchronous so it can run from `Drop`. Owners call it exactly once.
    fn release(&mut self);
}

/// Factory for [`TestHost`]s.
///
/// Providers are shared by reference while wrapping modules into units, so
/// they must be `Send + Sync`.
pub trait HostProvider: Send + Sync {
    /// The host type this provider creates.
    type Host: TestHost + 'static;

    /// Creates a host dedicated to `module`.
    fn create_host(&self, module: &TestModule) -> HostResult<Self::Host>;
}
