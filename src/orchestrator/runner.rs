//! Runnable units: one test application bound to the host it runs on.
//!
//! A [`TestApplication`] is created by the adapter pass as soon as a module
//! is known to be eligible. From that moment it owns a host, and it
//! releases that host exactly once: after running, when cancelled before
//! running, or when dropped without ever running.
//!
//! # Command Line
//!
//! | Runnable | Command |
//! |----------|---------|
//! | `*.dll` | `dotnet exec <runnable> [args...]` |
//! | anything else | `<runnable> [args...]` |
//!
//! `--settings <file>` is appended when the module declares run settings
//! and the pass-through arguments do not already contain `--settings`.
//!
//! # Outcomes
//!
//! | Exit code | Outcome |
//! |-----------|---------|
//! | 0 | [`UnitOutcome::Passed`] |
//! | 8 | [`UnitOutcome::ZeroTests`] |
//! | other | [`UnitOutcome::Failed`] |

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::host::{Command, TestHost};
use crate::module::TestModule;

/// Program used to launch framework-dependent `.dll` outputs.
pub const DOTNET_EXECUTABLE: &str = "dotnet";

/// Exit code a testing-platform application returns when no test ran.
pub const EXIT_CODE_ZERO_TESTS: i32 = 8;

/// Argument that points a testing-platform application at run settings.
const SETTINGS_ARG: &str = "--settings";

/// Outcome of running one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitOutcome {
    /// The application exited with code 0.
    Passed,
    /// The application reported test failures.
    Failed,
    /// The application ran but no test matched.
    ZeroTests,
    /// The unit exceeded its timeout and was stopped.
    TimedOut,
    /// The host could not run the application.
    Error,
    /// The run was cancelled before the unit finished.
    Cancelled,
}

impl UnitOutcome {
    /// Maps a process exit code to an outcome.
    pub fn from_exit_code(code: i32) -> Self {
        match code {
            0 => UnitOutcome::Passed,
            EXIT_CODE_ZERO_TESTS => UnitOutcome::ZeroTests,
            _ => UnitOutcome::Failed,
        }
    }

    /// Returns `true` for outcomes that fail the run.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            UnitOutcome::Failed | UnitOutcome::TimedOut | UnitOutcome::Error
        )
    }
}

/// Result of running one unit.
#[derive(Debug, Clone)]
pub struct UnitResult {
    /// The module that ran.
    pub module: TestModule,

    /// How the unit ended.
    pub outcome: UnitOutcome,

    /// Process exit code, when the process ran to completion.
    pub exit_code: Option<i32>,

    /// Wall-clock duration including host setup.
    pub duration: Duration,

    /// Captured standard output.
    pub stdout: String,

    /// Captured standard error.
    pub stderr: String,

    /// Error description for non-process failures.
    pub error_message: Option<String>,
}

impl UnitResult {
    fn without_output(module: TestModule, outcome: UnitOutcome, duration: Duration) -> Self {
        Self {
            module,
            outcome,
            exit_code: None,
            duration,
            stdout: String::new(),
            stderr: String::new(),
            error_message: None,
        }
    }
}

/// A test application ready to run on its own host.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use tokio_util::sync::CancellationToken;
/// use dotnest::host::HostProvider;
/// use dotnest::host::local::LocalHostProvider;
/// use dotnest::module::TestModule;
/// use dotnest::orchestrator::TestApplication;
///
/// # async fn example() -> anyhow::Result<()> {
/// let module = TestModule::new("bin/net8.0/App.Tests.dll", "App.Tests.csproj", "net8.0");
/// let host = LocalHostProvider::default().create_host(&module)?;
/// let args: Arc<[String]> = Arc::from(vec!["--minimum-expected-tests".to_string(), "1".to_string()]);
///
/// let unit = TestApplication::new(module, host, args);
/// let result = unit.run(Duration::from_secs(600), &CancellationToken::new()).await;
/// println!("{:?}", result.outcome);
/// # Ok(())
/// # }
/// ```
pub struct TestApplication<H: TestHost> {
    module: TestModule,
    args: Arc<[String]>,
    host: Option<H>,
}

impl<H: TestHost> TestApplication<H> {
    /// Binds `module` to `host`. The unit now owns the host.
    pub fn new(module: TestModule, host: H, args: Arc<[String]>) -> Self {
        Self {
            module,
            args,
            host: Some(host),
        }
    }

    /// The module this unit runs.
    pub fn module(&self) -> &TestModule {
        &self.module
    }

    /// Returns `true` until the host has been released.
    pub fn holds_host(&self) -> bool {
        self.host.is_some()
    }

    /// Builds the command line for this unit.
    pub fn command(&self) -> Command {
        let runnable = self.module.runnable_path.to_string_lossy().into_owned();
        let is_dll = self
            .module
            .runnable_path
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("dll"));

        let mut cmd = if is_dll {
            Command::new(DOTNET_EXECUTABLE).arg("exec").arg(runnable)
        } else {
            Command::new(runnable)
        };
        cmd = cmd.args(self.args.iter().cloned());

        if let Some(settings) = &self.module.run_settings_path
            && !self.args.iter().any(|a| a == SETTINGS_ARG)
        {
            cmd = cmd
                .arg(SETTINGS_ARG)
                .arg(settings.to_string_lossy().into_owned());
        }

        if let Some(dir) = self.module.output_dir() {
            cmd = cmd.working_dir(dir.to_string_lossy().into_owned());
        }

        cmd
    }

    /// Runs the unit and releases its host.
    ///
    /// Stops early with [`UnitOutcome::TimedOut`] after `timeout`, or with
    /// [`UnitOutcome::Cancelled`] when `cancel` fires.
    pub async fn run(mut self, timeout: Duration, cancel: &CancellationToken) -> UnitResult {
        let start = Instant::now();
        let cmd = self.command();
        let module = self.module.clone();

        let Some(host) = self.host.as_mut() else {
            let mut result = UnitResult::without_output(module, UnitOutcome::Error, start.elapsed());
            result.error_message = Some("host already released".to_string());
            return result;
        };

        debug!("[{}] Running {}", host.id(), module.display_name());

        let result = select! {
            biased;
            _ = cancel.cancelled() => {
                UnitResult::without_output(module, UnitOutcome::Cancelled, start.elapsed())
            }
            exec = tokio::time::timeout(timeout, host.exec(&cmd)) => match exec {
                Ok(Ok(exec)) => UnitResult {
                    outcome: UnitOutcome::from_exit_code(exec.exit_code),
                    exit_code: Some(exec.exit_code),
                    duration: start.elapsed(),
                    stdout: exec.stdout,
                    stderr: exec.stderr,
                    error_message: None,
                    module,
                },
                Ok(Err(e)) => {
                    let mut result =
                        UnitResult::without_output(module, UnitOutcome::Error, start.elapsed());
                    result.error_message = Some(e.to_string());
                    result
                }
                Err(_) => {
                    let mut result =
                        UnitResult::without_output(module, UnitOutcome::TimedOut, start.elapsed());
                    result.error_message = Some(format!("timed out after {:?}", timeout));
                    result
                }
            },
        };

        self.release();
        result
    }

    /// Releases the host without running. Used for units that never start.
    pub fn cancel(mut self) -> UnitResult {
        self.release();
        UnitResult::without_output(self.module.clone(), UnitOutcome::Cancelled, Duration::ZERO)
    }

    /// Releases the host if this unit still holds it.
    pub fn release(&mut self) {
        if let Some(mut host) = self.host.take() {
            debug!("Releasing host {} for {}", host.id(), self.module.display_name());
            host.release();
        }
    }
}

impl<H: TestHost> Drop for TestApplication<H> {
    fn drop(&mut self) {
        self.release();
    }
}
