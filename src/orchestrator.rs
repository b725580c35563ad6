//! Session orchestration: restore, gate, execute, report.
//!
//! This module ties the pipeline together. A session restores a solution
//! or project, turns the resulting modules into runnable units when the
//! whole batch qualifies, runs them on a bounded queue, and reports.
//!
//! # Architecture
//!
//! ```text
//!   BuildScope
//!       │
//!       │ resolve()                    (blocking worker threads)
//!       ▼
//!  RestoreOrchestrator ──► RestoreOutcome { modules, restored }
//!                                   │
//!                  restored = false │──► SessionOutcome::RestoreFailed
//!                                   ▼
//!                     build_eligible_units()
//!                                   │
//!                 Ineligible { .. } │──► SessionOutcome::Ineligible
//!                                   ▼
//!                     AllEligible(units)
//!                                   │ enqueue_into()
//!                                   ▼
//!                           ExecutionQueue           (tokio, max_parallel)
//!                                   │ wait_all()
//!                                   ▼
//!                              RunResult ──► Reporter
//!                                   │
//!                                   ▼
//!                     SessionOutcome::Completed
//! ```
//!
//! # Key Components
//!
//! - [`RestoreOrchestrator`]: Parallel restore and framework fan-out
//! - [`build_eligible_units`]: The all-or-nothing eligibility gate
//! - [`ExecutionQueue`]: Bounded parallel execution
//! - [`TestApplication`]: One unit bound to its host
//! - [`Orchestrator`]: The whole session

pub mod adapter;
pub mod queue;
pub mod restore;
pub mod runner;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::discovery::BuildScope;
use crate::evaluator::ProjectEvaluator;
use crate::host::HostProvider;
use crate::module::TestModule;
use crate::report::Reporter;
use crate::solution::SolutionParser;

pub use adapter::{Eligibility, build_eligible_units};
pub use queue::{DEFAULT_UNIT_TIMEOUT, ExecutionQueue};
pub use restore::{ModuleCollector, RestoreOrchestrator, RestoreOutcome};
pub use runner::{TestApplication, UnitOutcome, UnitResult};

/// Aggregated results of the execution phase.
///
/// # Exit Codes
///
/// | Code | Meaning |
/// |------|---------|
/// | 0 | Every unit passed or ran zero tests |
/// | 1 | Some units failed, timed out, errored, or did not run |
#[derive(Debug, Clone)]
pub struct RunResult {
    /// Number of units executed or scheduled.
    pub total_units: usize,

    /// Units that exited with code 0.
    pub passed: usize,

    /// Units that failed, timed out or could not run on their host.
    pub failed: usize,

    /// Units that ran but matched no tests.
    pub zero_tests: usize,

    /// Units that were cancelled or whose task was lost.
    pub not_run: usize,

    /// Wall-clock duration of the execution phase.
    pub duration: Duration,

    /// Individual unit results, in completion order.
    pub results: Vec<UnitResult>,
}

impl RunResult {
    /// Aggregates `results` for `total_units` scheduled units.
    ///
    /// Scheduled units without a result count as not run.
    pub fn from_results(total_units: usize, results: Vec<UnitResult>, duration: Duration) -> Self {
        let count = |outcome: UnitOutcome| results.iter().filter(|r| r.outcome == outcome).count();
        let passed = count(UnitOutcome::Passed);
        let zero_tests = count(UnitOutcome::ZeroTests);
        let cancelled = count(UnitOutcome::Cancelled);
        let failed = results.iter().filter(|r| r.outcome.is_failure()).count();
        let not_run = cancelled + total_units.saturating_sub(results.len());

        Self {
            total_units,
            passed,
            failed,
            zero_tests,
            not_run,
            duration,
            results,
        }
    }

    /// Returns `true` if nothing failed and every unit ran.
    ///
    /// # Example
    ///
    /// ```
    /// use dotnest::orchestrator::RunResult;
    /// use std::time::Duration;
    ///
    /// let result = RunResult::from_results(0, Vec::new(), Duration::ZERO);
    /// assert!(result.success());
    /// assert_eq!(result.exit_code(), 0);
    /// ```
    pub fn success(&self) -> bool {
        self.failed == 0 && self.not_run == 0
    }

    /// Returns an appropriate process exit code for this result.
    pub fn exit_code(&self) -> i32 {
        if self.success() { 0 } else { 1 }
    }
}

/// How a session ended.
#[derive(Debug, Clone)]
pub enum SessionOutcome {
    /// At least one project failed to restore; nothing ran.
    RestoreFailed(RestoreOutcome),

    /// The batch was not eligible for the queue; nothing ran.
    Ineligible {
        /// The first module that did not qualify.
        rejected: TestModule,
    },

    /// Units were executed.
    Completed(RunResult),
}

impl SessionOutcome {
    /// Process exit code for this outcome.
    ///
    /// | Code | Meaning |
    /// |------|---------|
    /// | 0 | Every unit passed |
    /// | 1 | A unit failed, could not run, or restore failed |
    /// | 2 | Batch not eligible for the queue |
    pub fn exit_code(&self) -> i32 {
        match self {
            SessionOutcome::RestoreFailed(_) => 1,
            SessionOutcome::Ineligible { .. } => 2,
            SessionOutcome::Completed(result) => result.exit_code(),
        }
    }
}

/// Runs a full session over one build scope.
///
/// # Type Parameters
///
/// - `E`: The build engine
/// - `S`: The solution reader
/// - `P`: The host provider
pub struct Orchestrator<E, S, P> {
    restore: Arc<RestoreOrchestrator<E, S>>,
    provider: P,
    reporter: Arc<dyn Reporter>,
    max_parallel: usize,
    unit_timeout: Duration,
    args: Arc<[String]>,
    cancellation: Option<CancellationToken>,
}

impl<E, S, P> Orchestrator<E, S, P>
where
    E: ProjectEvaluator + 'static,
    S: SolutionParser + 'static,
    P: HostProvider,
{
    /// Creates a session runner.
    ///
    /// # Arguments
    ///
    /// * `restore` - Restore stage, already configured with its parallelism
    /// * `provider` - Creates one host per unit
    /// * `reporter` - Receives progress events
    /// * `max_parallel` - Execution queue width, independent of restore
    pub fn new(
        restore: RestoreOrchestrator<E, S>,
        provider: P,
        reporter: Arc<dyn Reporter>,
        max_parallel: usize,
    ) -> Self {
        Self {
            restore: Arc::new(restore),
            provider,
            reporter,
            max_parallel,
            unit_timeout: DEFAULT_UNIT_TIMEOUT,
            args: Arc::from(Vec::new()),
            cancellation: None,
        }
    }

    /// Sets the per-unit timeout.
    pub fn with_unit_timeout(mut self, timeout: Duration) -> Self {
        self.unit_timeout = timeout;
        self
    }

    /// Arguments passed through to every test application.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = Arc::from(args);
        self
    }

    /// Stops running units when `token` is cancelled.
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Restores `scope` on blocking worker threads.
    ///
    /// # Errors
    ///
    /// Returns an error if the solution cannot be read.
    pub async fn restore(&self, scope: &BuildScope) -> anyhow::Result<RestoreOutcome> {
        let restore = Arc::clone(&self.restore);
        let scope_owned = scope.clone();
        let outcome = tokio::task::spawn_blocking(move || restore.resolve(&scope_owned))
            .await
            .context("Restore workers panicked")?
            .with_context(|| format!("Failed to read {}", scope.path().display()))?;
        Ok(outcome)
    }

    /// Runs the session.
    ///
    /// # Errors
    ///
    /// Returns an error if the solution cannot be read or a host cannot be
    /// created. Restore failures and ineligible batches are outcomes, not
    /// errors.
    pub async fn run(&self, scope: &BuildScope) -> anyhow::Result<SessionOutcome> {
        let restore = self.restore(scope).await?;
        self.reporter.on_restore_complete(&restore).await;

        if !restore.restored {
            warn!("Restore failed; no test applications will run");
            return Ok(SessionOutcome::RestoreFailed(restore));
        }

        let start = Instant::now();
        let modules = restore.modules;
        if modules.is_empty() {
            warn!("No test modules found in {}", scope.path().display());
        }

        let eligibility = build_eligible_units(&modules, Arc::clone(&self.args), &self.provider)
            .context("Failed to prepare test applications")?;

        let total_units = match &eligibility {
            Eligibility::AllEligible(units) => units.len(),
            Eligibility::Ineligible { rejected } => {
                warn!(
                    "{} is not a testing-platform test application; batch not queued",
                    rejected.display_name()
                );
                self.reporter.on_batch_ineligible(rejected).await;
                return Ok(SessionOutcome::Ineligible {
                    rejected: rejected.clone(),
                });
            }
        };

        let mut queue = ExecutionQueue::new(self.max_parallel, Arc::clone(&self.reporter))
            .with_unit_timeout(self.unit_timeout);
        if let Some(token) = &self.cancellation {
            queue = queue.with_cancellation_token(token.clone());
        }
        eligibility.enqueue_into(&mut queue);
        info!(
            "Running {} test applications, {} at a time",
            total_units,
            queue.max_parallel()
        );

        let results = queue.wait_all().await;
        let run_result = RunResult::from_results(total_units, results, start.elapsed());

        self.reporter.on_run_complete(&run_result).await;

        Ok(SessionOutcome::Completed(run_result))
    }
}
