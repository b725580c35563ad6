//! Progress and summary reporting.
//!
//! A [`Reporter`] receives events as a session advances. Reporters are
//! shared with queue tasks behind an `Arc`, so every method takes `&self`.
//!
//! | Reporter | Output |
//! |----------|--------|
//! | [`ConsoleReporter`] | Progress bar, PASS/FAIL lines and a summary |
//! | [`NullReporter`] | Nothing |

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::module::TestModule;
use crate::orchestrator::{RestoreOutcome, RunResult, UnitOutcome, UnitResult};

/// Receives events during a session.
#[async_trait]
pub trait Reporter: Send + Sync {
    /// Called once restore has finished for the whole scope.
    async fn on_restore_complete(&self, outcome: &RestoreOutcome);

    /// Called when the batch is rejected by the eligibility gate.
    async fn on_batch_ineligible(&self, rejected: &TestModule);

    /// Called when a unit acquires a queue slot and starts.
    async fn on_unit_start(&self, module: &TestModule);

    /// Called when a unit finishes, whatever its outcome.
    async fn on_unit_complete(&self, result: &UnitResult);

    /// Called when every unit has finished.
    async fn on_run_complete(&self, result: &RunResult);
}

/// A reporter that does nothing (for testing or when output is not needed).
pub struct NullReporter;

#[async_trait]
impl Reporter for NullReporter {
    async fn on_restore_complete(&self, _outcome: &RestoreOutcome) {}
    async fn on_batch_ineligible(&self, _rejected: &TestModule) {}
    async fn on_unit_start(&self, _module: &TestModule) {}
    async fn on_unit_complete(&self, _result: &UnitResult) {}
    async fn on_run_complete(&self, _result: &RunResult) {}
}

/// Console reporter that shows progress in the terminal.
pub struct ConsoleReporter {
    progress: Mutex<Option<ProgressBar>>,
    verbose: bool,
}

impl ConsoleReporter {
    /// Create a new console reporter.
    ///
    /// With `verbose`, passing units and unit starts are printed too.
    pub fn new(verbose: bool) -> Self {
        Self {
            progress: Mutex::new(None),
            verbose,
        }
    }

    fn progress(&self) -> std::sync::MutexGuard<'_, Option<ProgressBar>> {
        self.progress.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn println(&self, line: String) {
        match self.progress().as_ref() {
            Some(pb) => pb.println(line),
            None => println!("{}", line),
        }
    }
}

/// Colored, fixed-width label for an outcome.
pub fn outcome_label(outcome: UnitOutcome) -> console::StyledObject<&'static str> {
    match outcome {
        UnitOutcome::Passed => style("PASS").green(),
        UnitOutcome::Failed => style("FAIL").red(),
        UnitOutcome::ZeroTests => style("ZERO").yellow(),
        UnitOutcome::TimedOut => style("TIME").red().bold(),
        UnitOutcome::Error => style("ERR ").red().bold(),
        UnitOutcome::Cancelled => style("STOP").yellow(),
    }
}

#[async_trait]
impl Reporter for ConsoleReporter {
    async fn on_restore_complete(&self, outcome: &RestoreOutcome) {
        if outcome.restored {
            println!("Restored {} test modules", outcome.modules.len());
        } else {
            println!(
                "{} ({} modules from projects that restored)",
                style("Restore failed").red().bold(),
                outcome.modules.len()
            );
            return;
        }

        let pb = ProgressBar::new(outcome.modules.len() as u64);
        if let Ok(progress_style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
        {
            pb.set_style(progress_style.progress_chars("#>-"));
        }
        *self.progress() = Some(pb);
    }

    async fn on_batch_ineligible(&self, rejected: &TestModule) {
        if let Some(pb) = self.progress().take() {
            pb.finish_and_clear();
        }
        println!();
        println!(
            "{}",
            style("Test applications were not run.").yellow().bold()
        );
        println!(
            "  {} is not a testing-platform test application ({}).",
            rejected.display_name(),
            rejected.project_path.display()
        );
        println!(
            "  {}",
            style("Every project in scope must set IsTestProject and IsTestingPlatformApplication.")
                .dim()
        );
    }

    async fn on_unit_start(&self, module: &TestModule) {
        if self.verbose {
            self.println(format!("Running: {}", module.display_name()));
        }
    }

    async fn on_unit_complete(&self, result: &UnitResult) {
        if self.verbose || result.outcome != UnitOutcome::Passed {
            self.println(format!(
                "{} {}",
                outcome_label(result.outcome),
                result.module.display_name()
            ));
        }
        if let Some(pb) = self.progress().as_ref() {
            pb.inc(1);
        }
    }

    async fn on_run_complete(&self, result: &RunResult) {
        if let Some(pb) = self.progress().take() {
            pb.finish_and_clear();
        }
        print_summary(result);
    }
}

/// Prints a summary of unit results to the console.
///
/// Failed units are listed with their captured output.
pub fn print_summary(result: &RunResult) {
    println!();
    println!("Test Applications:");
    println!("  Total:    {}", result.total_units);
    println!("  Passed:   {}", style(result.passed).green());
    println!("  Failed:   {}", style(result.failed).red());

    if result.zero_tests > 0 {
        println!("  No tests: {}", style(result.zero_tests).yellow());
    }

    if result.not_run > 0 {
        println!("  Not Run:  {}", style(result.not_run).red().bold());
    }

    println!("  Duration: {:?}", result.duration);

    if result.success() {
        println!();
        println!("{}", style("All test applications passed!").green().bold());
        return;
    }

    println!();
    if result.failed == 0 {
        println!("{}", style("Some test applications did not run.").red().bold());
        return;
    }

    println!("{}", style("Some test applications failed.").red().bold());
    println!();
    println!("Failed:");
    for r in result.results.iter().filter(|r| r.outcome.is_failure()) {
        println!("  - {} [{}]", r.module.display_name(), outcome_label(r.outcome));
        if let Some(msg) = &r.error_message {
            println!("    {}", style(msg).dim());
        }
        if !r.stdout.is_empty() {
            println!();
            println!("    {}", style("stdout:").dim());
            for line in r.stdout.lines() {
                println!("      {}", line);
            }
        }
        if !r.stderr.is_empty() {
            println!();
            println!("    {}", style("stderr:").dim());
            for line in r.stderr.lines() {
                println!("      {}", line);
            }
        }
    }
}
