//! dotnest: parallel restore and test-application runner for .NET solutions.
//!
//! Given a solution or project, dotnest restores every project concurrently,
//! expands multi-targeted projects into one unit per target framework, and
//! runs the resulting test applications on a bounded worker pool.
//!
//! # Architecture
//!
//! The main components are:
//!
//! - **Discovery**: Resolve a path to a solution or project ([`discovery`])
//! - **Solution**: List the projects a solution references ([`solution`])
//! - **Evaluator**: Drive the build engine ([`evaluator`])
//! - **Orchestrator**: Restore, fan out, gate and execute ([`orchestrator`])
//! - **Host**: Run one test application ([`host`])
//! - **Report**: Progress and summary output ([`report`])
//!
//! # Example
//!
//! ```no_run
//! use std::num::NonZeroUsize;
//! use std::sync::Arc;
//! use dotnest::discovery::discover_scope;
//! use dotnest::evaluator::BuildEngineLock;
//! use dotnest::evaluator::dotnet::DotnetEvaluator;
//! use dotnest::host::local::LocalHostProvider;
//! use dotnest::orchestrator::{Orchestrator, RestoreOrchestrator};
//! use dotnest::report::ConsoleReporter;
//! use dotnest::solution::FileSolutionParser;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let scope = discover_scope(std::path::Path::new("."))?;
//!     let restore = RestoreOrchestrator::new(
//!         DotnetEvaluator::new("dotnet"),
//!         FileSolutionParser,
//!         Arc::new(BuildEngineLock::new()),
//!         NonZeroUsize::new(8).unwrap(),
//!     );
//!
//!     let orchestrator = Orchestrator::new(
//!         restore,
//!         LocalHostProvider::default(),
//!         Arc::new(ConsoleReporter::new(false)),
//!         4,
//!     );
//!     let outcome = orchestrator.run(&scope).await?;
//!     std::process::exit(outcome.exit_code());
//! }
//! ```

pub mod config;
pub mod discovery;
pub mod evaluator;
pub mod host;
pub mod module;
pub mod orchestrator;
pub mod report;
pub mod solution;

// Re-export commonly used types
pub use config::{Config, load_config};
pub use discovery::{BuildScope, discover_scope};
pub use module::TestModule;
pub use orchestrator::{Orchestrator, RestoreOrchestrator, RunResult, SessionOutcome};
pub use report::Reporter;
