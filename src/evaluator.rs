//! Project evaluation and build-engine access.
//!
//! This module defines the boundary to the external build engine. The
//! engine loads a project file, reports evaluated property values, accepts
//! property mutations followed by an explicit re-evaluation, and runs build
//! targets such as `Restore`.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     ProjectEvaluator                         │
//! │                                                              │
//! │  load(path) ────────────────► Project                        │
//! │  get_property(&Project, name) ─► String                      │
//! │  set_property(&mut Project, name, value)                     │
//! │  reevaluate(&mut Project)                                    │
//! │  build(&mut Project, targets, loggers) ─► BuildResult        │
//! └─────────────────────────────────────────────────────────────┘
//!                                 │
//!                  build() only while holding
//!                                 ▼
//!                         BuildEngineLock
//! ```
//!
//! Loading and property reads may run concurrently for distinct projects.
//! The engine is not safe for concurrent builds, so callers serialize every
//! [`ProjectEvaluator::build`] call through a shared [`BuildEngineLock`].
//!
//! # Implementations
//!
//! | Implementation | Engine |
//! |----------------|--------|
//! | [`dotnet::DotnetEvaluator`] | `dotnet msbuild` child processes |

pub mod dotnet;

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// Result type for evaluator operations.
pub type EvaluatorResult<T> = Result<T, EvaluatorError>;

/// Errors raised by the build engine boundary.
///
/// A build that runs and reports failure is NOT an error; it is a
/// [`BuildResult`] with `success == false`. These errors mean the engine
/// could not be driven at all.
#[derive(Debug, thiserror::Error)]
pub enum EvaluatorError {
    /// The project file does not exist.
    #[error("Project file not found: {}", .0.display())]
    ProjectNotFound(PathBuf),

    /// The engine failed to evaluate the project.
    #[error("Failed to evaluate {}: {message}", .path.display())]
    EvaluationFailed { path: PathBuf, message: String },

    /// The engine produced output that could not be interpreted.
    #[error("Failed to parse evaluation output: {0}")]
    ParseError(String),

    /// The engine process could not be started.
    #[error("Build engine invocation failed: {0}")]
    ExecFailed(String),

    /// I/O error talking to the engine.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Evaluated property names consumed by restore.
pub mod properties {
    /// Whether the project builds a testing-platform application.
    pub const IS_TESTING_PLATFORM_APPLICATION: &str = "IsTestingPlatformApplication";
    /// Whether the project is a test project.
    pub const IS_TEST_PROJECT: &str = "IsTestProject";
    /// Single target framework; also the property set during fan-out.
    pub const TARGET_FRAMEWORK: &str = "TargetFramework";
    /// `;`-joined target frameworks of a multi-targeted project.
    pub const TARGET_FRAMEWORKS: &str = "TargetFrameworks";
    /// Built output artifact.
    pub const TARGET_PATH: &str = "TargetPath";
    /// Absolute project file path.
    pub const PROJECT_FULL_PATH: &str = "MSBuildProjectFullPath";
    /// Run-configuration file.
    pub const RUN_SETTINGS_PATH: &str = "RunSettingsFilePath";

    /// Every property restore reads back.
    pub const ALL: [&str; 7] = [
        IS_TESTING_PLATFORM_APPLICATION,
        IS_TEST_PROJECT,
        TARGET_FRAMEWORK,
        TARGET_FRAMEWORKS,
        TARGET_PATH,
        PROJECT_FULL_PATH,
        RUN_SETTINGS_PATH,
    ];
}

/// Target that restores a project's dependencies.
pub const RESTORE_TARGET: &str = "Restore";

/// File name of the structured binary log written when diagnostics are on.
pub const DIAGNOSTIC_BINLOG: &str = "msbuild.binlog";

/// Log sinks attached to a build invocation.
///
/// The quiet console sink is always present. A binary log sink is attached
/// only when diagnostics are enabled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildLoggers {
    /// Where to write the binary log, if enabled.
    pub binlog: Option<PathBuf>,
}

impl BuildLoggers {
    /// Loggers for a build, optionally with the diagnostic binary log.
    ///
    /// # Example
    ///
    /// ```
    /// use dotnest::evaluator::{BuildLoggers, DIAGNOSTIC_BINLOG};
    ///
    /// assert!(BuildLoggers::new(false).binlog.is_none());
    /// assert_eq!(
    ///     BuildLoggers::new(true).binlog.unwrap().to_str(),
    ///     Some(DIAGNOSTIC_BINLOG)
    /// );
    /// ```
    pub fn new(enable_diagnostic_log: bool) -> Self {
        Self {
            binlog: enable_diagnostic_log.then(|| PathBuf::from(DIAGNOSTIC_BINLOG)),
        }
    }
}

/// Outcome of a build invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildResult {
    /// Whether every requested target succeeded.
    pub success: bool,
}

/// Mutual-exclusion guard for the shared build engine.
///
/// One instance is shared (behind an `Arc`) by every worker that talks to
/// the same engine. Hold it only around the build itself, never around
/// loading or property reads.
///
/// # Example
///
/// ```
/// use dotnest::evaluator::BuildEngineLock;
///
/// let lock = BuildEngineLock::new();
/// let value = lock.serialize(|| 42);
/// assert_eq!(value, 42);
/// ```
#[derive(Debug, Default)]
pub struct BuildEngineLock {
    inner: Mutex<()>,
}

impl BuildEngineLock {
    /// Creates an unlocked guard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` while holding the engine lock.
    ///
    /// A poisoned lock is recovered: the guarded state is `()`, so a panic
    /// in a previous holder cannot leave it inconsistent.
    pub fn serialize<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f()
    }
}

/// Access to a project-evaluating build engine.
///
/// Implementations must be `Send + Sync`; restore shares one evaluator
/// across its worker threads. `Project` is the engine's per-project handle
/// and is owned by one worker at a time.
///
/// Property reads never fail. A property the engine does not define reads
/// as the empty string.
pub trait ProjectEvaluator: Send + Sync {
    /// Loaded, evaluated project handle.
    type Project: Send;

    /// Loads and evaluates the project at `path`.
    fn load(&self, path: &Path) -> EvaluatorResult<Self::Project>;

    /// Reads an evaluated property from the current evaluation.
    fn get_property(&self, project: &Self::Project, name: &str) -> String;

    /// Sets a global property. Takes effect on the next [`reevaluate`](Self::reevaluate).
    fn set_property(&self, project: &mut Self::Project, name: &str, value: &str);

    /// Recomputes every evaluated property from the current global properties.
    fn reevaluate(&self, project: &mut Self::Project) -> EvaluatorResult<()>;

    /// Runs `targets` against the project.
    ///
    /// Callers must hold the [`BuildEngineLock`] for the duration of the call.
    fn build(
        &self,
        project: &mut Self::Project,
        targets: &[&str],
        loggers: &BuildLoggers,
    ) -> EvaluatorResult<BuildResult>;
}

/// Parses a boolean property the way the engine's own conditions do.
///
/// Comparison is case-insensitive and ignores surrounding whitespace.
/// Anything other than `true`/`false` reads as `false`.
///
/// # Example
///
/// ```
/// use dotnest::evaluator::parse_bool_property;
///
/// assert!(parse_bool_property(" True "));
/// assert!(!parse_bool_property("yes"));
/// assert!(!parse_bool_property(""));
/// ```
pub fn parse_bool_property(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}

/// Splits a `;`-joined framework list, dropping empty segments.
///
/// # Example
///
/// ```
/// use dotnest::evaluator::split_target_frameworks;
///
/// assert_eq!(
///     split_target_frameworks("net8.0;; net9.0 ;"),
///     vec!["net8.0", "net9.0"]
/// );
/// assert!(split_target_frameworks("").is_empty());
/// ```
pub fn split_target_frameworks(value: &str) -> Vec<&str> {
    value
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}
