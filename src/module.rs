//! Unit descriptors produced by restore.
//!
//! A [`TestModule`] describes one runnable unit: one project built for one
//! target framework. A project that multi-targets three frameworks yields
//! three modules that share a `project_path` and differ in
//! `target_framework` and `runnable_path`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// One (project, target framework) pair ready to execute.
///
/// Modules are only constructed after restore of their owning project
/// succeeded and are never mutated afterwards.
///
/// # Example
///
/// ```
/// use dotnest::module::TestModule;
///
/// let module = TestModule::new(
///     "/src/App.Tests/bin/Debug/net8.0/App.Tests.dll",
///     "/src/App.Tests/App.Tests.csproj",
///     "net8.0",
/// )
/// .with_test_project(true)
/// .with_testing_platform_application(true);
///
/// assert!(module.is_queue_eligible());
/// assert_eq!(module.display_name(), "App.Tests (net8.0)");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TestModule {
    /// Built output artifact to execute (`TargetPath`).
    pub runnable_path: PathBuf,

    /// Absolute path of the originating project file.
    pub project_path: PathBuf,

    /// Single target framework moniker, e.g. `net8.0`. May be empty.
    pub target_framework: String,

    /// Run-configuration file, if the project declares one.
    pub run_settings_path: Option<PathBuf>,

    /// Whether the unit speaks the testing-platform protocol.
    pub is_testing_platform_application: bool,

    /// Whether the project is a test project at all.
    pub is_test_project: bool,
}

impl TestModule {
    /// Creates a module with both flags cleared and no run settings.
    pub fn new(
        runnable_path: impl Into<PathBuf>,
        project_path: impl Into<PathBuf>,
        target_framework: impl Into<String>,
    ) -> Self {
        Self {
            runnable_path: runnable_path.into(),
            project_path: project_path.into(),
            target_framework: target_framework.into(),
            run_settings_path: None,
            is_testing_platform_application: false,
            is_test_project: false,
        }
    }

    /// Sets the run-settings path.
    pub fn with_run_settings(mut self, path: impl Into<PathBuf>) -> Self {
        self.run_settings_path = Some(path.into());
        self
    }

    /// Sets the testing-platform flag.
    pub fn with_testing_platform_application(mut self, value: bool) -> Self {
        self.is_testing_platform_application = value;
        self
    }

    /// Sets the test-project flag.
    pub fn with_test_project(mut self, value: bool) -> Self {
        self.is_test_project = value;
        self
    }

    /// Returns `true` if this unit may be routed to the execution queue.
    ///
    /// Only test projects that are also testing-platform applications
    /// qualify.
    pub fn is_queue_eligible(&self) -> bool {
        self.is_test_project && self.is_testing_platform_application
    }

    /// Project file name without extension.
    pub fn project_name(&self) -> &str {
        self.project_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
    }

    /// Human-readable label used in logs and reports.
    pub fn display_name(&self) -> String {
        if self.target_framework.is_empty() {
            self.project_name().to_string()
        } else {
            format!("{} ({})", self.project_name(), self.target_framework)
        }
    }

    /// Directory containing the runnable artifact.
    pub fn output_dir(&self) -> Option<&Path> {
        self.runnable_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eligibility_requires_both_flags() {
        let base = TestModule::new("a.dll", "a.csproj", "net8.0");
        assert!(!base.is_queue_eligible());
        assert!(!base.clone().with_test_project(true).is_queue_eligible());
        assert!(
            !base
                .clone()
                .with_testing_platform_application(true)
                .is_queue_eligible()
        );
        assert!(
            base.with_test_project(true)
                .with_testing_platform_application(true)
                .is_queue_eligible()
        );
    }

    #[test]
    fn test_display_name_without_framework() {
        let module = TestModule::new("out/Lib.dll", "src/Lib/Lib.csproj", "");
        assert_eq!(module.display_name(), "Lib");
    }

    #[test]
    fn test_output_dir() {
        let module = TestModule::new("bin/Debug/net8.0/Lib.dll", "Lib.csproj", "net8.0");
        assert_eq!(module.output_dir(), Some(Path::new("bin/Debug/net8.0")));

        let bare = TestModule::new("Lib.dll", "Lib.csproj", "net8.0");
        assert_eq!(bare.output_dir(), None);
    }
}
