//! Parallel restore and multi-targeting fan-out.
//!
//! The [`RestoreOrchestrator`] turns a [`BuildScope`] into the set of
//! [`TestModule`]s it contains plus one aggregate restore verdict.
//!
//! # Per-project flow
//!
//! ```text
//!  load(path)                       concurrent across workers
//!      │
//!      ▼
//!  build(["Restore"])               serialized by BuildEngineLock
//!      │ failure ──► (no modules, restored = false)
//!      ▼
//!  reevaluate()                     restore-generated imports appear
//!      │
//!      ▼
//!  TargetFrameworks empty? ── yes ─► 1 module (TargetFramework verbatim)
//!      │ no
//!      ▼
//!  for tfm in TargetFrameworks:     list order preserved
//!      set TargetFramework = tfm
//!      reevaluate()
//!      read TargetPath ──────────► 1 module per tfm
//! ```
//!
//! # Concurrency
//!
//! Solutions fan out over a fixed number of worker threads. Each worker
//! pulls the next project index from a shared cursor, keeps a local
//! AND of its projects' outcomes, and folds it into the shared verdict
//! once when it runs out of work. Modules from all workers land in a
//! [`ModuleCollector`]; their order across projects is unspecified.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info, warn};

use crate::discovery::BuildScope;
use crate::evaluator::{
    BuildEngineLock, BuildLoggers, EvaluatorResult, ProjectEvaluator, RESTORE_TARGET,
    parse_bool_property, properties, split_target_frameworks,
};
use crate::module::TestModule;
use crate::solution::{SolutionError, SolutionParser};

/// Modules discovered by restore and the aggregate verdict.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreOutcome {
    /// Every module of every project that restored, in collection order.
    pub modules: Vec<TestModule>,

    /// `true` only if every project in scope restored.
    pub restored: bool,
}

/// Append-only module sink shared by restore workers.
#[derive(Debug, Default)]
pub struct ModuleCollector {
    modules: Mutex<Vec<TestModule>>,
}

impl ModuleCollector {
    /// Creates an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends all of `modules`, keeping their relative order.
    pub fn extend(&self, modules: Vec<TestModule>) {
        if modules.is_empty() {
            return;
        }
        self.modules
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(modules);
    }

    /// Returns the number of collected modules.
    pub fn len(&self) -> usize {
        self.modules
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if nothing was collected.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consumes the collector and returns its modules.
    pub fn into_modules(self) -> Vec<TestModule> {
        self.modules
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Restores projects and expands them into modules.
///
/// # Type Parameters
///
/// - `E`: the build engine ([`ProjectEvaluator`])
/// - `S`: the solution reader ([`SolutionParser`])
///
/// # Example
///
/// ```no_run
/// use std::num::NonZeroUsize;
/// use std::sync::Arc;
/// use dotnest::discovery::discover_scope;
/// use dotnest::evaluator::BuildEngineLock;
/// use dotnest::evaluator::dotnet::DotnetEvaluator;
/// use dotnest::orchestrator::RestoreOrchestrator;
/// use dotnest::solution::FileSolutionParser;
///
/// let scope = discover_scope(std::path::Path::new("."))?;
/// let orchestrator = RestoreOrchestrator::new(
///     DotnetEvaluator::new("dotnet"),
///     FileSolutionParser,
///     Arc::new(BuildEngineLock::new()),
///     NonZeroUsize::new(8).unwrap(),
/// );
///
/// let outcome = orchestrator.resolve(&scope)?;
/// println!("{} modules, restored: {}", outcome.modules.len(), outcome.restored);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct RestoreOrchestrator<E, S> {
    evaluator: E,
    solution_parser: S,
    engine_lock: Arc<BuildEngineLock>,
    degree_of_parallelism: NonZeroUsize,
    loggers: BuildLoggers,
}

impl<E, S> RestoreOrchestrator<E, S>
where
    E: ProjectEvaluator,
    S: SolutionParser,
{
    /// Creates an orchestrator restoring up to `degree_of_parallelism`
    /// projects at once.
    pub fn new(
        evaluator: E,
        solution_parser: S,
        engine_lock: Arc<BuildEngineLock>,
        degree_of_parallelism: NonZeroUsize,
    ) -> Self {
        Self {
            evaluator,
            solution_parser,
            engine_lock,
            degree_of_parallelism,
            loggers: BuildLoggers::default(),
        }
    }

    /// Attaches the diagnostic binary log to every restore.
    pub fn with_diagnostic_log(mut self, enable: bool) -> Self {
        self.loggers = BuildLoggers::new(enable);
        self
    }

    /// Returns the underlying evaluator.
    pub fn evaluator(&self) -> &E {
        &self.evaluator
    }

    /// Restores everything in `scope`.
    ///
    /// Restore failures are reported through [`RestoreOutcome::restored`].
    ///
    /// # Errors
    ///
    /// Returns an error only if the solution itself cannot be read.
    pub fn resolve(&self, scope: &BuildScope) -> Result<RestoreOutcome, SolutionError> {
        match scope {
            BuildScope::Project(path) => {
                let (modules, restored) = self.evaluate_one(path);
                Ok(RestoreOutcome { modules, restored })
            }
            BuildScope::Solution(path) => {
                let projects = self.solution_parser.list_projects(path)?;
                info!(
                    "Restoring {} projects from {}",
                    projects.len(),
                    path.display()
                );
                Ok(self.restore_all(&projects))
            }
        }
    }

    /// Restores `projects` on a fixed pool of worker threads.
    ///
    /// Workers are capped at the project count; an empty list restores
    /// trivially.
    pub fn restore_all(&self, projects: &[PathBuf]) -> RestoreOutcome {
        let workers = self.degree_of_parallelism.get().min(projects.len());
        let cursor = AtomicUsize::new(0);
        let collector = ModuleCollector::new();
        let verdict = Mutex::new(true);

        debug!(
            "Restoring {} projects on {} workers",
            projects.len(),
            workers
        );

        std::thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| {
                    let mut local = true;
                    while let Some(path) = projects.get(cursor.fetch_add(1, Ordering::Relaxed)) {
                        let (modules, restored) = self.evaluate_one(path);
                        local &= restored;
                        collector.extend(modules);
                    }
                    *verdict.lock().unwrap_or_else(PoisonError::into_inner) &= local;
                });
            }
        });

        RestoreOutcome {
            modules: collector.into_modules(),
            restored: verdict.into_inner().unwrap_or_else(PoisonError::into_inner),
        }
    }

    /// Restores one project and expands it into modules.
    ///
    /// Returns no modules and `false` if the project could not be loaded,
    /// restored, or re-evaluated.
    pub fn evaluate_one(&self, path: &Path) -> (Vec<TestModule>, bool) {
        match self.try_evaluate_one(path) {
            Ok(Some(modules)) => {
                debug!("{}: {} module(s)", path.display(), modules.len());
                (modules, true)
            }
            Ok(None) => {
                warn!("Restore failed for {}", path.display());
                (Vec::new(), false)
            }
            Err(e) => {
                warn!("Could not restore {}: {}", path.display(), e);
                (Vec::new(), false)
            }
        }
    }

    fn try_evaluate_one(&self, path: &Path) -> EvaluatorResult<Option<Vec<TestModule>>> {
        let evaluator = &self.evaluator;
        let mut project = evaluator.load(path)?;

        let result = self.engine_lock.serialize(|| {
            evaluator.build(&mut project, &[RESTORE_TARGET], &self.loggers)
        })?;
        if !result.success {
            return Ok(None);
        }

        evaluator.reevaluate(&mut project)?;

        let read = |project: &E::Project, name: &str| evaluator.get_property(project, name);

        let is_testing_platform_application =
            parse_bool_property(&read(&project, properties::IS_TESTING_PLATFORM_APPLICATION));
        let is_test_project = parse_bool_property(&read(&project, properties::IS_TEST_PROJECT));
        let target_framework = read(&project, properties::TARGET_FRAMEWORK);
        let target_frameworks = read(&project, properties::TARGET_FRAMEWORKS);
        let project_path = PathBuf::from(read(&project, properties::PROJECT_FULL_PATH));
        let run_settings_path = Some(read(&project, properties::RUN_SETTINGS_PATH))
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        let module = |runnable_path: String, target_framework: String| TestModule {
            runnable_path: PathBuf::from(runnable_path),
            project_path: project_path.clone(),
            target_framework,
            run_settings_path: run_settings_path.clone(),
            is_testing_platform_application,
            is_test_project,
        };

        let frameworks = split_target_frameworks(&target_frameworks);
        if frameworks.is_empty() {
            let runnable_path = read(&project, properties::TARGET_PATH);
            return Ok(Some(vec![module(runnable_path, target_framework)]));
        }

        let mut modules = Vec::with_capacity(frameworks.len());
        for framework in frameworks {
            evaluator.set_property(&mut project, properties::TARGET_FRAMEWORK, framework);
            evaluator.reevaluate(&mut project)?;
            let runnable_path = read(&project, properties::TARGET_PATH);
            modules.push(module(runnable_path, framework.to_string()));
        }

        Ok(Some(modules))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeEvaluator, FakeProject, FakeSolutionParser};

    fn orchestrator(
        evaluator: FakeEvaluator,
        solution: FakeSolutionParser,
        dop: usize,
    ) -> RestoreOrchestrator<FakeEvaluator, FakeSolutionParser> {
        RestoreOrchestrator::new(
            evaluator,
            solution,
            Arc::new(BuildEngineLock::new()),
            NonZeroUsize::new(dop).unwrap(),
        )
    }

    fn sorted(mut modules: Vec<TestModule>) -> Vec<TestModule> {
        modules.sort();
        modules
    }

    #[test]
    fn test_single_framework_project() {
        let evaluator = FakeEvaluator::new().with_project(
            FakeProject::new("/src/A/A.csproj")
                .single_framework("net8.0")
                .test_project(true)
                .testing_platform(true),
        );
        let orch = orchestrator(evaluator, FakeSolutionParser::default(), 4);

        let outcome = orch
            .resolve(&BuildScope::Project("/src/A/A.csproj".into()))
            .unwrap();

        assert!(outcome.restored);
        assert_eq!(
            outcome.modules,
            vec![
                TestModule::new("/src/A/bin/net8.0/A.dll", "/src/A/A.csproj", "net8.0")
                    .with_test_project(true)
                    .with_testing_platform_application(true)
            ]
        );
    }

    #[test]
    fn test_single_framework_kept_verbatim() {
        let evaluator = FakeEvaluator::new()
            .with_project(FakeProject::new("/src/A/A.csproj").single_framework(" net8.0-windows "));
        let orch = orchestrator(evaluator, FakeSolutionParser::default(), 1);

        let (modules, restored) = orch.evaluate_one(Path::new("/src/A/A.csproj"));
        assert!(restored);
        assert_eq!(modules.len(), 1);
        assert_eq!(modules[0].target_framework, " net8.0-windows ");
    }

    #[test]
    fn test_multi_target_fan_out() {
        let evaluator = FakeEvaluator::new().with_project(
            FakeProject::new("/src/A/A.csproj")
                .frameworks(&["net8.0", "net9.0"])
                .test_project(true)
                .testing_platform(true)
                .run_settings("/src/A/test.runsettings"),
        );
        let orch = orchestrator(evaluator, FakeSolutionParser::default(), 2);

        let (modules, restored) = orch.evaluate_one(Path::new("/src/A/A.csproj"));

        assert!(restored);
        assert_eq!(modules.len(), 2);
        assert_eq!(modules[0].target_framework, "net8.0");
        assert_eq!(modules[1].target_framework, "net9.0");
        assert_eq!(
            modules[0].runnable_path,
            PathBuf::from("/src/A/bin/net8.0/A.dll")
        );
        assert_eq!(
            modules[1].runnable_path,
            PathBuf::from("/src/A/bin/net9.0/A.dll")
        );
        for module in &modules {
            assert_eq!(module.project_path, PathBuf::from("/src/A/A.csproj"));
            assert_eq!(
                module.run_settings_path,
                Some(PathBuf::from("/src/A/test.runsettings"))
            );
            assert!(module.is_queue_eligible());
        }
    }

    #[test]
    fn test_fan_out_uses_reevaluated_target_path() {
        // Without reevaluation every framework would see the default TargetPath.
        let evaluator = FakeEvaluator::new()
            .with_project(FakeProject::new("/src/A/A.csproj").frameworks(&["net9.0", "net472"]));
        let orch = orchestrator(evaluator, FakeSolutionParser::default(), 1);

        let (modules, _) = orch.evaluate_one(Path::new("/src/A/A.csproj"));
        let paths: Vec<_> = modules.iter().map(|m| m.runnable_path.clone()).collect();
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/src/A/bin/net9.0/A.dll"),
                PathBuf::from("/src/A/bin/net472/A.dll"),
            ]
        );
    }

    #[test]
    fn test_framework_list_drops_empty_segments() {
        let evaluator = FakeEvaluator::new()
            .with_project(FakeProject::new("/src/A/A.csproj").raw_frameworks(";net8.0;;net9.0;"));
        let orch = orchestrator(evaluator, FakeSolutionParser::default(), 1);

        let (modules, _) = orch.evaluate_one(Path::new("/src/A/A.csproj"));
        assert_eq!(modules.len(), 2);
    }

    #[test]
    fn test_malformed_booleans_default_false() {
        let evaluator = FakeEvaluator::new().with_project(
            FakeProject::new("/src/A/A.csproj")
                .single_framework("net8.0")
                .property(properties::IS_TEST_PROJECT, "maybe")
                .property(properties::IS_TESTING_PLATFORM_APPLICATION, "1"),
        );
        let orch = orchestrator(evaluator, FakeSolutionParser::default(), 1);

        let (modules, restored) = orch.evaluate_one(Path::new("/src/A/A.csproj"));
        assert!(restored);
        assert!(!modules[0].is_test_project);
        assert!(!modules[0].is_testing_platform_application);
        assert_eq!(modules[0].run_settings_path, None);
    }

    #[test]
    fn test_restore_failure_yields_nothing() {
        let evaluator = FakeEvaluator::new().with_project(
            FakeProject::new("/src/A/A.csproj")
                .frameworks(&["net8.0", "net9.0"])
                .restore_fails(),
        );
        let orch = orchestrator(evaluator, FakeSolutionParser::default(), 1);

        let outcome = orch
            .resolve(&BuildScope::Project("/src/A/A.csproj".into()))
            .unwrap();
        assert!(!outcome.restored);
        assert!(outcome.modules.is_empty());
    }

    #[test]
    fn test_unknown_project_is_not_restored() {
        let orch = orchestrator(FakeEvaluator::new(), FakeSolutionParser::default(), 1);
        let (modules, restored) = orch.evaluate_one(Path::new("/missing.csproj"));
        assert!(!restored);
        assert!(modules.is_empty());
        assert_eq!(orch.evaluator().build_count(), 0);
    }

    #[test]
    fn test_failed_reevaluation_drops_project() {
        let evaluator = FakeEvaluator::new().with_project(
            FakeProject::new("/src/A/A.csproj")
                .frameworks(&["net8.0", "net9.0"])
                .reevaluation_fails_for("net9.0"),
        );
        let orch = orchestrator(evaluator, FakeSolutionParser::default(), 1);

        let (modules, restored) = orch.evaluate_one(Path::new("/src/A/A.csproj"));
        assert!(!restored);
        assert!(modules.is_empty());
    }

    #[test]
    fn test_solution_partial_failure() {
        let mut evaluator = FakeEvaluator::new();
        let mut paths = Vec::new();
        for i in 0..5 {
            let path = format!("/src/P{i}/P{i}.csproj");
            let mut project = FakeProject::new(&path).frameworks(&["net8.0", "net9.0"]);
            if i == 1 || i == 3 {
                project = project.restore_fails();
            }
            evaluator = evaluator.with_project(project);
            paths.push(PathBuf::from(path));
        }
        let solution = FakeSolutionParser::default().with_solution("/src/All.sln", paths);
        let orch = orchestrator(evaluator, solution, 3);

        let outcome = orch
            .resolve(&BuildScope::Solution("/src/All.sln".into()))
            .unwrap();

        assert!(!outcome.restored);
        // 3 successful projects × 2 frameworks
        assert_eq!(outcome.modules.len(), 6);
        assert!(
            outcome
                .modules
                .iter()
                .all(|m| !m.project_path.ends_with("P1.csproj")
                    && !m.project_path.ends_with("P3.csproj"))
        );
        // Failed siblings did not stop the others from being restored
        assert_eq!(orch.evaluator().build_count(), 5);
    }

    #[test]
    fn test_solution_all_restored() {
        let evaluator = FakeEvaluator::new()
            .with_project(FakeProject::new("/s/A.csproj").single_framework("net8.0"))
            .with_project(FakeProject::new("/s/B.csproj").frameworks(&["net8.0", "net9.0", "net10.0"]));
        let solution = FakeSolutionParser::default().with_solution(
            "/s/S.sln",
            vec!["/s/A.csproj".into(), "/s/B.csproj".into()],
        );
        let orch = orchestrator(evaluator, solution, 8);

        let outcome = orch.resolve(&BuildScope::Solution("/s/S.sln".into())).unwrap();
        assert!(outcome.restored);
        assert_eq!(outcome.modules.len(), 4);

        // Fan-out order holds within a project even though projects interleave
        let b_frameworks: Vec<_> = outcome
            .modules
            .iter()
            .filter(|m| m.project_path.ends_with("B.csproj"))
            .map(|m| m.target_framework.as_str())
            .collect();
        assert_eq!(b_frameworks, vec!["net8.0", "net9.0", "net10.0"]);
    }

    #[test]
    fn test_empty_solution_restores_trivially() {
        let solution = FakeSolutionParser::default().with_solution("/s/Empty.sln", Vec::new());
        let orch = orchestrator(FakeEvaluator::new(), solution, 4);

        let outcome = orch.resolve(&BuildScope::Solution("/s/Empty.sln".into())).unwrap();
        assert!(outcome.restored);
        assert!(outcome.modules.is_empty());
    }

    #[test]
    fn test_unreadable_solution_is_an_error() {
        let orch = orchestrator(FakeEvaluator::new(), FakeSolutionParser::default(), 4);
        assert!(orch.resolve(&BuildScope::Solution("/s/Nope.sln".into())).is_err());
    }

    #[test]
    fn test_degree_of_parallelism_does_not_change_result() {
        let build = || {
            let mut evaluator = FakeEvaluator::new().with_build_delay_ms(1);
            let mut paths = Vec::new();
            for i in 0..20 {
                let path = format!("/src/P{i}/P{i}.csproj");
                let mut project = match i % 3 {
                    0 => FakeProject::new(&path).single_framework("net8.0"),
                    1 => FakeProject::new(&path).frameworks(&["net8.0", "net9.0"]),
                    _ => FakeProject::new(&path).frameworks(&["net6.0", "net8.0", "net9.0"]),
                };
                if i % 7 == 5 {
                    project = project.restore_fails();
                }
                evaluator = evaluator.with_project(project.test_project(i % 2 == 0));
                paths.push(PathBuf::from(path));
            }
            (evaluator, FakeSolutionParser::default().with_solution("/src/S.sln", paths))
        };

        let (e1, s1) = build();
        let serial = orchestrator(e1, s1, 1)
            .resolve(&BuildScope::Solution("/src/S.sln".into()))
            .unwrap();

        let (e8, s8) = build();
        let parallel_orch = orchestrator(e8, s8, 8);
        let parallel = parallel_orch
            .resolve(&BuildScope::Solution("/src/S.sln".into()))
            .unwrap();

        assert!(!serial.restored);
        assert_eq!(serial.restored, parallel.restored);
        assert_eq!(sorted(serial.modules), sorted(parallel.modules));
        assert_eq!(parallel_orch.evaluator().max_concurrent_builds(), 1);
    }

    #[test]
    fn test_evaluate_one_is_idempotent() {
        let evaluator = FakeEvaluator::new().with_project(
            FakeProject::new("/src/A/A.csproj")
                .frameworks(&["net8.0", "net9.0"])
                .test_project(true),
        );
        let orch = orchestrator(evaluator, FakeSolutionParser::default(), 1);

        let first = orch.evaluate_one(Path::new("/src/A/A.csproj"));
        let second = orch.evaluate_one(Path::new("/src/A/A.csproj"));
        assert_eq!(first.1, second.1);
        assert_eq!(sorted(first.0), sorted(second.0));
    }

    #[test]
    fn test_diagnostic_log_reaches_build() {
        let evaluator =
            FakeEvaluator::new().with_project(FakeProject::new("/s/A.csproj").single_framework("net8.0"));
        let orch =
            orchestrator(evaluator, FakeSolutionParser::default(), 1).with_diagnostic_log(true);

        orch.evaluate_one(Path::new("/s/A.csproj"));
        assert_eq!(
            orch.evaluator().last_loggers(),
            Some(BuildLoggers::new(true))
        );
    }

    #[test]
    fn test_collector_keeps_batch_order() {
        let collector = ModuleCollector::new();
        collector.extend(vec![
            TestModule::new("a.dll", "a.csproj", "net8.0"),
            TestModule::new("b.dll", "a.csproj", "net9.0"),
        ]);
        collector.extend(Vec::new());
        assert_eq!(collector.len(), 2);

        let modules = collector.into_modules();
        assert_eq!(modules[0].target_framework, "net8.0");
        assert_eq!(modules[1].target_framework, "net9.0");
    }
}
