//! `dotnet msbuild` build engine adapter.
//!
//! Evaluation runs `dotnet msbuild <project> -getProperty:<name>...`, which
//! prints the requested properties as JSON without building anything.
//! Builds run `dotnet msbuild <project> -t:<targets> -v:quiet`, adding
//! `-bl:<file>` when the diagnostic binary log is enabled. Global
//! properties are forwarded to both as `-p:<name>=<value>`.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use dotnest::evaluator::{ProjectEvaluator, properties};
//! use dotnest::evaluator::dotnet::DotnetEvaluator;
//!
//! let evaluator = DotnetEvaluator::new("dotnet");
//! let project = evaluator.load(Path::new("tests/App.Tests/App.Tests.csproj"))?;
//! println!("{}", evaluator.get_property(&project, properties::TARGET_PATH));
//! # Ok::<(), dotnest::evaluator::EvaluatorError>(())
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::process::Output;

use serde::Deserialize;
use tracing::{debug, warn};

use super::{
    BuildLoggers, BuildResult, EvaluatorError, EvaluatorResult, ProjectEvaluator, properties,
};

/// JSON printed by `-getProperty` when more than one property is requested.
#[derive(Deserialize)]
struct GetPropertyOutput {
    #[serde(rename = "Properties", default)]
    properties: HashMap<String, String>,
}

/// A project loaded through `dotnet msbuild`.
///
/// Holds the global properties applied to every evaluation and build, and
/// the property snapshot of the most recent evaluation.
#[derive(Debug, Clone)]
pub struct DotnetProject {
    path: PathBuf,
    global_properties: BTreeMap<String, String>,
    evaluated: HashMap<String, String>,
}

impl DotnetProject {
    /// Path the project was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Build engine backed by the `dotnet` CLI.
#[derive(Debug, Clone)]
pub struct DotnetEvaluator {
    dotnet: String,
    global_properties: BTreeMap<String, String>,
}

impl DotnetEvaluator {
    /// Creates an evaluator that invokes the given `dotnet` executable.
    pub fn new(dotnet: impl Into<String>) -> Self {
        Self {
            dotnet: dotnet.into(),
            global_properties: BTreeMap::new(),
        }
    }

    /// Adds global properties applied to every project this evaluator loads.
    ///
    /// # Example
    ///
    /// ```
    /// use dotnest::evaluator::dotnet::DotnetEvaluator;
    ///
    /// let evaluator = DotnetEvaluator::new("dotnet")
    ///     .with_global_properties([("Configuration", "Release")]);
    /// ```
    pub fn with_global_properties<I, K, V>(mut self, props: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.global_properties
            .extend(props.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    fn msbuild(&self, project: &DotnetProject) -> std::process::Command {
        let mut cmd = std::process::Command::new(&self.dotnet);
        cmd.arg("msbuild").arg(&project.path).arg("-nologo");
        for (name, value) in &project.global_properties {
            cmd.arg(format!("-p:{}={}", name, value));
        }
        cmd
    }

    fn run(&self, mut cmd: std::process::Command) -> EvaluatorResult<Output> {
        debug!("Running {:?}", cmd);
        cmd.output()
            .map_err(|e| EvaluatorError::ExecFailed(format!("{}: {}", self.dotnet, e)))
    }

    fn evaluate(&self, project: &mut DotnetProject) -> EvaluatorResult<()> {
        let mut cmd = self.msbuild(project);
        for name in properties::ALL {
            cmd.arg(format!("-getProperty:{}", name));
        }

        let output = self.run(cmd)?;
        let stdout = String::from_utf8_lossy(&output.stdout);

        if !output.status.success() {
            return Err(EvaluatorError::EvaluationFailed {
                path: project.path.clone(),
                message: failure_message(&output),
            });
        }

        project.evaluated = parse_get_property_output(&stdout)?;
        Ok(())
    }
}

impl ProjectEvaluator for DotnetEvaluator {
    type Project = DotnetProject;

    fn load(&self, path: &Path) -> EvaluatorResult<DotnetProject> {
        if !path.is_file() {
            return Err(EvaluatorError::ProjectNotFound(path.to_path_buf()));
        }

        let mut project = DotnetProject {
            path: path.to_path_buf(),
            global_properties: self.global_properties.clone(),
            evaluated: HashMap::new(),
        };
        self.evaluate(&mut project)?;
        Ok(project)
    }

    fn get_property(&self, project: &DotnetProject, name: &str) -> String {
        project.evaluated.get(name).cloned().unwrap_or_default()
    }

    fn set_property(&self, project: &mut DotnetProject, name: &str, value: &str) {
        project
            .global_properties
            .insert(name.to_string(), value.to_string());
    }

    fn reevaluate(&self, project: &mut DotnetProject) -> EvaluatorResult<()> {
        self.evaluate(project)
    }

    fn build(
        &self,
        project: &mut DotnetProject,
        targets: &[&str],
        loggers: &BuildLoggers,
    ) -> EvaluatorResult<BuildResult> {
        let mut cmd = self.msbuild(project);
        cmd.arg(format!("-t:{}", targets.join(";"))).arg("-v:quiet");
        if let Some(binlog) = &loggers.binlog {
            cmd.arg(format!("-bl:{}", binlog.display()));
        }

        let output = self.run(cmd)?;
        let success = output.status.success();
        if !success {
            warn!(
                "{} failed for {}: {}",
                targets.join(";"),
                project.path.display(),
                failure_message(&output)
            );
        }

        Ok(BuildResult { success })
    }
}

/// Parses `-getProperty` JSON, tolerating banner lines before the object.
fn parse_get_property_output(stdout: &str) -> EvaluatorResult<HashMap<String, String>> {
    let start = stdout
        .find('{')
        .ok_or_else(|| EvaluatorError::ParseError("no JSON object in output".to_string()))?;
    let parsed: GetPropertyOutput = serde_json::from_str(stdout[start..].trim_end())
        .map_err(|e| EvaluatorError::ParseError(e.to_string()))?;
    Ok(parsed.properties)
}

/// The engine reports errors on stdout; fall back to stderr.
fn failure_message(output: &Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let message = if stdout.trim().is_empty() {
        stderr.trim()
    } else {
        stdout.trim()
    };
    if message.is_empty() {
        format!("exited with {}", output.status)
    } else {
        message.to_string()
    }
}
