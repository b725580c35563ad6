//! Scope discovery: turning a user-supplied path into a build scope.
//!
//! A path may name a solution, a project, or a directory. For a directory
//! the single solution file inside wins; without one, the single project
//! file is used. Zero or several candidates are reported as errors before
//! any restore is attempted.

use std::path::{Path, PathBuf};

use crate::solution::{is_project_file, is_solution_file};

/// What restore operates on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildScope {
    /// Every project referenced by a solution.
    Solution(PathBuf),
    /// A single project.
    Project(PathBuf),
}

impl BuildScope {
    /// The solution or project path.
    pub fn path(&self) -> &Path {
        match self {
            BuildScope::Solution(p) | BuildScope::Project(p) => p,
        }
    }

    /// Returns `true` for a solution scope.
    pub fn is_solution(&self) -> bool {
        matches!(self, BuildScope::Solution(_))
    }
}

/// Errors raised while locating a solution or project.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    /// The path does not exist.
    #[error("Path not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The directory contains neither a solution nor a project file.
    #[error("No solution or project file found in {}", .0.display())]
    NothingFound(PathBuf),

    /// The directory contains more than one candidate of the same kind.
    #[error("Multiple {kind} files found in {}: specify which one to use", .dir.display())]
    Ambiguous { dir: PathBuf, kind: &'static str },

    /// The file is neither a solution nor a project.
    #[error("Not a solution or project file: {}", .0.display())]
    UnsupportedFile(PathBuf),

    /// I/O error listing the directory.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Resolves `path` to a [`BuildScope`].
///
/// # Example
///
/// ```
/// use std::path::Path;
/// use dotnest::discovery::{BuildScope, discover_scope};
///
/// let dir = tempfile::tempdir()?;
/// std::fs::write(dir.path().join("App.sln"), "")?;
///
/// let scope = discover_scope(dir.path())?;
/// assert_eq!(scope, BuildScope::Solution(dir.path().join("App.sln")));
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn discover_scope(path: &Path) -> Result<BuildScope, DiscoveryError> {
    if !path.exists() {
        return Err(DiscoveryError::NotFound(path.to_path_buf()));
    }

    if path.is_file() {
        return if is_solution_file(path) {
            Ok(BuildScope::Solution(path.to_path_buf()))
        } else if is_project_file(path) {
            Ok(BuildScope::Project(path.to_path_buf()))
        } else {
            Err(DiscoveryError::UnsupportedFile(path.to_path_buf()))
        };
    }

    let mut solutions = Vec::new();
    let mut projects = Vec::new();
    for entry in std::fs::read_dir(path)? {
        let entry_path = entry?.path();
        if !entry_path.is_file() {
            continue;
        }
        if is_solution_file(&entry_path) {
            solutions.push(entry_path);
        } else if is_project_file(&entry_path) {
            projects.push(entry_path);
        }
    }

    match (solutions.len(), projects.len()) {
        (1, _) => Ok(BuildScope::Solution(solutions.remove(0))),
        (0, 1) => Ok(BuildScope::Project(projects.remove(0))),
        (0, 0) => Err(DiscoveryError::NothingFound(path.to_path_buf())),
        (0, _) => Err(DiscoveryError::Ambiguous {
            dir: path.to_path_buf(),
            kind: "project",
        }),
        _ => Err(DiscoveryError::Ambiguous {
            dir: path.to_path_buf(),
            kind: "solution",
        }),
    }
}
