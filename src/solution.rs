//! Solution file parsing.
//!
//! Enumerates the project files a solution references, in declaration
//! order. Two formats are understood:
//!
//! | Extension | Format |
//! |-----------|--------|
//! | `.sln` | Classic text format: `Project("{type}") = "Name", "path", "{id}"` |
//! | `.slnx` | XML format: `<Project Path="path" />` at any nesting depth |
//!
//! Entries that are not project files (solution folders, website
//! projects) are skipped. Relative paths resolve against the solution's
//! directory and backslash separators are normalized.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use quick_xml::Reader;
use quick_xml::events::Event;
use regex::Regex;

/// Project file extensions recognized in solutions and directories.
pub const PROJECT_EXTENSIONS: [&str; 3] = ["csproj", "fsproj", "vbproj"];

/// Solution file extensions.
pub const SOLUTION_EXTENSIONS: [&str; 2] = ["sln", "slnx"];

static SLN_PROJECT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*Project\("\{[^}]*\}"\)\s*=\s*"[^"]*"\s*,\s*"([^"]+)""#)
        .expect("static regex is valid")
});

/// Errors raised while reading a solution.
#[derive(Debug, thiserror::Error)]
pub enum SolutionError {
    /// The solution could not be read.
    #[error("Failed to read solution {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The solution content is malformed.
    #[error("Failed to parse solution {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },

    /// The file is not a known solution format.
    #[error("Unsupported solution format: {}", .0.display())]
    UnsupportedFormat(PathBuf),
}

/// Lists the projects referenced by a solution.
pub trait SolutionParser: Send + Sync {
    /// Returns project file paths in solution order.
    fn list_projects(&self, solution: &Path) -> Result<Vec<PathBuf>, SolutionError>;
}

/// Returns `true` if `path` has a project file extension.
pub fn is_project_file(path: &Path) -> bool {
    has_extension(path, &PROJECT_EXTENSIONS)
}

/// Returns `true` if `path` has a solution file extension.
pub fn is_solution_file(path: &Path) -> bool {
    has_extension(path, &SOLUTION_EXTENSIONS)
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| extensions.iter().any(|x| e.eq_ignore_ascii_case(x)))
}

/// Reads `.sln` and `.slnx` files from disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileSolutionParser;

impl SolutionParser for FileSolutionParser {
    fn list_projects(&self, solution: &Path) -> Result<Vec<PathBuf>, SolutionError> {
        let content = std::fs::read_to_string(solution).map_err(|source| SolutionError::Read {
            path: solution.to_path_buf(),
            source,
        })?;

        let extension = solution
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        let entries = match extension.as_deref() {
            Some("sln") => parse_sln(&content),
            Some("slnx") => parse_slnx(&content).map_err(|message| SolutionError::Parse {
                path: solution.to_path_buf(),
                message,
            })?,
            _ => return Err(SolutionError::UnsupportedFormat(solution.to_path_buf())),
        };

        let base = solution.parent().unwrap_or_else(|| Path::new(""));
        Ok(entries
            .iter()
            .map(|entry| resolve_entry(base, entry))
            .filter(|path| is_project_file(path))
            .collect())
    }
}

/// Extracts raw project paths from classic `.sln` content.
fn parse_sln(content: &str) -> Vec<String> {
    content
        .lines()
        .filter_map(|line| SLN_PROJECT_LINE.captures(line))
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Extracts raw project paths from `.slnx` XML content.
fn parse_slnx(content: &str) -> Result<Vec<String>, String> {
    let mut reader = Reader::from_str(content);
    let mut paths = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.name().as_ref() == b"Project" => {
                for attr in e.attributes() {
                    let attr = attr.map_err(|e| e.to_string())?;
                    if attr.key.as_ref() == b"Path" {
                        let value = attr.unescape_value().map_err(|e| e.to_string())?;
                        paths.push(value.into_owned());
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(format!(
                    "error at position {}: {}",
                    reader.buffer_position(),
                    e
                ));
            }
        }
    }

    Ok(paths)
}

fn resolve_entry(base: &Path, entry: &str) -> PathBuf {
    let normalized = entry.replace('\\', "/");
    base.join(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SLN: &str = r#"
Microsoft Visual Studio Solution File, Format Version 12.00
# Visual Studio Version 17
Project("{FAE04EC0-301F-11D3-BF4B-00C04F79EFBC}") = "App", "src\App\App.csproj", "{11111111-1111-1111-1111-111111111111}"
EndProject
Project("{2150E333-8FDC-42A3-9474-1A3956D46DE8}") = "tests", "tests", "{22222222-2222-2222-2222-222222222222}"
EndProject
Project("{F2A71F9B-5D33-465A-A702-920D77279786}") = "App.FsTests", "tests\App.FsTests\App.FsTests.fsproj", "{33333333-3333-3333-3333-333333333333}"
EndProject
Project("{9A19103F-16F7-4668-BE54-9A1E7A4F7556}") = "App.Tests", "tests\App.Tests\App.Tests.csproj", "{44444444-4444-4444-4444-444444444444}"
EndProject
Global
EndGlobal
"#;

    const SLNX: &str = r#"<Solution>
  <Folder Name="/src/">
    <Project Path="src/App/App.csproj" />
  </Folder>
  <Folder Name="/tests/">
    <Project Path="tests/App.Tests/App.Tests.csproj">
      <BuildType Project="Release" />
    </Project>
    <File Path="tests/README.md" />
  </Folder>
</Solution>
"#;

    #[test]
    fn test_parse_sln_keeps_order_and_skips_folders() {
        let dir = TempDir::new().unwrap();
        let sln = dir.path().join("App.sln");
        std::fs::write(&sln, SLN).unwrap();

        let projects = FileSolutionParser.list_projects(&sln).unwrap();
        assert_eq!(
            projects,
            vec![
                dir.path().join("src/App/App.csproj"),
                dir.path().join("tests/App.FsTests/App.FsTests.fsproj"),
                dir.path().join("tests/App.Tests/App.Tests.csproj"),
            ]
        );
    }

    #[test]
    fn test_parse_slnx_nested_projects() {
        let dir = TempDir::new().unwrap();
        let slnx = dir.path().join("App.slnx");
        std::fs::write(&slnx, SLNX).unwrap();

        let projects = FileSolutionParser.list_projects(&slnx).unwrap();
        assert_eq!(
            projects,
            vec![
                dir.path().join("src/App/App.csproj"),
                dir.path().join("tests/App.Tests/App.Tests.csproj"),
            ]
        );
    }

    #[test]
    fn test_parse_slnx_malformed() {
        let dir = TempDir::new().unwrap();
        let slnx = dir.path().join("Broken.slnx");
        std::fs::write(&slnx, "<Solution><Project Path=\"a.csproj\"></Folder>").unwrap();

        let err = FileSolutionParser.list_projects(&slnx).unwrap_err();
        assert!(matches!(err, SolutionError::Parse { .. }));
    }

    #[test]
    fn test_missing_solution() {
        let err = FileSolutionParser
            .list_projects(Path::new("/no/such/App.sln"))
            .unwrap_err();
        assert!(matches!(err, SolutionError::Read { .. }));
    }

    #[test]
    fn test_extension_checks() {
        assert!(is_project_file(Path::new("a/B.CSPROJ")));
        assert!(is_project_file(Path::new("B.vbproj")));
        assert!(!is_project_file(Path::new("B.sln")));
        assert!(is_solution_file(Path::new("B.slnx")));
        assert!(!is_solution_file(Path::new("B")));
    }
}
