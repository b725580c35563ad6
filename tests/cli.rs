use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn dotnest(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("dotnest").unwrap();
    cmd.current_dir(dir.path());
    cmd
}

#[test]
fn test_help_lists_subcommands() {
    let dir = TempDir::new().unwrap();
    dotnest(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("collect"))
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("init"));
}

#[test]
fn test_init_then_validate() {
    let dir = TempDir::new().unwrap();

    dotnest(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Created dotnest.toml"));
    assert!(dir.path().join("dotnest.toml").exists());

    dotnest(&dir)
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid!"))
        .stdout(predicate::str::contains("Unit timeout: 900s"));
}

#[test]
fn test_init_refuses_to_overwrite() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("dotnest.toml"), "# mine\n").unwrap();

    dotnest(&dir)
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    let content = std::fs::read_to_string(dir.path().join("dotnest.toml")).unwrap();
    assert_eq!(content, "# mine\n");
}

#[test]
fn test_validate_missing_config() {
    let dir = TempDir::new().unwrap();
    dotnest(&dir)
        .arg("validate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration error"));
}

#[test]
fn test_validate_custom_config_path() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("ci.toml"),
        "[dotnest]\nmax_parallel = 3\n\n[build.properties]\nConfiguration = \"Release\"\n",
    )
    .unwrap();

    dotnest(&dir)
        .args(["--config", "ci.toml", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Max parallel: 3"))
        .stdout(predicate::str::contains("Property Configuration: Release"));
}

#[test]
fn test_run_missing_path() {
    let dir = TempDir::new().unwrap();
    dotnest(&dir)
        .args(["run", "does/not/exist"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Path not found"));
}

#[test]
fn test_collect_empty_directory() {
    let dir = TempDir::new().unwrap();
    dotnest(&dir)
        .arg("collect")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No solution or project file found"));
}

#[test]
fn test_run_ambiguous_projects() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("A.csproj"), "<Project />").unwrap();
    std::fs::write(dir.path().join("B.csproj"), "<Project />").unwrap();

    dotnest(&dir)
        .arg("run")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Multiple project files"));
}

#[test]
fn test_run_rejects_invalid_config() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("dotnest.toml"), "[dotnest]\nmax_parallel = \"lots\"\n").unwrap();

    dotnest(&dir)
        .arg("run")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load config"));
}
