//! Smoke tests -- verify the binary runs and the command tree is wired.

use assert_cmd::Command;

#[test]
fn test_cli_help() {
    Command::cargo_bin("runconductor")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicates::str::contains(
            "Test-run lifecycle orchestration",
        ));
}

#[test]
fn test_cli_version() {
    Command::cargo_bin("runconductor")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicates::str::contains("runconductor"));
}

#[test]
fn test_run_subcommands_exist() {
    for sub in ["launch", "stop", "show", "status", "result", "list"] {
        Command::cargo_bin("runconductor")
            .unwrap()
            .args(["run", sub, "--help"])
            .assert()
            .success();
    }
}

#[test]
fn test_artifact_report_subcommand_exists() {
    Command::cargo_bin("runconductor")
        .unwrap()
        .args(["artifact", "report", "--help"])
        .assert()
        .success()
        .stdout(predicates::str::contains("--type"));
}

#[test]
fn test_run_list_on_empty_database() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("runconductor.toml");
    std::fs::write(
        &config,
        format!(
            "[storage]\ndatabase_path = \"{}\"\nblob_root = \"{}\"\n",
            dir.path().join("runs.db").display(),
            dir.path().join("blobs").display()
        ),
    )
    .unwrap();

    Command::cargo_bin("runconductor")
        .unwrap()
        .arg("--config")
        .arg(&config)
        .args(["run", "list"])
        .assert()
        .success()
        .stdout(predicates::str::contains("No runs found."));
}

#[test]
fn test_missing_config_file_fails() {
    Command::cargo_bin("runconductor")
        .unwrap()
        .args(["--config", "/nonexistent/runconductor.toml", "run", "list"])
        .assert()
        .failure();
}

#[test]
fn test_config_source_is_logged_once_tracing_is_up() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("runconductor.toml");
    std::fs::write(
        &config,
        format!(
            "[storage]\ndatabase_path = \"{}\"\nblob_root = \"{}\"\n",
            dir.path().join("runs.db").display(),
            dir.path().join("blobs").display()
        ),
    )
    .unwrap();

    Command::cargo_bin("runconductor")
        .unwrap()
        .env("RUST_LOG", "info")
        .arg("--config")
        .arg(&config)
        .args(["run", "list"])
        .assert()
        .success()
        .stdout(predicates::str::contains("loaded configuration"));
}
