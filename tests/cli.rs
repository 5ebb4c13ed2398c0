//! CLI tests covering help, argument validation, and fatal exit codes
//!
//! None of these reach the network setup, so they run without privileges.

use assert_cmd::Command;
use predicates::prelude::*;

fn cli_command() -> Command {
    Command::cargo_bin("streaming-testbed").expect("Failed to find streaming-testbed binary")
}

#[test]
fn test_cli_help_and_version() {
    let mut cmd = cli_command();
    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Script for running the video streaming app."))
        .stdout(predicate::str::contains("--link-bw"))
        .stdout(predicate::str::contains("--link-delay"))
        .stdout(predicate::str::contains("[default: 10]"));

    let mut cmd = cli_command();
    cmd.arg("--version");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("streaming-testbed"));
}

#[test]
fn test_cli_rejects_bad_values_with_usage_error() {
    let mut cmd = cli_command();
    cmd.args(["--link-bw", "fast"]);
    cmd.assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("invalid value 'fast'"));

    let mut cmd = cli_command();
    cmd.arg("--unknown-flag");
    cmd.assert().failure().code(2);
}

#[test]
fn test_uncaught_error_exits_with_one() {
    let tmp = tempfile::tempdir().unwrap();
    let blocker = tmp.path().join("blocker");
    std::fs::write(&blocker, b"").unwrap();

    let mut cmd = cli_command();
    cmd.arg("--shared-dir")
        .arg(blocker.join("shared"))
        .args(["--link-bw", "-3", "--link-delay", "-7"]);
    cmd.assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Error: creating shared directory"));
}

#[test]
fn test_bad_config_file_exits_with_one() {
    let tmp = tempfile::tempdir().unwrap();
    let config = tmp.path().join("testbed.json");
    std::fs::write(&config, "{ not json").unwrap();

    let mut cmd = cli_command();
    cmd.arg("--shared-dir")
        .arg(tmp.path().join("shared"))
        .arg("--config")
        .arg(&config);
    cmd.assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("failed to parse config"));

    // the shared directory is created before the config is read
    assert!(tmp.path().join("shared").is_dir());
}
