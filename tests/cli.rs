// ABOUTME: Integration tests for the deckhand CLI commands.
// ABOUTME: Validates --help output, init, argument checks, and exit codes.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;

fn deckhand_cmd() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("deckhand"))
}

const LOCAL_CONFIG: &str = "project: bot\nworkdir: /opt/bot\nservices: [backend, router]\n";

fn project_dir(config: &str) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("deckhand.yml"), config).unwrap();
    dir
}

#[test]
fn help_shows_commands() {
    deckhand_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("init"))
        .stdout(predicate::str::contains("deploy"))
        .stdout(predicate::str::contains("verify"))
        .stdout(predicate::str::contains("patch"))
        .stdout(predicate::str::contains("status"));
}

#[test]
fn deploy_help_lists_modes() {
    deckhand_cmd()
        .args(["deploy", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--mode"))
        .stdout(predicate::str::contains("--full-stack"))
        .stdout(predicate::str::contains("--dry-run-patches"));
}

#[test]
fn init_creates_config_file() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("deckhand.yml");

    deckhand_cmd()
        .current_dir(temp_dir.path())
        .args(["init", "--project", "shop"])
        .assert()
        .success();

    assert!(config_path.exists(), "deckhand.yml should be created");
    let content = fs::read_to_string(&config_path).unwrap();
    assert!(content.contains("project: shop"));
}

#[test]
fn init_refuses_to_overwrite_existing_config() {
    let temp_dir = project_dir("existing: config");

    deckhand_cmd()
        .current_dir(temp_dir.path())
        .arg("init")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn missing_config_exits_with_config_code() {
    let temp_dir = tempfile::tempdir().unwrap();

    deckhand_cmd()
        .current_dir(temp_dir.path())
        .arg("deploy")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("configuration file not found"));
}

#[test]
fn unknown_mode_is_rejected() {
    let temp_dir = project_dir(LOCAL_CONFIG);

    deckhand_cmd()
        .current_dir(temp_dir.path())
        .args(["deploy", "--mode", "fast"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("fast"));
}

#[test]
fn unsafe_ref_is_rejected() {
    let temp_dir = project_dir(LOCAL_CONFIG);

    deckhand_cmd()
        .current_dir(temp_dir.path())
        .args(["deploy", "--ref", "main;reboot"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid character"));
}

#[test]
fn full_stack_with_services_is_a_config_error() {
    let temp_dir = project_dir(LOCAL_CONFIG);

    deckhand_cmd()
        .current_dir(temp_dir.path())
        .args(["deploy", "--full-stack", "--services", "backend"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--full-stack"));
}

#[test]
fn ref_without_source_is_a_config_error() {
    let temp_dir = project_dir(LOCAL_CONFIG);

    deckhand_cmd()
        .current_dir(temp_dir.path())
        .args(["deploy", "--ref", "main"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("no source section"));
}

#[test]
fn quiet_and_json_conflict() {
    deckhand_cmd()
        .args(["--quiet", "--json", "verify"])
        .assert()
        .failure();
}

#[test]
fn verify_without_checks_reports_healthy() {
    let temp_dir = project_dir(LOCAL_CONFIG);

    deckhand_cmd()
        .current_dir(temp_dir.path())
        .arg("verify")
        .assert()
        .success()
        .stdout(predicate::str::contains("verdict: healthy"));
}

#[test]
fn verify_json_emits_a_report_event() {
    let temp_dir = project_dir(LOCAL_CONFIG);

    let output = deckhand_cmd()
        .current_dir(temp_dir.path())
        .args(["--json", "verify"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    let event: serde_json::Value = serde_json::from_str(stdout.lines().next().unwrap()).unwrap();
    assert_eq!(event["event"], "report");
    assert_eq!(event["report"]["verdict"], "healthy");
}

#[test]
fn explicit_config_path_is_used() {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("other.yml");
    fs::write(&path, LOCAL_CONFIG).unwrap();

    deckhand_cmd()
        .arg("--config")
        .arg(&path)
        .arg("verify")
        .assert()
        .success();
}

#[test]
fn patch_without_datastore_is_a_config_error() {
    let temp_dir = project_dir(LOCAL_CONFIG);

    deckhand_cmd()
        .current_dir(temp_dir.path())
        .args(["patch", "--dry-run"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("datastore"));
}
