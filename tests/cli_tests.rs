//! CLI smoke tests against the compiled binary

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn runbook() -> Command {
    Command::cargo_bin("runbook").expect("binary builds")
}

fn write_playbook(dir: &TempDir, name: &str, json: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, json).unwrap();
    path
}

const HELLO: &str = r#"{
    "name": "hello",
    "steps": [
        {"type": "script", "name": "greet", "command": "echo hello from runbook"}
    ]
}"#;

#[test]
fn help_lists_subcommands() {
    runbook()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("status"))
        .stdout(predicate::str::contains("stop"));
}

#[test]
fn validate_accepts_a_well_formed_playbook() {
    let dir = TempDir::new().unwrap();
    let path = write_playbook(&dir, "hello.json", HELLO);

    runbook()
        .args(["--storage-dir", dir.path().to_str().unwrap()])
        .arg("validate")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("valid"));
}

#[test]
fn validate_rejects_a_playbook_without_steps() {
    let dir = TempDir::new().unwrap();
    let path = write_playbook(&dir, "empty.json", r#"{"name": "empty", "steps": []}"#);

    runbook()
        .args(["--storage-dir", dir.path().to_str().unwrap()])
        .arg("validate")
        .arg(&path)
        .assert()
        .failure()
        .stdout(predicate::str::contains("steps"));
}

#[test]
fn run_executes_a_playbook_file_through_the_shell() {
    let dir = TempDir::new().unwrap();
    let path = write_playbook(&dir, "hello.json", HELLO);

    runbook()
        .args(["--storage-dir", dir.path().to_str().unwrap()])
        .arg("run")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"status\": \"completed\""))
        .stdout(predicate::str::contains("hello from runbook"));

    // History landed under the storage root
    let history = dir.path().join("state").join("history");
    assert_eq!(fs::read_dir(history).unwrap().count(), 1);
}

#[test]
fn dry_run_simulates_and_writes_no_history() {
    let dir = TempDir::new().unwrap();
    let path = write_playbook(&dir, "hello.json", HELLO);

    runbook()
        .args(["--storage-dir", dir.path().to_str().unwrap()])
        .arg("run")
        .arg(&path)
        .arg("--dry-run")
        .assert()
        .success()
        .stdout(predicate::str::contains("simulated"));

    assert!(!dir.path().join("state").join("history").exists());
}

#[test]
fn run_fails_when_a_step_fails() {
    let dir = TempDir::new().unwrap();
    let path = write_playbook(
        &dir,
        "broken.json",
        r#"{
            "name": "broken",
            "steps": [
                {"type": "script", "name": "boom", "command": "exit 3"}
            ]
        }"#,
    );

    runbook()
        .args(["--storage-dir", dir.path().to_str().unwrap()])
        .arg("run")
        .arg(&path)
        .assert()
        .failure()
        .stdout(predicate::str::contains("\"status\": \"failed\""));
}

#[test]
fn parameters_flow_from_the_command_line() {
    let dir = TempDir::new().unwrap();
    let path = write_playbook(
        &dir,
        "param.json",
        r#"{
            "name": "param",
            "parameters": {"word": {"type": "string", "required": true}},
            "steps": [
                {"type": "script", "name": "say", "command": "echo {{word}}"}
            ]
        }"#,
    );

    runbook()
        .args(["--storage-dir", dir.path().to_str().unwrap()])
        .arg("run")
        .arg(&path)
        .args(["--param", "word=sesame"])
        .assert()
        .success()
        .stdout(predicate::str::contains("sesame"));

    // Missing the required parameter is a pre-execution failure
    runbook()
        .args(["--storage-dir", dir.path().to_str().unwrap()])
        .arg("run")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("word"));
}

#[test]
fn save_then_list_then_run_by_name() {
    let dir = TempDir::new().unwrap();
    let path = write_playbook(&dir, "hello.json", HELLO);
    let storage = dir.path().join("store");

    runbook()
        .args(["--storage-dir", storage.to_str().unwrap()])
        .arg("save")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("saved playbook 'hello'"));

    runbook()
        .args(["--storage-dir", storage.to_str().unwrap()])
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("hello"));

    runbook()
        .args(["--storage-dir", storage.to_str().unwrap()])
        .args(["run", "hello"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"status\": \"completed\""));
}

#[test]
fn status_of_unknown_workflow_is_an_error() {
    let dir = TempDir::new().unwrap();

    runbook()
        .args(["--storage-dir", dir.path().to_str().unwrap()])
        .args(["status", "00000000-0000-0000-0000-000000000000"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn stop_of_unknown_workflow_is_an_error() {
    let dir = TempDir::new().unwrap();

    runbook()
        .args(["--storage-dir", dir.path().to_str().unwrap()])
        .args(["stop", "00000000-0000-0000-0000-000000000000"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}
