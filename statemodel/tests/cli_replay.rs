//! CLI tests for `statemodel check`, `replay` and `inspect`.
//!
//! Spawns the statemodel binary and verifies exit codes and output.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use statemodel::exit_codes;
use statemodel::io::config::{DEFAULT_CONFIG_FILE, ModelConfig, PersistenceMode, write_config};
use statemodel::test_support::{command, screen, step, trace};

fn statemodel(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_statemodel"))
        .current_dir(dir)
        .args(args)
        .output()
        .expect("statemodel")
}

fn write_trace(dir: &Path) {
    let recorded = trace(vec![
        step(screen("Hall"), vec![command("east"), command("wait")], Some(0)),
        step(screen("Kitchen"), vec![command("west")], Some(0)),
        step(screen("Hall"), vec![command("east"), command("wait")], None),
    ]);
    let json = serde_json::to_string_pretty(&recorded).expect("serialize");
    fs::write(dir.join("run.json"), json).expect("write trace");
}

#[test]
fn check_prints_model_identifier_for_default_config() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = statemodel(temp.path(), &["check"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let stdout = String::from_utf8(output.stdout).expect("utf8");
    assert_eq!(stdout.trim(), ModelConfig::default().model_identifier());
}

#[test]
fn invalid_config_exits_with_config_code() {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::write(
        temp.path().join(DEFAULT_CONFIG_FILE),
        "[abstraction]\nstate_tags = []\n",
    )
    .expect("write config");
    let output = statemodel(temp.path(), &["check"]);
    assert_eq!(output.status.code(), Some(exit_codes::CONFIG));
}

#[test]
fn replay_persists_and_inspect_counts() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut cfg = ModelConfig::default();
    cfg.selection.seed = Some(9);
    cfg.persistence.mode = PersistenceMode::Json;
    cfg.persistence.path = "store.json".into();
    write_config(&temp.path().join(DEFAULT_CONFIG_FILE), &cfg).expect("write config");
    write_trace(temp.path());

    let output = statemodel(temp.path(), &["replay", "--trace", "run.json"]);
    assert_eq!(
        output.status.code(),
        Some(exit_codes::OK),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );
    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).expect("summary json");
    assert_eq!(summary["steps"], 3);
    assert_eq!(summary["model"]["states"], 2);

    let output = statemodel(temp.path(), &["inspect", "--store", "store.json"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let stdout = String::from_utf8(output.stdout).expect("utf8");
    assert!(stdout.lines().any(|line| line == "AbstractState\t2"));
    assert!(stdout.lines().any(|line| line == "AbstractAction\t3"));
}

#[test]
fn replay_rejects_trace_failing_schema() {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::write(temp.path().join("run.json"), r#"{"steps": [{"state": {}}]}"#).expect("write");
    let output = statemodel(temp.path(), &["replay", "--trace", "run.json"]);
    assert_eq!(output.status.code(), Some(exit_codes::ERROR));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("schema validation failed"), "{stderr}");
}

#[test]
fn inspect_missing_store_fails() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = statemodel(temp.path(), &["inspect", "--store", "absent.json"]);
    assert_eq!(output.status.code(), Some(exit_codes::ERROR));
}
