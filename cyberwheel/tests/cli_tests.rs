// tests/cli_tests.rs
//
// Integration tests for the cyberwheel binary.

use std::fs;
use std::process::Command;

use cyberwheel::rl::evaluator::ACTION_LOG_HEADER;
use serde_json::Value;

fn bin() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_cyberwheel"));
    cmd.env_remove("CYBERWHEEL_TELEMETRY_MODE");
    cmd
}

#[test]
fn help_lists_subcommands() {
    let output = bin().arg("--help").output().expect("failed to run cyberwheel");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("run"), "missing run: {stdout}");
    assert!(stdout.contains("evaluate"), "missing evaluate: {stdout}");
}

#[test]
fn evaluate_writes_action_log_and_summary() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("eval");
    let output = bin()
        .args(["evaluate", "--episodes", "2", "--steps", "20", "--seed", "11"])
        .arg("--output-dir")
        .arg(&out)
        .output()
        .expect("failed to run cyberwheel");
    assert!(
        output.status.success(),
        "evaluate failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("checksum="), "missing checksum: {stdout}");

    let csv = fs::read_to_string(out.join("actions.csv")).unwrap();
    let mut lines = csv.lines();
    assert_eq!(lines.next(), Some(ACTION_LOG_HEADER));
    assert!(lines.count() > 0);

    let summary: Value =
        serde_json::from_str(&fs::read_to_string(out.join("eval_summary.json")).unwrap()).unwrap();
    assert_eq!(summary["num_episodes"], 2);
    assert_eq!(summary["base_seed"], 11);
    assert_eq!(summary["episodes"].as_array().unwrap().len(), 2);
}

#[test]
fn run_prints_one_line_per_episode() {
    let output = bin()
        .args(["run", "--episodes", "3", "--steps", "10", "--policy", "nothing"])
        .output()
        .expect("failed to run cyberwheel");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().filter(|l| l.starts_with("episode=")).collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[1].contains("seed=1"));
}

#[test]
fn missing_config_fails() {
    let dir = tempfile::tempdir().unwrap();
    let output = bin()
        .arg("--config")
        .arg(dir.path().join("absent.yaml"))
        .arg("run")
        .output()
        .expect("failed to run cyberwheel");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("loading config"), "stderr: {stderr}");
}

#[test]
fn jsonl_telemetry_without_path_fails_at_startup() {
    let output = bin()
        .env("CYBERWHEEL_TELEMETRY_MODE", "jsonl")
        .env_remove("CYBERWHEEL_TELEMETRY_PATH")
        .args(["run", "--steps", "3"])
        .output()
        .expect("failed to run cyberwheel");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("CYBERWHEEL_TELEMETRY_PATH"), "stderr: {stderr}");
}

#[test]
fn run_writes_telemetry_when_enabled() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("steps.jsonl");
    let output = bin()
        .env("CYBERWHEEL_TELEMETRY_MODE", "jsonl")
        .env("CYBERWHEEL_TELEMETRY_PATH", &path)
        .args(["run", "--episodes", "2", "--steps", "4", "--policy", "nothing"])
        .output()
        .expect("failed to run cyberwheel");
    assert!(output.status.success());
    let lines = fs::read_to_string(&path).unwrap().lines().count();
    assert_eq!(lines, 8);
}
