use assert_cmd::Command;
use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::PathBuf;
use tempfile::tempdir;

fn write_config(dir: &tempfile::TempDir, toml: &str) -> PathBuf {
    let path = dir.path().join("sensor.toml");
    fs::write(&path, toml).unwrap();
    path
}

const DISTANCE: &str = r#"
[sensor]
pin = 24

[detection]
method = "distance"
distance_mm = 15
"#;

fn bin() -> Command {
    Command::cargo_bin("filament-sensor").unwrap()
}

#[rstest]
#[case(&["--help"], 0, "Usage:", "stdout")]
#[case(&["self-check"], 0, "OK backend=", "stdout")]
#[case(&["--config", "/definitely/not/here.toml", "self-check"], 2, "read config", "stderr")]
#[case(&["bogus"], 2, "unrecognized subcommand", "stderr")]
fn cli_table_cases(
    #[case] args: &[&str],
    #[case] exit_code: i32,
    #[case] needle: &str,
    #[case] stream: &str,
) {
    let assert = bin().args(args).assert().code(exit_code);
    let out = assert.get_output();
    let text = if stream == "stdout" {
        String::from_utf8_lossy(&out.stdout).to_string()
    } else {
        String::from_utf8_lossy(&out.stderr).to_string()
    };
    assert!(text.contains(needle), "expected {needle:?} in {stream}: {text}");
}

#[rstest]
#[case("[detection]\ndistance_mm = 0\n", "distance_mm must be > 0")]
#[case("[sensor]\npin = 99\n", "not a BCM GPIO")]
#[case("[pause]\ncommand = \"\"\n", "pause.command must not be empty")]
#[case("[sensor\n", "invalid configuration")]
fn invalid_config_exits_with_config_code(#[case] toml: &str, #[case] needle: &str) {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, toml);
    bin()
        .arg("--config")
        .arg(&cfg)
        .arg("self-check")
        .assert()
        .code(2)
        .stderr(predicate::str::contains(needle));
}

#[test]
fn json_errors_are_structured() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "[detection]\nidle_timeout_s = -1\n");
    let out = bin()
        .arg("--json")
        .arg("--config")
        .arg(&cfg)
        .arg("self-check")
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&out.stderr);
    let line = stderr
        .lines()
        .rev()
        .find(|l| l.contains("\"type\":\"error\""))
        .expect("json error line");
    let v: serde_json::Value = serde_json::from_str(line).unwrap();
    assert_eq!(v["reason"], "Config");
    assert_eq!(v["exit_code"], 2);
}

#[test]
fn self_check_json_reports_method() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, DISTANCE);
    let out = bin()
        .arg("--json")
        .arg("--config")
        .arg(&cfg)
        .arg("self-check")
        .output()
        .unwrap();
    assert!(out.status.success());
    let v: serde_json::Value =
        serde_json::from_str(String::from_utf8_lossy(&out.stdout).trim()).unwrap();
    assert_eq!(v["status"], "ok");
    assert_eq!(v["method"], "distance");
    assert_eq!(v["pin"], 24);
}

#[test]
fn run_sends_pause_when_budget_runs_out() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, DISTANCE);
    let script = "event print_started\ngcode M83\ngcode G1 E14\ngcode G1 E14\ngcode G1 E1\ngcode G1 E1\nquit\n";
    let out = bin()
        .arg("--config")
        .arg(&cfg)
        .arg("run")
        .write_stdin(script)
        .output()
        .unwrap();
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert_eq!(stdout.matches("send M600").count(), 1, "stdout: {stdout}");
}

#[test]
fn run_pulse_replenishes_budget() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, DISTANCE);
    let script = "event print_started\ngcode M83\ngcode G1 E14\ngcode G1 E5\npulse\nstatus\nquit\n";
    let out = bin()
        .arg("--json")
        .arg("--config")
        .arg(&cfg)
        .arg("run")
        .write_stdin(script)
        .output()
        .unwrap();
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    let last: serde_json::Value =
        serde_json::from_str(stdout.lines().last().expect("status line")).unwrap();
    assert_eq!(last["type"], "state");
    assert_eq!(last["remaining_distance"], 15.0);
    assert_eq!(last["filament_moving"], true);
    assert!(!stdout.contains("send "));
}

#[test]
fn run_skips_malformed_lines() {
    let script = "hello there\nevent print_exploded\n\n# comment\nstatus\nquit\n";
    bin()
        .arg("run")
        .write_stdin(script)
        .assert()
        .success()
        .stdout(predicate::str::contains("state remaining=15.000"));
}

#[test]
fn run_reports_test_status() {
    let script = "test stop\ntest start\ntest start\ntest stop\n";
    bin()
        .arg("run")
        .write_stdin(script)
        .assert()
        .success()
        .stdout(
            predicate::str::contains("test connection test not running")
                .and(predicate::str::contains("test connection test started"))
                .and(predicate::str::contains("test connection test already running"))
                .and(predicate::str::contains("test connection test stopped")),
        );
}

#[test]
fn connection_test_prints_motion_ticks() {
    let out = bin()
        .arg("connection-test")
        .arg("--seconds")
        .arg("1")
        .output()
        .unwrap();
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.lines().count() >= 2, "stdout: {stdout}");
    assert!(stdout.lines().all(|l| l == "IDLE" || l == "MOVING"));
}

#[test]
fn connection_test_needs_active_sensor() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "[sensor]\nenabled = false\n");
    bin()
        .arg("--config")
        .arg(&cfg)
        .arg("connection-test")
        .arg("--seconds")
        .arg("1")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("sensor disabled"));
}
