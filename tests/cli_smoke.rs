//! CLI smoke tests.
//!
//! These tests run the compiled binary against temporary config files and
//! verify exit codes and output.

use std::path::Path;
use std::process::Command;

use tempfile::TempDir;

/// Helper: run plugwarden with given args and return (exit_code, stdout, stderr).
fn run_cli(args: &[&str]) -> (i32, String, String) {
    let bin = env!("CARGO_BIN_EXE_plugwarden");
    let output = Command::new(bin)
        .args(args)
        .env("RUST_LOG", "off") // suppress tracing noise
        .output()
        .expect("failed to execute plugwarden binary");
    let code = output.status.code().unwrap_or(-1);
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (code, stdout, stderr)
}

fn write_config(dir: &TempDir, body: &str) -> String {
    let path = dir.path().join("config.json");
    std::fs::write(&path, body).unwrap();
    path_str(&path)
}

fn path_str(path: &Path) -> String {
    path.display().to_string()
}

// ============================================================================
// Help & Version
// ============================================================================

#[test]
fn cli_no_args_shows_help() {
    let (code, stdout, _stderr) = run_cli(&[]);
    assert_eq!(code, 0);
    assert!(stdout.contains("Usage:"));
    assert!(stdout.contains("plugwarden"));
}

#[test]
fn cli_version_command() {
    let (code, stdout, _stderr) = run_cli(&["version"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("plugwarden"));
    assert!(stdout.contains('.'));
}

// ============================================================================
// Plan
// ============================================================================

#[test]
fn cli_plan_prints_dependency_order() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(
        &dir,
        r#"{"plugins": [
            {"id": "trader", "dependencies": ["oracle", "wallet"]},
            {"id": "oracle", "dependencies": ["wallet"]},
            {"id": "wallet"}
        ]}"#,
    );

    let (code, stdout, stderr) = run_cli(&["plan", "--config", &config]);
    assert_eq!(code, 0, "stderr: {}", stderr);
    let wallet = stdout.find("wallet").unwrap();
    let oracle = stdout.find("oracle").unwrap();
    let trader = stdout.find("trader").unwrap();
    assert!(wallet < oracle && oracle < trader, "got: {}", stdout);
    assert!(stdout.contains("3 plugin(s)"));
}

#[test]
fn cli_plan_reports_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(
        &dir,
        r#"{"plugins": [
            {"id": "a", "dependencies": ["b"]},
            {"id": "b", "dependencies": ["a"]}
        ]}"#,
    );

    let (code, _stdout, stderr) = run_cli(&["plan", "--config", &config]);
    assert_ne!(code, 0);
    assert!(stderr.contains("a -> b -> a"), "got: {}", stderr);
}

#[test]
fn cli_plan_without_plugins() {
    let dir = tempfile::tempdir().unwrap();
    let missing = path_str(&dir.path().join("absent.json"));
    let (code, stdout, _stderr) = run_cli(&["plan", "--config", &missing]);
    assert_eq!(code, 0);
    assert!(stdout.contains("No plugins declared"));
}

// ============================================================================
// Config
// ============================================================================

#[test]
fn cli_config_check_valid() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(&dir, r#"{"plugins": [{"id": "wallet"}]}"#);
    let (code, stdout, _stderr) = run_cli(&["config", "check", "--config", &config]);
    assert_eq!(code, 0);
    assert!(stdout.contains("Configuration looks good!"), "got: {}", stdout);
}

#[test]
fn cli_config_check_unknown_field() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(&dir, r#"{"plugns": []}"#);
    let (code, stdout, _stderr) = run_cli(&["config", "check", "--config", &config]);
    assert_eq!(code, 0);
    assert!(stdout.contains("did you mean 'plugins'?"), "got: {}", stdout);
}

#[test]
fn cli_config_show_applies_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(&dir, r#"{"manager": {"error_threshold": 4}}"#);
    let (code, stdout, _stderr) = run_cli(&["config", "show", "--config", &config]);
    assert_eq!(code, 0);
    let shown: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(shown["manager"]["error_threshold"], 4);
    assert_eq!(shown["manager"]["heartbeat_timeout_ms"], 30000);
}
