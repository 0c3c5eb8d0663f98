// Tests for the command-line surface

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn dashboard() -> Command {
    let mut cmd = Command::cargo_bin("k6-dashboard").unwrap();
    cmd.env_remove("RUST_LOG");
    for key in ["PORT", "HOST", "TIMEZONE", "K6_BINARY", "AUTH_TOKEN", "LOG_LEVEL"] {
        cmd.env_remove(format!("K6DASH_{key}"));
    }
    cmd
}

/// Working directory with a fake k6 (`sh run ...`) and a config pointing at it.
fn workspace(k6_body: &str) -> TempDir {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("tests")).unwrap();
    std::fs::create_dir_all(dir.path().join("results")).unwrap();
    std::fs::write(dir.path().join("run"), k6_body).unwrap();
    let config = format!(
        r#"
[k6]
binary = "sh"
working_dir = "{}"

[timing]
kill_grace_period = "300ms"
single_results_delay = "50ms"
batch_results_delay = "50ms"
stream_drain_timeout = "500ms"
"#,
        dir.path().display()
    );
    std::fs::write(dir.path().join("cfg.toml"), config).unwrap();
    dir
}

#[test]
fn test_help_lists_commands() {
    dashboard()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_run_requires_test_name() {
    dashboard()
        .arg("run")
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("<TEST>"));
}

#[test]
fn test_config_reflects_environment_overrides() {
    let dir = TempDir::new().unwrap();
    dashboard()
        .current_dir(dir.path())
        .arg("config")
        .env("K6DASH_PORT", "4321")
        .assert()
        .success()
        .stdout(predicate::str::contains("port = 4321"))
        .stdout(predicate::str::contains("timezone = \"UTC\""));
}

#[test]
fn test_invalid_timezone_is_configuration_error() {
    let dir = TempDir::new().unwrap();
    dashboard()
        .current_dir(dir.path())
        .arg("config")
        .env("K6DASH_TIMEZONE", "Mars/Olympus_Mons")
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("Mars/Olympus_Mons"));
}

#[test]
fn test_missing_config_file_is_configuration_error() {
    let dir = TempDir::new().unwrap();
    dashboard()
        .current_dir(dir.path())
        .args(["-c", "missing.toml", "config"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("Configuration file not found"));
}

#[test]
fn test_run_prints_output_and_results_path() {
    let dir = workspace(k6_dashboard::testing::WRITES_SUMMARY);
    dashboard()
        .current_dir(dir.path())
        .args(["-c", "cfg.toml", "run", "account", "--profile", "HEAVY"])
        .assert()
        .success()
        .stdout(predicate::str::contains("🚀 Starting test: account"))
        .stdout(predicate::str::contains("📋 Profile: HEAVY"))
        .stdout(predicate::str::contains("running"))
        .stdout(predicate::str::contains("✅ Test completed successfully"))
        .stdout(predicate::str::contains("Results: results/"));
}

#[test]
fn test_failing_run_exits_nonzero() {
    let dir = workspace("echo boom >&2\nexit 3");
    dashboard()
        .current_dir(dir.path())
        .args(["-c", "cfg.toml", "run", "account"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("boom"))
        .stderr(predicate::str::contains("exit code 3"));
}
