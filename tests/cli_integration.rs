//! CLI integration tests
//!
//! Runs the built binary against temporary project directories.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

const INDEX: &str = r#"<!DOCTYPE html>
<html>
  <head>
    <script   src = 'js/app.js'  defer></script>
  </head>
</html>
"#;

fn setup_project() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("web/js")).unwrap();
    fs::write(dir.path().join("web/index.html"), INDEX).unwrap();
    fs::write(dir.path().join("web/js/app.min.js"), "").unwrap();
    fs::write(
        dir.path().join("update.toml"),
        r#"
[html]
dir = "web"
root = "web"
script_root = "web"

[[updates]]
"#,
    )
    .unwrap();
    dir
}

fn run(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_markup-patcher"))
        .current_dir(dir)
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG")
        .args(args)
        .output()
        .unwrap()
}

#[test]
fn test_update_help() {
    let dir = TempDir::new().unwrap();
    let output = run(dir.path(), &["update", "--help"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Rewrite documents so their script elements reference"));
    assert!(stdout.contains("--dry-run"));
}

#[test]
fn test_update_rewrites_reference() {
    let dir = setup_project();
    let output = run(
        dir.path(),
        &["update", "--config", "update.toml", "web/js/app.min.js"],
    );

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "stdout: {stdout}");
    assert!(stdout.contains("Updated"));
    assert_eq!(
        fs::read_to_string(dir.path().join("web/index.html")).unwrap(),
        INDEX.replace("'js/app.js'", "'./js/app.min.js'")
    );
}

#[test]
fn test_dry_run_with_diff() {
    let dir = setup_project();
    let output = run(
        dir.path(),
        &[
            "update",
            "--dry-run",
            "--diff",
            "--config",
            "update.toml",
            "web/js/app.min.js",
        ],
    );

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("DRY RUN"));
    assert!(stdout.contains("-    <script   src = 'js/app.js'  defer></script>"));
    assert!(stdout.contains("+    <script   src = './js/app.min.js'  defer></script>"));
    assert_eq!(
        fs::read_to_string(dir.path().join("web/index.html")).unwrap(),
        INDEX
    );
}

#[test]
fn test_check_fails_until_updated() {
    let dir = setup_project();
    let args = ["check", "--config", "update.toml", "web/js/app.min.js"];

    let before = run(dir.path(), &args);
    assert_eq!(before.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&before.stderr).contains("not up to date"));

    let update = run(
        dir.path(),
        &["update", "--config", "update.toml", "web/js/app.min.js"],
    );
    assert!(update.status.success());

    let after = run(dir.path(), &args);
    assert!(after.status.success());
    assert!(String::from_utf8_lossy(&after.stdout).contains("Already up to date"));
}

#[test]
fn test_base_dir_option() {
    let dir = setup_project();
    let elsewhere = TempDir::new().unwrap();
    let config = dir.path().join("update.toml");
    let script = dir.path().join("web/js/app.min.js");
    let output = run(
        elsewhere.path(),
        &[
            "update",
            "--config",
            config.to_str().unwrap(),
            "--base-dir",
            dir.path().to_str().unwrap(),
            script.to_str().unwrap(),
        ],
    );

    assert!(output.status.success());
    assert!(fs::read_to_string(dir.path().join("web/index.html"))
        .unwrap()
        .contains("'./js/app.min.js'"));
}

#[test]
fn test_invalid_config_fails() {
    let dir = setup_project();
    fs::write(dir.path().join("update.toml"), "[html]\n").unwrap();
    let output = run(
        dir.path(),
        &["update", "--config", "update.toml", "web/js/app.min.js"],
    );

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("invalid update config"));
}

#[test]
fn test_conflict_exits_with_failure() {
    let dir = setup_project();
    let output = run(
        dir.path(),
        &[
            "update",
            "--config",
            "update.toml",
            "web/js/app.min.js",
            "web/js/other.js",
        ],
    );

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("would reference both"));
    assert_eq!(
        fs::read_to_string(dir.path().join("web/index.html")).unwrap(),
        INDEX
    );
}

#[test]
fn test_missing_scripts_argument() {
    let dir = setup_project();
    let output = run(dir.path(), &["update", "--config", "update.toml"]);
    assert!(!output.status.success());
}

#[test]
fn test_json_report() {
    let dir = setup_project();
    let output = run(
        dir.path(),
        &[
            "update",
            "--dry-run",
            "--json",
            "--config",
            "update.toml",
            "web/js/app.min.js",
        ],
    );

    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let documents = report["documents"].as_array().unwrap();
    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0]["status"], "would_update");
    let last = documents[0]["diagnostics"].as_array().unwrap().last().unwrap();
    assert_eq!(last["severity"], "info");
    assert_eq!(last["message"], "would be updated");
}
