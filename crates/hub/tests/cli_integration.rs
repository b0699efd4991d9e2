//! CLI integration tests for the `hub` command-line interface.
//!
//! None of these need a running server: they cover argument parsing, help
//! output, and the commands that only touch local state.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Get a command for the hub binary, isolated in `data_dir`.
fn hub(data_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("hub").unwrap();
    cmd.env("HUB_DATA_DIR", data_dir.path())
        .env("HUB_CONFIG", data_dir.path().join("config.toml"))
        .env("HUB_SERVER_URL", "http://127.0.0.1:9/api")
        .env_remove("HUB_PASSWORD");
    cmd
}

// ─────────────────────────────────────────────────────────────────────────────
// Help and Version Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_help_lists_subcommands() {
    let dir = TempDir::new().unwrap();
    hub(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("login"))
        .stdout(predicate::str::contains("exchange"))
        .stdout(predicate::str::contains("register"))
        .stdout(predicate::str::contains("check-username"))
        .stdout(predicate::str::contains("whoami"))
        .stdout(predicate::str::contains("proof"))
        .stdout(predicate::str::contains("call"))
        .stdout(predicate::str::contains("logout"))
        .stdout(predicate::str::contains("notices"));
}

#[test]
fn test_version_displays() {
    let dir = TempDir::new().unwrap();
    hub(&dir)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("hub"));
}

#[test]
fn test_login_requires_username() {
    let dir = TempDir::new().unwrap();
    hub(&dir)
        .arg("login")
        .assert()
        .failure()
        .stderr(predicate::str::contains("USERNAME"));
}

#[test]
fn test_call_rejects_malformed_query() {
    let dir = TempDir::new().unwrap();
    hub(&dir)
        .args(["call", "GET", "/posts", "--query", "novalue"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("KEY=VALUE"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Local-only commands
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_proof_creates_and_keeps_device_key() {
    let dir = TempDir::new().unwrap();
    let output = hub(&dir)
        .args(["proof", "GET", "https://hub.example.com/api/posts"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let proof = String::from_utf8(output.stdout).unwrap();
    assert_eq!(proof.trim().split('.').count(), 3);
    assert!(dir.path().join("dpop-key.json").exists());
}

#[test]
fn test_proof_json_includes_claims() {
    let dir = TempDir::new().unwrap();
    hub(&dir)
        .args(["--json", "proof", "post", "https://hub.example.com/api/posts"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"htm\": \"POST\""))
        .stdout(predicate::str::contains("\"thumbprint\""));
}

#[test]
fn test_whoami_offline_without_session() {
    let dir = TempDir::new().unwrap();
    hub(&dir)
        .args(["whoami", "--offline"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Not signed in"));
}

#[test]
fn test_notices_empty_history() {
    let dir = TempDir::new().unwrap();
    hub(&dir)
        .arg("notices")
        .assert()
        .success()
        .stdout(predicate::str::contains("No notifications"));
}
