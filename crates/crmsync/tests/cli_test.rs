//! Integration tests for the `crmsync` CLI binary.
//!
//! These tests validate argument parsing, help output, shell completions,
//! and error handling without a live sync server.
#![allow(clippy::unwrap_used)]

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

/// Nothing listens on port 1, so connects are refused immediately.
const DEAD_ENDPOINT: &str = "ws://127.0.0.1:1/ws";

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `crmsync` binary with env isolation.
///
/// Clears all `CRMSYNC_*` env vars and points config directories at a
/// nonexistent path so tests never touch the user's real configuration.
fn crmsync_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("crmsync");
    cmd.env("HOME", "/tmp/crmsync-cli-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/crmsync-cli-test-nonexistent")
        .env_remove("CRMSYNC_PROFILE")
        .env_remove("CRMSYNC_ENDPOINT")
        .env_remove("CRMSYNC_TOKEN")
        .env_remove("CRMSYNC_OUTPUT")
        .env_remove("CRMSYNC_TIMEOUT");
    cmd
}

/// Concatenate stdout + stderr from a command output for flexible matching.
fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = crmsync_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_flag() {
    crmsync_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("watch")
            .and(predicate::str::contains("publish"))
            .and(predicate::str::contains("presence"))
            .and(predicate::str::contains("activity"))
            .and(predicate::str::contains("status")),
    );
}

#[test]
fn test_version_flag() {
    crmsync_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("crmsync"));
}

// ── Shell completions ───────────────────────────────────────────────

#[test]
fn test_completions_bash() {
    crmsync_cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

#[test]
fn test_completions_zsh() {
    crmsync_cmd()
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#compdef"));
}

// ── Config ──────────────────────────────────────────────────────────

#[test]
fn test_config_path() {
    crmsync_cmd()
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("crmsync"));
}

#[test]
fn test_config_show_no_config() {
    // Falls back to the default config when no file exists
    crmsync_cmd()
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[defaults]"));
}

#[test]
fn test_config_set_unknown_key() {
    let dir = tempfile::tempdir().unwrap();
    crmsync_cmd()
        .env("HOME", dir.path())
        .env("XDG_CONFIG_HOME", dir.path())
        .args(["config", "set", "colour", "red"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("colour"));
}

#[test]
fn test_config_set_then_show() {
    let dir = tempfile::tempdir().unwrap();
    let run = |args: &[&str]| {
        crmsync_cmd()
            .env("HOME", dir.path())
            .env("XDG_CONFIG_HOME", dir.path())
            .args(args)
            .assert()
    };

    run(&["config", "set", "endpoint", "wss://crm.example.com/ws"]).success();
    run(&["config", "set", "heartbeat_secs", "15"]).success();
    run(&["config", "show"]).success().stdout(
        predicate::str::contains("[profiles.default]")
            .and(predicate::str::contains("wss://crm.example.com/ws"))
            .and(predicate::str::contains("heartbeat_secs = 15")),
    );
}

// ── Error cases ─────────────────────────────────────────────────────

#[test]
fn test_invalid_subcommand() {
    let output = crmsync_cmd().arg("foobar").output().unwrap();
    assert!(!output.status.success());
    let text = combined_output(&output);
    assert!(
        text.contains("unrecognized") || text.contains("foobar"),
        "Expected error mentioning invalid subcommand:\n{text}"
    );
}

#[test]
fn test_watch_without_config() {
    crmsync_cmd()
        .args(["watch", "leads"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("config").or(predicate::str::contains("endpoint")));
}

#[test]
fn test_watch_requires_a_channel() {
    crmsync_cmd()
        .args(["--endpoint", DEAD_ENDPOINT, "watch"])
        .assert()
        .code(2);
}

#[test]
fn test_missing_token_is_an_auth_error() {
    crmsync_cmd()
        .args(["--endpoint", DEAD_ENDPOINT, "watch", "leads"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("token"));
}

#[test]
fn test_non_websocket_endpoint_rejected() {
    crmsync_cmd()
        .args([
            "--endpoint",
            "https://crm.example.com/ws",
            "--token",
            "x",
            "status",
        ])
        .assert()
        .code(2);
}

#[test]
fn test_publish_rejects_invalid_json() {
    crmsync_cmd()
        .args([
            "--endpoint",
            DEAD_ENDPOINT,
            "--token",
            "x",
            "publish",
            "leads",
            "{not json",
        ])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("JSON"));
}

#[test]
fn test_invalid_presence_status() {
    let output = crmsync_cmd()
        .args(["--endpoint", DEAD_ENDPOINT, "presence", "--status", "sleeping"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("sleeping"));
}

#[test]
fn test_status_times_out_against_dead_server() {
    crmsync_cmd()
        .args([
            "--endpoint",
            DEAD_ENDPOINT,
            "--token",
            "x",
            "--timeout",
            "1",
            "--color",
            "never",
            "status",
        ])
        .timeout(std::time::Duration::from_secs(20))
        .assert()
        .code(8)
        .stdout(predicate::str::contains("Connecting").or(predicate::str::contains("Reconnecting")));
}

// ── Subcommand help discovery ───────────────────────────────────────

#[test]
fn test_config_subcommands_exist() {
    crmsync_cmd()
        .args(["config", "--help"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("init")
                .and(predicate::str::contains("show"))
                .and(predicate::str::contains("set-token"))
                .and(predicate::str::contains("use")),
        );
}
