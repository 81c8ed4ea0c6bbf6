//! Smoke tests for the sshx CLI.
//!
//! These tests verify basic CLI functionality:
//! - `sshx --version` outputs version info
//! - `sshx --help` outputs help text
//! - unknown commands and missing arguments fail

use assert_cmd::Command;
use predicates::prelude::*;

/// Get a Command for the sshx binary.
fn sshx() -> Command {
    Command::new(env!("CARGO_BIN_EXE_sshx"))
}

#[test]
fn test_version_flag() {
    sshx()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("sshx"))
        .stdout(predicate::str::contains("0.1.0"));
}

#[test]
fn test_long_version_includes_build_info() {
    sshx()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("built"));
}

#[test]
fn test_help_flag() {
    sshx()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"))
        .stdout(predicate::str::contains("Commands:"))
        .stdout(predicate::str::contains("Options:"));
}

#[test]
fn test_help_flag_short() {
    sshx()
        .arg("-h")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"));
}

#[test]
fn test_help_lists_commands() {
    sshx()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("create"))
        .stdout(predicate::str::contains("update"))
        .stdout(predicate::str::contains("connect"))
        .stdout(predicate::str::contains("alias"));
}

#[test]
fn test_create_help() {
    sshx()
        .args(["create", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--port"))
        .stdout(predicate::str::contains("--description"));
}

#[test]
fn test_invalid_command() {
    sshx()
        .arg("invalid-command")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_missing_arguments() {
    sshx()
        .args(["create", "web"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("required"));
}
