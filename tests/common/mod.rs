//! Common test utilities for sshx integration tests.
//!
//! Provides `TestEnv` for isolated test environments that don't touch the
//! user's real connections, config.kdl, or shell rc files.

#![allow(dead_code)]

use assert_cmd::Command;
use std::path::{Path, PathBuf};
pub use tempfile::TempDir;

/// A test environment with isolated data storage.
///
/// Each `TestEnv` creates two temporary directories:
/// - `data_dir`: Holds sshx's data (via `SSHX_DATA_DIR` env var)
/// - `home_dir`: Stands in for `$HOME`, and holds `config.kdl`
///
/// The `sshx()` method sets the environment per-invocation, making tests
/// parallel-safe.
pub struct TestEnv {
    pub data_dir: TempDir,
    pub home_dir: TempDir,
}

impl TestEnv {
    /// Create a new test environment with isolated directories.
    pub fn new() -> Self {
        Self {
            data_dir: TempDir::new().unwrap(),
            home_dir: TempDir::new().unwrap(),
        }
    }

    /// Get a Command for the sshx binary with isolated data and config.
    pub fn sshx(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_sshx"));
        cmd.current_dir(self.home_dir.path());
        cmd.env("SSHX_DATA_DIR", self.data_dir.path());
        cmd.env("SSHX_CONFIG", self.config_path());
        cmd.env("HOME", self.home_dir.path());
        cmd.env_remove("SSHX_LOG");
        cmd.env_remove("RUST_LOG");
        cmd
    }

    /// Create a connection, asserting success.
    pub fn create(&self, name: &str, user: &str, host: &str) {
        self.sshx()
            .args(["create", name, user, host])
            .assert()
            .success();
    }

    /// Path of the (possibly missing) config.kdl used by `sshx()`.
    pub fn config_path(&self) -> PathBuf {
        self.home_dir.path().join("config.kdl")
    }

    /// Write config.kdl contents.
    pub fn write_config(&self, contents: &str) {
        std::fs::write(self.config_path(), contents).unwrap();
    }

    /// Directory holding the connection files.
    pub fn connections_dir(&self) -> PathBuf {
        self.data_dir.path().join("connections")
    }

    /// Path of the stored file for `name`.
    pub fn connection_file(&self, name: &str) -> PathBuf {
        self.connections_dir().join(format!("{}.json", name))
    }

    /// Get the path to the fake home directory.
    pub fn home_path(&self) -> &Path {
        self.home_dir.path()
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse stdout of a successful command as JSON.
pub fn parse_json(output: &[u8]) -> serde_json::Value {
    serde_json::from_slice(output).unwrap()
}
