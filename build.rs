//! Stamps the build with the commit and time shown by `sshx --version`.
//!
//! Exposes `SSHX_GIT_COMMIT` and `SSHX_BUILD_TIMESTAMP` to `env!`. Builds from
//! a source tarball can preset `SSHX_GIT_COMMIT`; otherwise `git describe` is
//! asked and "unknown" is used when that fails.

use std::env;
use std::process::Command;

const COMMIT_ENV: &str = "SSHX_GIT_COMMIT";

fn main() {
    println!("cargo:rerun-if-env-changed={}", COMMIT_ENV);
    println!("cargo:rerun-if-changed=.git/HEAD");

    let commit = env::var(COMMIT_ENV)
        .ok()
        .filter(|c| !c.trim().is_empty())
        .or_else(describe_head)
        .unwrap_or_else(|| "unknown".to_string());
    println!("cargo:rustc-env={}={}", COMMIT_ENV, commit);

    let built_at = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    println!("cargo:rustc-env=SSHX_BUILD_TIMESTAMP={}", built_at);
}

/// Short commit id of HEAD, suffixed with `-dirty` for uncommitted changes.
fn describe_head() -> Option<String> {
    let output = Command::new("git")
        .args(["describe", "--always", "--dirty", "--abbrev=8"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let described = String::from_utf8(output.stdout).ok()?;
    let described = described.trim();
    (!described.is_empty()).then(|| described.to_string())
}
