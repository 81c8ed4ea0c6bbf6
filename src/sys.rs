//! OS-level collaborators: launching ssh and installing the shell alias.

use crate::models::Connection;
use crate::{Error, Result};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

/// Shell rc files checked by `sshx alias`, in order.
pub const SHELL_RC_FILES: [&str; 2] = [".zshrc", ".bashrc"];

/// Arguments passed to the ssh client for `connection`.
pub fn ssh_args(connection: &Connection) -> Vec<String> {
    vec![
        connection.destination(),
        "-p".to_string(),
        connection.port.to_string(),
    ]
}

/// Build the ssh command without running it.
pub fn ssh_command(program: &str, connection: &Connection) -> Command {
    let mut cmd = Command::new(program);
    cmd.args(ssh_args(connection));
    cmd
}

/// Run an interactive ssh session and wait for it to exit.
///
/// Returns the client's exit code; a session killed by a signal reports 255,
/// the same code ssh uses for its own failures.
pub fn run_ssh(program: &str, connection: &Connection) -> Result<i32> {
    let mut cmd = ssh_command(program, connection);
    debug!(program, args = ?ssh_args(connection), "launching ssh");

    let status = cmd
        .status()
        .map_err(|e| Error::Other(format!("Failed to launch {}: {}", program, e)))?;
    Ok(status.code().unwrap_or(255))
}

/// Outcome of installing the alias into one rc file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasInstall {
    /// The rc file that was considered
    pub path: PathBuf,
    /// False when the exact alias line was already present
    pub added: bool,
}

/// The alias line for the executable at `exe`.
pub fn alias_line(exe: &Path) -> String {
    format!("alias sshx='{}'", exe.display())
}

/// Existing shell rc files under `home`.
pub fn shell_rc_files(home: &Path) -> Vec<PathBuf> {
    SHELL_RC_FILES
        .iter()
        .map(|name| home.join(name))
        .filter(|path| path.is_file())
        .collect()
}

/// Append the sshx alias to every existing rc file under `home`.
///
/// Files that already contain the exact line are left untouched.
pub fn install_alias(home: &Path, exe: &Path) -> Result<Vec<AliasInstall>> {
    let rc_files = shell_rc_files(home);
    if rc_files.is_empty() {
        return Err(Error::Other("Could not determine shell RC file.".to_string()));
    }

    let line = alias_line(exe);
    let mut installs = Vec::with_capacity(rc_files.len());

    for path in rc_files {
        let contents = fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;
        if contents.lines().any(|l| l.trim() == line) {
            installs.push(AliasInstall { path, added: false });
            continue;
        }

        let mut file = OpenOptions::new()
            .append(true)
            .open(&path)
            .map_err(|e| Error::io(&path, e))?;
        let prefix = if contents.is_empty() || contents.ends_with('\n') {
            ""
        } else {
            "\n"
        };
        writeln!(file, "{}{}", prefix, line).map_err(|e| Error::io(&path, e))?;
        info!(path = %path.display(), "installed sshx alias");

        installs.push(AliasInstall { path, added: true });
    }

    Ok(installs)
}

/// Absolute path of the running executable.
pub fn current_exe() -> Result<PathBuf> {
    let exe = std::env::current_exe()
        .map_err(|e| Error::Other(format!("Could not determine executable path: {}", e)))?;
    Ok(exe.canonicalize().unwrap_or(exe))
}
