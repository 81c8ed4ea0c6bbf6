//! Command implementations for the sshx CLI.
//!
//! Each command returns a result type implementing [`Output`], so `main` can
//! print it either as JSON (the default) or as human-readable text.
//! Connection commands go through [`ConnectionRepository`] only; the
//! `connect` and `alias` commands hand off to [`crate::sys`].

use crate::config::ResolvedConfig;
use crate::models::{Connection, CreateConnectionRequest, UpdateConnectionRequest};
use crate::storage::ConnectionRepository;
use crate::sys;
use crate::{Error, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

/// Command results that can be serialized to JSON or formatted for humans.
pub trait Output {
    /// Serialize to JSON string.
    fn to_json(&self) -> String;

    /// Format for human-readable output.
    fn to_human(&self) -> String;
}

fn json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| format!(r#"{{"error": "{}"}}"#, e))
}

// === Connection commands ===

#[derive(Debug, Serialize)]
pub struct ConnectionCreated {
    pub created: bool,
    pub connection: Connection,
}

impl Output for ConnectionCreated {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        format!(
            "Created connection {} ({})",
            self.connection.name,
            self.connection.destination()
        )
    }
}

/// Create a new connection record.
pub async fn connection_create(
    repo: &ConnectionRepository,
    name: &str,
    request: CreateConnectionRequest,
    cancel: &CancellationToken,
) -> Result<ConnectionCreated> {
    let connection = repo.create(name, request, cancel).await?;
    Ok(ConnectionCreated {
        created: true,
        connection,
    })
}

#[derive(Debug, Serialize)]
pub struct ConnectionUpdated {
    /// Name the record had before the update
    pub previous_name: String,
    pub renamed: bool,
    pub connection: Connection,
}

impl Output for ConnectionUpdated {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.renamed {
            format!(
                "Renamed connection {} to {}",
                self.previous_name, self.connection.name
            )
        } else {
            format!("Updated connection {}", self.connection.name)
        }
    }
}

/// Apply a partial update, renaming the record when a new name is given.
pub async fn connection_update(
    repo: &ConnectionRepository,
    name: &str,
    request: UpdateConnectionRequest,
    cancel: &CancellationToken,
) -> Result<ConnectionUpdated> {
    let connection = repo.update(name, request, cancel).await?;
    Ok(ConnectionUpdated {
        previous_name: name.to_string(),
        renamed: connection.name != name,
        connection,
    })
}

#[derive(Debug, Serialize)]
pub struct ConnectionDeleted {
    pub deleted: String,
}

impl Output for ConnectionDeleted {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        format!("Deleted connection {}", self.deleted)
    }
}

/// Delete a connection record.
pub async fn connection_delete(
    repo: &ConnectionRepository,
    name: &str,
    cancel: &CancellationToken,
) -> Result<ConnectionDeleted> {
    repo.delete(name, cancel).await?;
    Ok(ConnectionDeleted {
        deleted: name.to_string(),
    })
}

/// A single connection, as printed by `sshx show`.
#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct ConnectionShow(pub Connection);

impl Output for ConnectionShow {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        self.0.to_string()
    }
}

/// Fetch one connection record.
pub async fn connection_show(
    repo: &ConnectionRepository,
    name: &str,
    cancel: &CancellationToken,
) -> Result<ConnectionShow> {
    repo.get(name, cancel).await.map(ConnectionShow)
}

#[derive(Debug, Serialize)]
pub struct ConnectionList {
    pub connections: Vec<Connection>,
    pub count: usize,
}

impl Output for ConnectionList {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.connections.is_empty() {
            return "No connections.".to_string();
        }
        self.connections
            .iter()
            .enumerate()
            .map(|(i, c)| format!("[{}] {} | {}:{}", i, c.name, c.destination(), c.port))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Read every stored connection.
pub async fn connection_list(
    repo: &ConnectionRepository,
    cancel: &CancellationToken,
) -> Result<ConnectionList> {
    let connections = repo.list_connections(cancel).await?;
    Ok(ConnectionList {
        count: connections.len(),
        connections,
    })
}

#[derive(Debug, Serialize)]
pub struct ConnectionNames {
    pub names: Vec<String>,
    pub count: usize,
}

impl Output for ConnectionNames {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        self.names.join("\n")
    }
}

/// List stored connection names.
pub async fn connection_names(
    repo: &ConnectionRepository,
    cancel: &CancellationToken,
) -> Result<ConnectionNames> {
    let names = repo.list_names(cancel).await?;
    Ok(ConnectionNames {
        count: names.len(),
        names,
    })
}

// === connect ===

/// A resolved ssh invocation for one connection.
#[derive(Debug, Serialize)]
pub struct ConnectTarget {
    pub program: String,
    pub args: Vec<String>,
    pub connection: Connection,
}

impl ConnectTarget {
    /// Launch ssh and return its exit code.
    pub fn run(&self) -> Result<i32> {
        sys::run_ssh(&self.program, &self.connection)
    }
}

/// Look up `name` and build the ssh invocation for it.
pub async fn connect_target(
    repo: &ConnectionRepository,
    config: &ResolvedConfig,
    name: &str,
    cancel: &CancellationToken,
) -> Result<ConnectTarget> {
    let connection = repo.get(name, cancel).await?;
    Ok(ConnectTarget {
        program: config.ssh_program().to_string(),
        args: sys::ssh_args(&connection),
        connection,
    })
}

// === alias ===

#[derive(Debug, Serialize)]
pub struct AliasEntry {
    pub path: PathBuf,
    pub added: bool,
}

#[derive(Debug, Serialize)]
pub struct AliasResult {
    pub alias: String,
    pub files: Vec<AliasEntry>,
}

impl Output for AliasResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        self.files
            .iter()
            .map(|entry| {
                let path = entry.path.display();
                if entry.added {
                    format!(
                        "Alias added to {}. Reload your shell or run 'source {}' to apply.",
                        path, path
                    )
                } else {
                    format!("Alias already present in {}.", path)
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Install `alias sshx='<exe>'` into the shell rc files under `home`.
pub fn alias_install(home: Option<&Path>, exe: &Path) -> Result<AliasResult> {
    let home =
        home.ok_or_else(|| Error::Other("Could not determine shell RC file.".to_string()))?;
    let files = sys::install_alias(home, exe)?
        .into_iter()
        .map(|install| AliasEntry {
            path: install.path,
            added: install.added,
        })
        .collect();

    Ok(AliasResult {
        alias: sys::alias_line(exe),
        files,
    })
}

// === config ===

#[derive(Debug, Serialize)]
pub struct ConfigEntry {
    pub key: &'static str,
    pub value: String,
    pub source: String,
}

#[derive(Debug, Serialize)]
pub struct ConfigShow {
    pub config_path: Option<PathBuf>,
    pub values: Vec<ConfigEntry>,
}

impl Output for ConfigShow {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let mut lines = Vec::with_capacity(self.values.len() + 1);
        if let Some(ref path) = self.config_path {
            lines.push(format!("config file: {}", path.display()));
        }
        for entry in &self.values {
            lines.push(format!("{} = {} ({})", entry.key, entry.value, entry.source));
        }
        lines.join("\n")
    }
}

/// Describe the resolved configuration and where each value came from.
pub fn config_show(config: &ResolvedConfig) -> ConfigShow {
    let entry = |key, value: String, source: &crate::config::ValueSource| ConfigEntry {
        key,
        value,
        source: source.to_string(),
    };

    ConfigShow {
        config_path: config.config_path.clone(),
        values: vec![
            entry(
                "connections-dir",
                config.connections_dir().display().to_string(),
                &config.connections_dir.source,
            ),
            entry(
                "output-format",
                config.output_format().to_string(),
                &config.output_format.source,
            ),
            entry(
                "ssh-program",
                config.ssh_program().to_string(),
                &config.ssh_program.source,
            ),
            entry(
                "max-attempts",
                config.max_attempts.value.to_string(),
                &config.max_attempts.source,
            ),
            entry(
                "initial-delay-ms",
                config.initial_delay.value.as_millis().to_string(),
                &config.initial_delay.source,
            ),
            entry(
                "backoff-multiplier",
                config.backoff_multiplier.value.to_string(),
                &config.backoff_multiplier.source,
            ),
        ],
    }
}
