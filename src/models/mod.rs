//! Data models for sshx entities.
//!
//! This module defines the core data structures:
//! - `Connection` - A named SSH target (user, host, port, description)
//! - `CreateConnectionRequest` - Fields needed to create a connection
//! - `UpdateConnectionRequest` - A patch where every field is independently optional

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default SSH port used when none is given.
pub const DEFAULT_PORT: u16 = 22;

/// A stored SSH connection profile.
///
/// The `name` doubles as the storage key: each connection lives in
/// `<connections-dir>/<name>.json`. Field aliases accept files written with
/// PascalCase keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    /// Unique connection name
    #[serde(alias = "Name")]
    pub name: String,

    /// Free-text description
    #[serde(default, alias = "Description")]
    pub description: Option<String>,

    /// SSH username
    #[serde(alias = "User")]
    pub user: String,

    /// Hostname or IP address
    #[serde(alias = "Host")]
    pub host: String,

    /// SSH port
    #[serde(alias = "Port")]
    pub port: u16,
}

impl Connection {
    /// Build a connection from its name and a create request.
    pub fn new(name: impl Into<String>, request: CreateConnectionRequest) -> Self {
        Self {
            name: name.into(),
            description: request.description,
            user: request.user,
            host: request.host,
            port: request.port,
        }
    }

    /// The `user@host` target passed to ssh.
    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    /// Check every field before the record touches the disk.
    pub fn validate(&self) -> Result<()> {
        validate_name(&self.name)?;
        validate_token("user", &self.user)?;
        validate_token("host", &self.host)?;
        if self.port == 0 {
            return Err(Error::InvalidInput(
                "port must be between 1 and 65535".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {}@{}:{}\n{}",
            self.name,
            self.user,
            self.host,
            self.port,
            self.description.as_deref().unwrap_or("")
        )
    }
}

/// Fields required to create a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateConnectionRequest {
    pub description: Option<String>,
    pub user: String,
    pub host: String,
    pub port: u16,
}

impl CreateConnectionRequest {
    /// Create a request with the default port and no description.
    pub fn new(user: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            description: None,
            user: user.into(),
            host: host.into(),
            port: DEFAULT_PORT,
        }
    }

    /// Set the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Patch applied to an existing connection.
///
/// `None` means "keep the stored value". `Some(String::new())` for the
/// description stores an empty description; it does not remove the field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateConnectionRequest {
    pub new_name: Option<String>,
    pub new_description: Option<String>,
    pub new_user: Option<String>,
    pub new_host: Option<String>,
    pub new_port: Option<u16>,
}

impl UpdateConnectionRequest {
    /// Create an empty patch.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.new_name = Some(name.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.new_description = Some(description.into());
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.new_user = Some(user.into());
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.new_host = Some(host.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.new_port = Some(port);
        self
    }

    /// Overlay the present fields onto `existing`.
    pub fn apply(&self, existing: &Connection) -> Connection {
        Connection {
            name: self.new_name.clone().unwrap_or_else(|| existing.name.clone()),
            description: self
                .new_description
                .clone()
                .or_else(|| existing.description.clone()),
            user: self.new_user.clone().unwrap_or_else(|| existing.user.clone()),
            host: self.new_host.clone().unwrap_or_else(|| existing.host.clone()),
            port: self.new_port.unwrap_or(existing.port),
        }
    }

    /// The target name if this patch renames `current`.
    pub fn rename_target(&self, current: &str) -> Option<&str> {
        self.new_name.as_deref().filter(|name| *name != current)
    }
}

/// Validate a connection name.
///
/// Names are file stems, so anything that could escape the connections
/// directory or produce a hidden file is rejected.
pub fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::InvalidInput(
            "connection name must not be empty".to_string(),
        ));
    }
    if name.starts_with('.') {
        return Err(Error::InvalidInput(format!(
            "connection name must not start with '.': {}",
            name
        )));
    }
    if name
        .chars()
        .any(|c| c == '/' || c == '\\' || c.is_control())
    {
        return Err(Error::InvalidInput(format!(
            "connection name must not contain path separators or control characters: {:?}",
            name
        )));
    }
    Ok(())
}

fn validate_token(field: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::InvalidInput(format!("{} must not be empty", field)));
    }
    if value.chars().any(char::is_whitespace) {
        return Err(Error::InvalidInput(format!(
            "{} must not contain whitespace: {:?}",
            field, value
        )));
    }
    Ok(())
}
