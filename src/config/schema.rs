//! KDL schema definition for config.kdl.
//!
//! This module provides:
//! - The `SshxConfig` struct representing the KDL schema
//! - Conversion to/from KDL documents
//! - Validation and loading from disk

use crate::{Error, Result};
use kdl::{KdlDocument, KdlEntry, KdlNode, KdlValue};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};

/// Output format preference for CLI commands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// JSON output (default, machine-readable)
    #[default]
    Json,
    /// Human-readable output
    Human,
}

impl OutputFormat {
    /// Parse from string, case-insensitive.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(OutputFormat::Json),
            "human" => Some(OutputFormat::Human),
            _ => None,
        }
    }

    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Human => "human",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// User preferences stored in config.kdl.
///
/// # KDL Schema
///
/// ```kdl
/// connections-dir "/home/me/.local/share/sshx/connections"
/// output-format "human"  // or "json"
/// ssh-program "/usr/bin/ssh"
/// max-attempts 8
/// initial-delay-ms 30
/// backoff-multiplier 1.6
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SshxConfig {
    /// Directory holding one JSON file per connection
    pub connections_dir: Option<PathBuf>,

    /// Default output format for CLI commands
    pub output_format: Option<OutputFormat>,

    /// ssh client used by `sshx connect`
    pub ssh_program: Option<String>,

    /// Attempts per filesystem call before giving up
    pub max_attempts: Option<u32>,

    /// Sleep after the first failed attempt, in milliseconds
    pub initial_delay_ms: Option<u64>,

    /// Growth factor applied to the sleep after every failure
    pub backoff_multiplier: Option<f64>,
}

impl SshxConfig {
    /// Create an empty config with no values set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the config values.
    ///
    /// Returns an error message if any value is invalid.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.max_attempts == Some(0) {
            return Err("max-attempts must be at least 1".to_string());
        }
        if let Some(multiplier) = self.backoff_multiplier {
            if !multiplier.is_finite() || multiplier < 1.0 {
                return Err(format!(
                    "backoff-multiplier must be a finite number >= 1.0, got {}",
                    multiplier
                ));
            }
        }
        if let Some(ref program) = self.ssh_program {
            if program.trim().is_empty() {
                return Err("ssh-program must not be empty".to_string());
            }
        }
        Ok(())
    }

    /// Parse config from a KDL document.
    ///
    /// Values of the wrong type are rejected rather than ignored.
    pub fn from_kdl(doc: &KdlDocument) -> std::result::Result<Self, String> {
        let mut config = Self::new();

        if let Some(value) = first_value(doc, "connections-dir") {
            let s = value
                .as_string()
                .ok_or("connections-dir must be a string")?;
            config.connections_dir = Some(PathBuf::from(s));
        }

        if let Some(value) = first_value(doc, "output-format") {
            let s = value.as_string().ok_or("output-format must be a string")?;
            config.output_format = Some(
                OutputFormat::parse(s)
                    .ok_or_else(|| format!("output-format must be json or human, got {}", s))?,
            );
        }

        if let Some(value) = first_value(doc, "ssh-program") {
            let s = value.as_string().ok_or("ssh-program must be a string")?;
            config.ssh_program = Some(s.to_string());
        }

        if let Some(value) = first_value(doc, "max-attempts") {
            let i = value
                .as_integer()
                .ok_or("max-attempts must be an integer")?;
            config.max_attempts = Some(
                u32::try_from(i).map_err(|_| format!("max-attempts out of range: {}", i))?,
            );
        }

        if let Some(value) = first_value(doc, "initial-delay-ms") {
            let i = value
                .as_integer()
                .ok_or("initial-delay-ms must be an integer")?;
            config.initial_delay_ms = Some(
                u64::try_from(i).map_err(|_| format!("initial-delay-ms out of range: {}", i))?,
            );
        }

        if let Some(value) = first_value(doc, "backoff-multiplier") {
            let f = value
                .as_float()
                .or_else(|| value.as_integer().map(|i| i as f64))
                .ok_or("backoff-multiplier must be a number")?;
            config.backoff_multiplier = Some(f);
        }

        Ok(config)
    }

    /// Convert config to a KDL document.
    pub fn to_kdl(&self) -> KdlDocument {
        let mut doc = KdlDocument::new();

        if let Some(ref dir) = self.connections_dir {
            push(&mut doc, "connections-dir", KdlValue::String(dir.display().to_string()));
        }
        if let Some(format) = self.output_format {
            push(&mut doc, "output-format", KdlValue::String(format.as_str().to_string()));
        }
        if let Some(ref program) = self.ssh_program {
            push(&mut doc, "ssh-program", KdlValue::String(program.clone()));
        }
        if let Some(attempts) = self.max_attempts {
            push(&mut doc, "max-attempts", KdlValue::Integer(attempts as i128));
        }
        if let Some(delay) = self.initial_delay_ms {
            push(&mut doc, "initial-delay-ms", KdlValue::Integer(delay as i128));
        }
        if let Some(multiplier) = self.backoff_multiplier {
            push(&mut doc, "backoff-multiplier", KdlValue::Float(multiplier));
        }

        doc
    }

    /// Load config.kdl from `path`. A missing file yields an empty config.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(e) => return Err(Error::io(path, e)),
        };

        let doc: KdlDocument = contents
            .parse()
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        let config =
            Self::from_kdl(&doc).map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config
            .validate()
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Ok(config)
    }
}

fn first_value<'a>(doc: &'a KdlDocument, name: &str) -> Option<&'a KdlValue> {
    doc.get(name)
        .and_then(|node| node.entries().first())
        .map(|entry| entry.value())
}

fn push(doc: &mut KdlDocument, name: &str, value: KdlValue) {
    let mut node = KdlNode::new(name);
    node.push(KdlEntry::new(value));
    doc.nodes_mut().push(node);
}
