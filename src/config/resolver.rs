//! Unified precedence resolution for configuration.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. CLI flags (`--data-dir`/`SSHX_DATA_DIR`, `-H`)
//! 2. config.kdl (`~/.config/sshx/config.kdl`, or `SSHX_CONFIG`)
//! 3. Built-in defaults

use crate::config::{OutputFormat, SshxConfig};
use crate::storage::{
    DEFAULT_BACKOFF_MULTIPLIER, DEFAULT_INITIAL_DELAY, DEFAULT_MAX_ATTEMPTS, RetryPolicy,
    get_connections_dir,
};
use crate::{Error, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable pointing at an alternative config.kdl.
pub const CONFIG_PATH_ENV: &str = "SSHX_CONFIG";

/// ssh client launched by `sshx connect` when nothing else is configured.
pub const DEFAULT_SSH_PROGRAM: &str = "ssh";

/// Tracks where a resolved value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSource {
    /// Value from a CLI flag or its environment variable
    CliFlag,
    /// Value from config.kdl at the given path
    ConfigFile(String),
    /// Built-in default value
    Default,
}

impl std::fmt::Display for ValueSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueSource::CliFlag => write!(f, "cli"),
            ValueSource::ConfigFile(path) => write!(f, "config:{}", path),
            ValueSource::Default => write!(f, "default"),
        }
    }
}

/// A resolved value with its source.
#[derive(Debug, Clone)]
pub struct Resolved<T> {
    /// The resolved value
    pub value: T,
    /// Where the value came from
    pub source: ValueSource,
}

impl<T> Resolved<T> {
    /// Create a new resolved value.
    pub fn new(value: T, source: ValueSource) -> Self {
        Self { value, source }
    }
}

/// Fully resolved configuration with source tracking.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Path of the config file that was consulted (it may not exist)
    pub config_path: Option<PathBuf>,
    pub connections_dir: Resolved<PathBuf>,
    pub output_format: Resolved<OutputFormat>,
    pub ssh_program: Resolved<String>,
    pub max_attempts: Resolved<u32>,
    pub initial_delay: Resolved<Duration>,
    pub backoff_multiplier: Resolved<f64>,
}

impl ResolvedConfig {
    pub fn connections_dir(&self) -> &Path {
        &self.connections_dir.value
    }

    pub fn output_format(&self) -> OutputFormat {
        self.output_format.value
    }

    pub fn ssh_program(&self) -> &str {
        &self.ssh_program.value
    }

    /// Retry envelope for the file store.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.value,
            initial_delay: self.initial_delay.value,
            backoff_multiplier: self.backoff_multiplier.value,
        }
    }
}

/// CLI overrides for configuration resolution.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Data directory from `--data-dir` / `SSHX_DATA_DIR`
    pub data_dir: Option<PathBuf>,
    /// Output format override from CLI flag
    pub output_format: Option<OutputFormat>,
}

impl ConfigOverrides {
    /// Create empty overrides.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set data directory override.
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    /// Set output format override.
    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = Some(format);
        self
    }
}

/// Location of config.kdl: `SSHX_CONFIG` if set, else `<config_dir>/sshx/config.kdl`.
pub fn config_path() -> Option<PathBuf> {
    match std::env::var_os(CONFIG_PATH_ENV) {
        Some(path) if !path.is_empty() => Some(PathBuf::from(path)),
        _ => dirs::config_dir().map(|dir| dir.join("sshx").join("config.kdl")),
    }
}

/// Load config.kdl from its default location and resolve against `overrides`.
pub fn load_config(overrides: &ConfigOverrides) -> Result<ResolvedConfig> {
    let path = config_path();
    let file = match path {
        Some(ref path) => SshxConfig::load(path)?,
        None => SshxConfig::new(),
    };
    resolve_config(&file, path.as_deref(), overrides)
}

/// Resolve configuration with full precedence chain.
///
/// Precedence (highest to lowest):
/// 1. CLI flags (from `overrides`)
/// 2. config.kdl values (`file`, read from `path`)
/// 3. Built-in defaults
pub fn resolve_config(
    file: &SshxConfig,
    path: Option<&Path>,
    overrides: &ConfigOverrides,
) -> Result<ResolvedConfig> {
    let from_file = || {
        ValueSource::ConfigFile(
            path.map(|p| p.display().to_string())
                .unwrap_or_else(|| "config.kdl".to_string()),
        )
    };

    let connections_dir = if let Some(ref dir) = overrides.data_dir {
        Resolved::new(get_connections_dir(Some(dir))?, ValueSource::CliFlag)
    } else if let Some(ref dir) = file.connections_dir {
        Resolved::new(dir.clone(), from_file())
    } else {
        Resolved::new(get_connections_dir(None)?, ValueSource::Default)
    };

    let output_format = if let Some(format) = overrides.output_format {
        Resolved::new(format, ValueSource::CliFlag)
    } else if let Some(format) = file.output_format {
        Resolved::new(format, from_file())
    } else {
        Resolved::new(OutputFormat::default(), ValueSource::Default)
    };

    let ssh_program = match file.ssh_program {
        Some(ref program) => Resolved::new(program.clone(), from_file()),
        None => Resolved::new(DEFAULT_SSH_PROGRAM.to_string(), ValueSource::Default),
    };

    let max_attempts = match file.max_attempts {
        Some(attempts) => Resolved::new(attempts, from_file()),
        None => Resolved::new(DEFAULT_MAX_ATTEMPTS, ValueSource::Default),
    };

    let initial_delay = match file.initial_delay_ms {
        Some(ms) => Resolved::new(Duration::from_millis(ms), from_file()),
        None => Resolved::new(DEFAULT_INITIAL_DELAY, ValueSource::Default),
    };

    let backoff_multiplier = match file.backoff_multiplier {
        Some(multiplier) => Resolved::new(multiplier, from_file()),
        None => Resolved::new(DEFAULT_BACKOFF_MULTIPLIER, ValueSource::Default),
    };

    if connections_dir.value.as_os_str().is_empty() {
        return Err(Error::Config("connections directory must not be empty".to_string()));
    }

    Ok(ResolvedConfig {
        config_path: path.map(Path::to_path_buf),
        connections_dir,
        output_format,
        ssh_program,
        max_attempts,
        initial_delay,
        backoff_multiplier,
    })
}
