//! Configuration management for sshx.
//!
//! ## config.kdl - User preferences
//!
//! Located at `~/.config/sshx/config.kdl` (or wherever `SSHX_CONFIG` points).
//!
//! Contains:
//! - `connections-dir` - Where connection files are stored
//! - `output-format` - "json" or "human"
//! - `ssh-program` - ssh client used by `sshx connect`
//! - `max-attempts`, `initial-delay-ms`, `backoff-multiplier` - file store retry envelope
//!
//! ## Precedence
//!
//! CLI flag > config.kdl > defaults. Use the [`resolver`] module for
//! unified precedence resolution.

pub mod resolver;
pub mod schema;

pub use resolver::{
    CONFIG_PATH_ENV, ConfigOverrides, DEFAULT_SSH_PROGRAM, Resolved, ResolvedConfig, ValueSource,
    config_path, load_config, resolve_config,
};
pub use schema::{OutputFormat, SshxConfig};
