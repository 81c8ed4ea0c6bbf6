//! CLI argument definitions for sshx.

use crate::models::{CreateConnectionRequest, DEFAULT_PORT, UpdateConnectionRequest};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("SSHX_GIT_COMMIT"),
    ", built ",
    env!("SSHX_BUILD_TIMESTAMP"),
    ")"
);

/// sshx - A small manager for named SSH connections.
///
/// Save a target once with `sshx create`, then open it with `sshx connect <name>`.
#[derive(Parser, Debug)]
#[command(name = "sshx")]
#[command(author, version, long_version = LONG_VERSION, about = "Manage and open named SSH connections", long_about = None)]
pub struct Cli {
    /// Output in human-readable format instead of JSON
    #[arg(short = 'H', long = "human", global = true)]
    pub human_readable: bool,

    /// Log debug output to stderr (overridden by SSHX_LOG / RUST_LOG)
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    /// Store data under <path> instead of the platform data directory.
    /// Connections live in <path>/connections.
    /// Can also be set via SSHX_DATA_DIR environment variable.
    #[arg(long = "data-dir", global = true, env = "SSHX_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Save a new connection
    Create {
        /// Connection name (used as the file name)
        name: String,

        /// SSH username
        user: String,

        /// Hostname or IP address
        host: String,

        /// SSH port
        #[arg(short, long, default_value_t = DEFAULT_PORT, value_parser = clap::value_parser!(u16).range(1..))]
        port: u16,

        /// Free-text description
        #[arg(short, long)]
        description: Option<String>,
    },

    /// Change fields of an existing connection (only the given flags are applied)
    Update {
        /// Connection to update
        name: String,

        /// Rename the connection
        #[arg(short = 'n', long = "name")]
        new_name: Option<String>,

        /// New SSH username
        #[arg(short, long)]
        user: Option<String>,

        /// New hostname or IP address
        #[arg(short = 'a', long = "host")]
        host: Option<String>,

        /// New SSH port
        #[arg(short, long, value_parser = clap::value_parser!(u16).range(1..))]
        port: Option<u16>,

        /// New description
        #[arg(short, long)]
        description: Option<String>,
    },

    /// Delete a connection
    Delete {
        /// Connection name
        name: String,
    },

    /// Show a single connection
    Show {
        /// Connection name
        name: String,
    },

    /// List all connections
    List,

    /// List connection names only (for scripts and shell completion)
    Names,

    /// Open an SSH session to a saved connection
    ///
    /// The ssh client's exit code becomes sshx's exit code.
    Connect {
        /// Connection name
        name: String,
    },

    /// Add `alias sshx=...` to ~/.zshrc and/or ~/.bashrc
    Alias,

    /// Show the resolved configuration and where each value came from
    Config,
}

impl Commands {
    /// Short command name, used in log spans.
    pub fn name(&self) -> &'static str {
        match self {
            Commands::Create { .. } => "create",
            Commands::Update { .. } => "update",
            Commands::Delete { .. } => "delete",
            Commands::Show { .. } => "show",
            Commands::List => "list",
            Commands::Names => "names",
            Commands::Connect { .. } => "connect",
            Commands::Alias => "alias",
            Commands::Config => "config",
        }
    }
}

/// Build a create request from `sshx create` arguments.
pub fn create_request(
    user: String,
    host: String,
    port: u16,
    description: Option<String>,
) -> CreateConnectionRequest {
    let request = CreateConnectionRequest::new(user, host).with_port(port);
    match description {
        Some(description) => request.with_description(description),
        None => request,
    }
}

/// Build an update patch from `sshx update` flags.
pub fn update_request(
    new_name: Option<String>,
    user: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    description: Option<String>,
) -> UpdateConnectionRequest {
    UpdateConnectionRequest {
        new_name,
        new_description: description,
        new_user: user,
        new_host: host,
        new_port: port,
    }
}
