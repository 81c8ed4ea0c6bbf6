//! sshx - A personal SSH connection manager.
//!
//! This library provides the core functionality for the `sshx` CLI tool:
//! named connection profiles persisted one JSON file per profile, a
//! retrying, lock-guarded file store underneath them, and the command layer
//! the binary dispatches to.

pub mod cli;
pub mod commands;
pub mod config;
pub mod models;
pub mod storage;
pub mod sys;

use std::path::PathBuf;


/// Library-level error type for sshx operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Connection {0} does not exist")]
    NotFound(String),

    #[error("Connection {0} already exists")]
    AlreadyExists(String),

    #[error("IO error on {} after {attempts} attempt(s): {source}", .path.display())]
    Io {
        path: PathBuf,
        attempts: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not deserialize {}: {source}", .path.display())]
    Deserialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Deserialized value in {} is null", .0.display())]
    NullValue(PathBuf),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Wrap a filesystem error that happened outside the retry envelope.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            attempts: 1,
            source,
        }
    }
}

/// Result type alias for sshx operations.
pub type Result<T> = std::result::Result<T, Error>;
