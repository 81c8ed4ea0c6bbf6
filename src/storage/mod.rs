//! Storage layer for sshx data.
//!
//! Every connection lives in its own JSON file, `<connections-dir>/<name>.json`.
//! There is no index: the directory listing is the source of truth.
//!
//! ## Layers
//!
//! - [`backend`] - raw async filesystem primitives ([`DiskBackend`] in production)
//! - [`json_file`] - one typed file with a per-file gate and retry/backoff
//! - [`ConnectionRepository`] - the name-keyed collection built on top
//!
//! Nothing is cached between calls; every operation re-reads from disk.

pub mod backend;
pub mod json_file;

pub use backend::{DiskBackend, FileBackend};
pub use json_file::{
    DEFAULT_BACKOFF_MULTIPLIER, DEFAULT_INITIAL_DELAY, DEFAULT_MAX_ATTEMPTS, JsonFile,
    LockedJsonFile, RetryPolicy, is_transient,
};

use crate::models::{
    Connection, CreateConnectionRequest, UpdateConnectionRequest, validate_name,
};
use crate::{Error, Result};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// File extension of stored connections.
pub const CONNECTION_EXTENSION: &str = "json";

/// Environment variable overriding the sshx data directory.
pub const DATA_DIR_ENV: &str = "SSHX_DATA_DIR";

/// Name-keyed collection of connections, one file per connection.
///
/// Store handles are created on first use of a name and then shared, so all
/// operations on the same name within this process go through one gate.
#[derive(Debug)]
pub struct ConnectionRepository {
    root: PathBuf,
    backend: Arc<dyn FileBackend>,
    policy: RetryPolicy,
    files: Mutex<HashMap<PathBuf, Arc<JsonFile<Connection>>>>,
}

impl ConnectionRepository {
    /// Open the repository on the local disk with the default retry policy.
    ///
    /// Creates `root` if it does not exist.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        Self::open_with_policy(root, RetryPolicy::default()).await
    }

    /// Open the repository on the local disk with a custom retry policy.
    pub async fn open_with_policy(root: impl Into<PathBuf>, policy: RetryPolicy) -> Result<Self> {
        Self::open_with_backend(root, Arc::new(DiskBackend), policy).await
    }

    /// Open the repository on an arbitrary backend.
    pub async fn open_with_backend(
        root: impl Into<PathBuf>,
        backend: Arc<dyn FileBackend>,
        policy: RetryPolicy,
    ) -> Result<Self> {
        let root = root.into();
        backend
            .create_dir_all(&root)
            .await
            .map_err(|e| Error::io(&root, e))?;
        debug!(root = %root.display(), "opened connection repository");

        Ok(Self {
            root,
            backend,
            policy,
            files: Mutex::new(HashMap::new()),
        })
    }

    /// Directory holding the connection files.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create a new connection. Fails if `name` is taken.
    ///
    /// The existence check and the write happen under one gate permit, so of
    /// several concurrent creates of the same name exactly one succeeds.
    pub async fn create(
        &self,
        name: &str,
        request: CreateConnectionRequest,
        cancel: &CancellationToken,
    ) -> Result<Connection> {
        check_cancelled(cancel)?;
        let connection = Connection::new(name, request);
        connection.validate()?;

        let file = self.file(name);
        let locked = file.lock(cancel).await?;
        if locked.exists(cancel).await? {
            return Err(Error::AlreadyExists(name.to_string()));
        }
        locked.write(&connection, cancel).await?;
        info!(name, "created connection");
        Ok(connection)
    }

    /// Apply a patch to an existing connection, renaming it if requested.
    ///
    /// The stored record is read, patched and written back under one permit,
    /// so concurrent updates of the same name do not lose each other's fields.
    /// A rename also holds the target's permit; it writes the new file before
    /// removing the old one, so a crash in between leaves both copies rather
    /// than none.
    pub async fn update(
        &self,
        name: &str,
        request: UpdateConnectionRequest,
        cancel: &CancellationToken,
    ) -> Result<Connection> {
        check_cancelled(cancel)?;
        validate_name(name)?;
        let current = self.file(name);

        let updated = match request.rename_target(name) {
            Some(new_name) => {
                validate_name(new_name)?;
                let target = self.file(new_name);
                let (source, dest) = lock_pair(&current, &target, cancel).await?;

                let updated = patch(&source, name, &request, cancel).await?;
                if dest.exists(cancel).await? {
                    return Err(Error::AlreadyExists(new_name.to_string()));
                }
                dest.write(&updated, cancel).await?;
                source.remove(cancel).await?;
                info!(from = name, to = new_name, "renamed connection");
                updated
            }
            None => {
                let locked = current.lock(cancel).await?;
                let updated = patch(&locked, name, &request, cancel).await?;
                locked.write(&updated, cancel).await?;
                info!(name, "updated connection");
                updated
            }
        };

        drop(current);
        self.release_idle();
        Ok(updated)
    }

    /// Fetch one connection.
    pub async fn get(&self, name: &str, cancel: &CancellationToken) -> Result<Connection> {
        check_cancelled(cancel)?;
        validate_name(name)?;
        self.ensure_exists(name).await?;

        self.file(name)
            .read(cancel)
            .await
            .map_err(|e| missing_as_not_found(name, e))
    }

    /// Delete one connection.
    pub async fn delete(&self, name: &str, cancel: &CancellationToken) -> Result<()> {
        check_cancelled(cancel)?;
        validate_name(name)?;
        {
            let file = self.file(name);
            let locked = file.lock(cancel).await?;
            if !locked.exists(cancel).await? {
                return Err(Error::NotFound(name.to_string()));
            }
            locked
                .remove(cancel)
                .await
                .map_err(|e| missing_as_not_found(name, e))?;
        }
        info!(name, "deleted connection");
        self.release_idle();
        Ok(())
    }

    /// Names of all stored connections, sorted.
    ///
    /// Files whose stem is not a valid connection name (e.g. `.hidden.json`)
    /// are skipped, since `get` could never address them.
    pub async fn list_names(&self, cancel: &CancellationToken) -> Result<Vec<String>> {
        check_cancelled(cancel)?;
        let paths = self
            .backend
            .list(&self.root, CONNECTION_EXTENSION)
            .await
            .map_err(|e| Error::io(&self.root, e))?;

        let mut names: Vec<String> = paths
            .iter()
            .filter_map(|path| path.file_stem().and_then(|s| s.to_str()))
            .filter(|stem| {
                let valid = validate_name(stem).is_ok();
                if !valid {
                    debug!(stem, "skipping file with invalid connection name");
                }
                valid
            })
            .map(str::to_string)
            .collect();
        names.sort();
        Ok(names)
    }

    /// Every stored connection, read concurrently.
    ///
    /// One unreadable record fails the whole listing.
    pub async fn list_connections(&self, cancel: &CancellationToken) -> Result<Vec<Connection>> {
        let names = self.list_names(cancel).await?;
        let reads = names.iter().map(|name| {
            let file = self.file(name);
            async move {
                file.read(cancel)
                    .await
                    .map_err(|e| missing_as_not_found(name, e))
            }
        });
        futures::future::try_join_all(reads).await
    }

    /// Check whether a connection named `name` exists.
    pub async fn exists(&self, name: &str) -> Result<bool> {
        let path = self.path_for(name);
        self.backend
            .exists(&path)
            .await
            .map_err(|e| Error::io(path, e))
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.{}", name, CONNECTION_EXTENSION))
    }

    fn file(&self, name: &str) -> Arc<JsonFile<Connection>> {
        let path = self.path_for(name);
        let mut files = self
            .files
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        files
            .entry(path.clone())
            .or_insert_with(|| Arc::new(JsonFile::new(path, self.backend.clone(), self.policy)))
            .clone()
    }

    /// Drop registry entries that no caller holds any more.
    ///
    /// An entry with a strong count of one is only referenced by the map, and
    /// any new caller has to take the map lock first, so removing it cannot
    /// split a path across two gates.
    fn release_idle(&self) {
        let mut files = self
            .files
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        files.retain(|_, file| Arc::strong_count(file) > 1);
    }

    async fn ensure_exists(&self, name: &str) -> Result<()> {
        if !self.exists(name).await? {
            return Err(Error::NotFound(name.to_string()));
        }
        Ok(())
    }
}

/// Resolve the connections directory.
///
/// Priority: explicit data dir > `SSHX_DATA_DIR` env var > `<data_dir>/sshx`.
/// Connections live in the `connections/` subdirectory of the chosen data dir.
pub fn get_connections_dir(data_dir: Option<&Path>) -> Result<PathBuf> {
    let base = match data_dir {
        Some(dir) => dir.to_path_buf(),
        None => match std::env::var_os(DATA_DIR_ENV) {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => dirs::data_dir()
                .ok_or_else(|| Error::Other("Could not determine data directory".to_string()))?
                .join("sshx"),
        },
    };
    Ok(base.join("connections"))
}

/// Lock two distinct files in path order, so opposite renames cannot deadlock.
async fn lock_pair<'a>(
    first: &'a JsonFile<Connection>,
    second: &'a JsonFile<Connection>,
    cancel: &CancellationToken,
) -> Result<(
    LockedJsonFile<'a, Connection>,
    LockedJsonFile<'a, Connection>,
)> {
    if first.path() <= second.path() {
        let a = first.lock(cancel).await?;
        let b = second.lock(cancel).await?;
        Ok((a, b))
    } else {
        let b = second.lock(cancel).await?;
        let a = first.lock(cancel).await?;
        Ok((a, b))
    }
}

/// Read the locked record and apply `request` to it.
async fn patch(
    locked: &LockedJsonFile<'_, Connection>,
    name: &str,
    request: &UpdateConnectionRequest,
    cancel: &CancellationToken,
) -> Result<Connection> {
    if !locked.exists(cancel).await? {
        return Err(Error::NotFound(name.to_string()));
    }
    let existing = locked
        .read(cancel)
        .await
        .map_err(|e| missing_as_not_found(name, e))?;
    let updated = request.apply(&existing);
    updated.validate()?;
    Ok(updated)
}

fn check_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    Ok(())
}

/// A file that vanished between the existence check and the read means the
/// connection was deleted concurrently.
fn missing_as_not_found(name: &str, err: Error) -> Error {
    match err {
        Error::Io { ref source, .. } if source.kind() == io::ErrorKind::NotFound => {
            Error::NotFound(name.to_string())
        }
        other => other,
    }
}
