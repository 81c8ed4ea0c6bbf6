//! Retrying, lock-guarded JSON file.
//!
//! A [`JsonFile`] owns one path and serializes every read, write and remove
//! against it through a single-permit semaphore. Each filesystem call runs
//! inside a bounded retry loop with exponential backoff, so transient
//! failures (a virus scanner or another process briefly holding the file)
//! are absorbed instead of surfacing to the user.
//!
//! # Backoff schedule (defaults)
//!
//! | Failed attempt | Sleep before next attempt |
//! |----------------|---------------------------|
//! | 1              | 30ms                      |
//! | 2              | 48ms                      |
//! | 3              | 76.8ms                    |
//! | ...            | previous x 1.6            |
//! | 8              | gives up with `Error::Io` |

use super::backend::FileBackend;
use crate::{Error, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::io;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Default number of attempts before an I/O failure becomes terminal.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 8;

/// Default delay after the first failed attempt.
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(30);

/// Default factor applied to the delay after every failed attempt.
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 1.6;

/// Retry envelope for filesystem calls.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Sleep after the first failure.
    pub initial_delay: Duration,
    /// Growth factor for every following sleep.
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay: DEFAULT_INITIAL_DELAY,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}

impl RetryPolicy {
    /// Sleep that follows failed attempt `attempt` (1-based).
    ///
    /// Formula: `initial_delay * backoff_multiplier^(attempt - 1)`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let nanos = self.initial_delay.as_nanos() as f64 * self.backoff_multiplier.powi(exponent);
        if !nanos.is_finite() || nanos >= u64::MAX as f64 {
            return Duration::MAX;
        }
        Duration::from_nanos(nanos.max(0.0).round() as u64)
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Whether an I/O error is worth retrying.
///
/// Missing files and malformed arguments will not fix themselves; everything
/// else (sharing violations, `WouldBlock`, interrupted calls, permission
/// flaps while another process holds the file) gets another attempt.
pub fn is_transient(err: &io::Error) -> bool {
    !matches!(
        err.kind(),
        io::ErrorKind::NotFound
            | io::ErrorKind::InvalidInput
            | io::ErrorKind::InvalidData
            | io::ErrorKind::Unsupported
    )
}

/// One JSON document on disk, typed as `T`.
#[derive(Debug)]
pub struct JsonFile<T> {
    path: PathBuf,
    backend: Arc<dyn FileBackend>,
    policy: RetryPolicy,
    gate: Semaphore,
    _value: PhantomData<fn() -> T>,
}

impl<T> JsonFile<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(path: impl Into<PathBuf>, backend: Arc<dyn FileBackend>, policy: RetryPolicy) -> Self {
        Self {
            path: path.into(),
            backend,
            policy,
            gate: Semaphore::new(1),
            _value: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Replace the file contents with `value` encoded as pretty JSON.
    ///
    /// Encoding happens before the gate is taken and is never retried.
    pub async fn write(&self, value: &T, cancel: &CancellationToken) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.lock(cancel).await?.write_bytes(&bytes, cancel).await
    }

    /// Read and decode the file.
    ///
    /// Empty or malformed content fails with `Error::Deserialization`; a
    /// literal `null` fails with `Error::NullValue`. Neither is retried.
    pub async fn read(&self, cancel: &CancellationToken) -> Result<T> {
        self.lock(cancel).await?.read(cancel).await
    }

    /// Delete the file.
    pub async fn remove(&self, cancel: &CancellationToken) -> Result<()> {
        self.lock(cancel).await?.remove(cancel).await
    }

    /// Take the gate and keep it until the returned guard is dropped.
    ///
    /// Use this when a check and a mutation must not be split by another
    /// caller, e.g. create-if-absent or read-modify-write.
    pub async fn lock(&self, cancel: &CancellationToken) -> Result<LockedJsonFile<'_, T>> {
        let permit = self.acquire(cancel).await?;
        Ok(LockedJsonFile {
            file: self,
            _permit: permit,
        })
    }

    fn decode(&self, bytes: &[u8]) -> Result<T> {
        let value: Option<T> =
            serde_json::from_slice(bytes).map_err(|source| Error::Deserialization {
                path: self.path.clone(),
                source,
            })?;
        value.ok_or_else(|| Error::NullValue(self.path.clone()))
    }

    async fn acquire(&self, cancel: &CancellationToken) -> Result<SemaphorePermit<'_>> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            permit = self.gate.acquire() => {
                permit.map_err(|_| Error::Other(format!("gate for {} was closed", self.path.display())))
            }
        }
    }

    async fn with_retry<R, F, Fut>(&self, cancel: &CancellationToken, mut action: F) -> Result<R>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = io::Result<R>>,
    {
        let max_attempts = self.policy.attempts();
        let mut attempt = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            attempt += 1;

            let err = match action().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !is_transient(&err) || attempt >= max_attempts {
                return Err(Error::Io {
                    path: self.path.clone(),
                    attempts: attempt,
                    source: err,
                });
            }

            let delay = self.policy.delay_after(attempt);
            warn!(
                path = %self.path.display(),
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "transient I/O failure, retrying"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

/// Exclusive access to a [`JsonFile`], held until dropped.
#[derive(Debug)]
pub struct LockedJsonFile<'a, T> {
    file: &'a JsonFile<T>,
    _permit: SemaphorePermit<'a>,
}

impl<T> LockedJsonFile<'_, T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn path(&self) -> &Path {
        &self.file.path
    }

    /// Check whether the file exists.
    pub async fn exists(&self, cancel: &CancellationToken) -> Result<bool> {
        let file = self.file;
        file.with_retry(cancel, || file.backend.exists(&file.path))
            .await
    }

    pub async fn read(&self, cancel: &CancellationToken) -> Result<T> {
        let file = self.file;
        debug!(path = %file.path.display(), "reading json file");
        let bytes = file
            .with_retry(cancel, || file.backend.read(&file.path))
            .await?;
        file.decode(&bytes)
    }

    pub async fn write(&self, value: &T, cancel: &CancellationToken) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.write_bytes(&bytes, cancel).await
    }

    pub async fn remove(&self, cancel: &CancellationToken) -> Result<()> {
        let file = self.file;
        debug!(path = %file.path.display(), "removing json file");
        file.with_retry(cancel, || file.backend.remove(&file.path))
            .await
    }

    async fn write_bytes(&self, bytes: &[u8], cancel: &CancellationToken) -> Result<()> {
        let file = self.file;
        debug!(path = %file.path.display(), bytes = bytes.len(), "writing json file");
        file.with_retry(cancel, || file.backend.write(&file.path, bytes))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Connection, CreateConnectionRequest};
    use crate::storage::backend::DiskBackend;
    use crate::test_utils::{FlakyBackend, Op, fast_policy};
    use tempfile::TempDir;
    use tokio::time::Instant;

    fn sample() -> Connection {
        Connection::new(
            "prod",
            CreateConnectionRequest::new("root", "10.0.0.1").with_description("db"),
        )
    }

    fn disk_file(temp: &TempDir) -> JsonFile<Connection> {
        JsonFile::new(
            temp.path().join("prod.json"),
            Arc::new(DiskBackend),
            fast_policy(),
        )
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 8);
        assert_eq!(policy.initial_delay, Duration::from_millis(30));
        assert_eq!(policy.backoff_multiplier, 1.6);
    }

    #[test]
    fn test_delay_grows_by_multiplier() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_millis(30));
        assert_eq!(policy.delay_after(2), Duration::from_millis(48));
        assert_eq!(policy.delay_after(3), Duration::from_micros(76_800));

        let delays: Vec<Duration> = (1..8).map(|n| policy.delay_after(n)).collect();
        assert!(delays.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_delay_saturates() {
        let policy = RetryPolicy {
            max_attempts: u32::MAX,
            initial_delay: Duration::from_secs(1),
            backoff_multiplier: 10.0,
        };
        assert_eq!(policy.delay_after(u32::MAX), Duration::MAX);
    }

    #[test]
    fn test_transient_classification() {
        assert!(is_transient(&io::Error::from(io::ErrorKind::WouldBlock)));
        assert!(is_transient(&io::Error::from(io::ErrorKind::PermissionDenied)));
        assert!(is_transient(&io::Error::from(io::ErrorKind::Interrupted)));
        assert!(!is_transient(&io::Error::from(io::ErrorKind::NotFound)));
        assert!(!is_transient(&io::Error::from(io::ErrorKind::InvalidInput)));
    }

    #[tokio::test]
    async fn test_write_then_read_roundtrip() {
        let temp = TempDir::new().unwrap();
        let file = disk_file(&temp);
        let cancel = CancellationToken::new();

        file.write(&sample(), &cancel).await.unwrap();
        assert_eq!(file.read(&cancel).await.unwrap(), sample());
    }

    #[tokio::test]
    async fn test_write_replaces_previous_contents() {
        let temp = TempDir::new().unwrap();
        let file = disk_file(&temp);
        let cancel = CancellationToken::new();

        let mut long = sample();
        long.description = Some("x".repeat(512));
        file.write(&long, &cancel).await.unwrap();
        file.write(&sample(), &cancel).await.unwrap();

        assert_eq!(file.read(&cancel).await.unwrap(), sample());
    }

    #[tokio::test]
    async fn test_read_empty_file_is_deserialization_error() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("prod.json"), "").unwrap();
        let err = disk_file(&temp)
            .read(&CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Deserialization { .. }));
    }

    #[tokio::test]
    async fn test_read_malformed_file_is_deserialization_error() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("prod.json"), "{\"name\": ").unwrap();
        let err = disk_file(&temp)
            .read(&CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Deserialization { .. }));
    }

    #[tokio::test]
    async fn test_read_null_is_null_value_error() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("prod.json"), "null").unwrap();
        let err = disk_file(&temp)
            .read(&CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NullValue(_)));
    }

    #[tokio::test]
    async fn test_read_missing_file_does_not_create_it() {
        let temp = TempDir::new().unwrap();
        let file = disk_file(&temp);
        let err = file.read(&CancellationToken::new()).await.unwrap_err();

        match err {
            Error::Io { attempts, source, .. } => {
                assert_eq!(attempts, 1);
                assert_eq!(source.kind(), io::ErrorKind::NotFound);
            }
            other => panic!("expected Io error, got {other:?}"),
        }
        assert!(!file.path().exists());
    }

    #[tokio::test]
    async fn test_transient_write_failures_are_absorbed() {
        let temp = TempDir::new().unwrap();
        let backend = Arc::new(FlakyBackend::new().failing(Op::Write, 3));
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_delay: Duration::from_millis(5),
            backoff_multiplier: 2.0,
        };
        let file: JsonFile<Connection> =
            JsonFile::new(temp.path().join("prod.json"), backend.clone(), policy);

        let started = Instant::now();
        file.write(&sample(), &CancellationToken::new()).await.unwrap();

        // 5ms + 10ms + 20ms of backoff between the four attempts
        assert!(started.elapsed() >= Duration::from_millis(35));
        assert_eq!(backend.calls(Op::Write), 4);
        assert_eq!(
            file.read(&CancellationToken::new()).await.unwrap(),
            sample()
        );
    }

    #[tokio::test]
    async fn test_exhausted_retries_surface_io_error() {
        let temp = TempDir::new().unwrap();
        let backend = Arc::new(FlakyBackend::new().failing(Op::Write, usize::MAX));
        let file: JsonFile<Connection> =
            JsonFile::new(temp.path().join("prod.json"), backend.clone(), fast_policy());

        let err = file
            .write(&sample(), &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            Error::Io { attempts, source, .. } => {
                assert_eq!(attempts, fast_policy().max_attempts);
                assert_eq!(source.kind(), io::ErrorKind::WouldBlock);
            }
            other => panic!("expected Io error, got {other:?}"),
        }
        assert_eq!(backend.calls(Op::Write), fast_policy().max_attempts as usize);
        assert_eq!(backend.mutations(), 0);
    }

    #[tokio::test]
    async fn test_non_transient_error_is_not_retried() {
        let temp = TempDir::new().unwrap();
        let backend = Arc::new(
            FlakyBackend::new()
                .failing(Op::Write, 1)
                .with_kind(io::ErrorKind::InvalidInput),
        );
        let file: JsonFile<Connection> =
            JsonFile::new(temp.path().join("prod.json"), backend.clone(), fast_policy());

        let err = file
            .write(&sample(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Io { attempts: 1, .. }));
        assert_eq!(backend.calls(Op::Write), 1);
    }

    #[tokio::test]
    async fn test_zero_max_attempts_still_tries_once() {
        let temp = TempDir::new().unwrap();
        let policy = RetryPolicy {
            max_attempts: 0,
            ..fast_policy()
        };
        let file: JsonFile<Connection> =
            JsonFile::new(temp.path().join("prod.json"), Arc::new(DiskBackend), policy);
        file.write(&sample(), &CancellationToken::new()).await.unwrap();
        assert!(file.path().exists());
    }

    #[tokio::test]
    async fn test_cancelled_before_start_touches_nothing() {
        let temp = TempDir::new().unwrap();
        let backend = Arc::new(FlakyBackend::new());
        let file: JsonFile<Connection> =
            JsonFile::new(temp.path().join("prod.json"), backend.clone(), fast_policy());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = file.write(&sample(), &cancel).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert_eq!(backend.calls(Op::Write), 0);
        assert!(!file.path().exists());
    }

    #[tokio::test]
    async fn test_cancel_during_backoff_stops_retrying() {
        let temp = TempDir::new().unwrap();
        let backend = Arc::new(FlakyBackend::new().failing(Op::Write, usize::MAX));
        let policy = RetryPolicy {
            max_attempts: 8,
            initial_delay: Duration::from_secs(60),
            backoff_multiplier: 1.6,
        };
        let file: JsonFile<Connection> =
            JsonFile::new(temp.path().join("prod.json"), backend.clone(), policy);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = file.write(&sample(), &cancel).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert_eq!(backend.calls(Op::Write), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writes_never_interleave() {
        let temp = TempDir::new().unwrap();
        let file: Arc<JsonFile<Connection>> = Arc::new(disk_file(&temp));
        let cancel = CancellationToken::new();

        let mut handles = Vec::new();
        for i in 0..16u16 {
            let file = file.clone();
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                let mut conn = sample();
                conn.port = 1000 + i;
                conn.description = Some("d".repeat(usize::from(i) * 64));
                file.write(&conn, &cancel).await.unwrap();
                // Every read must decode a complete record
                file.read(&cancel).await.unwrap()
            }));
        }
        for handle in handles {
            let conn = handle.await.unwrap();
            assert_eq!(conn.name, "prod");
        }
    }

    #[tokio::test]
    async fn test_lock_blocks_other_callers_until_dropped() {
        let temp = TempDir::new().unwrap();
        let file = disk_file(&temp);
        let cancel = CancellationToken::new();

        let locked = file.lock(&cancel).await.unwrap();
        assert!(!locked.exists(&cancel).await.unwrap());

        let blocked =
            tokio::time::timeout(Duration::from_millis(50), file.write(&sample(), &cancel)).await;
        assert!(blocked.is_err());
        assert!(!file.path().exists());

        locked.write(&sample(), &cancel).await.unwrap();
        assert!(locked.exists(&cancel).await.unwrap());
        drop(locked);

        assert_eq!(file.read(&cancel).await.unwrap(), sample());
    }
}
