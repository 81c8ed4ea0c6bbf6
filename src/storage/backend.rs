//! Storage backend trait and the on-disk implementation.
//!
//! The backend is the only place that touches the filesystem. It exposes raw
//! byte-level primitives and reports every failure as a plain `io::Error`;
//! retrying, locking, and JSON encoding live one layer up in
//! [`JsonFile`](super::JsonFile).

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Byte-level filesystem primitives used by the store and repository.
#[async_trait]
pub trait FileBackend: Send + Sync + std::fmt::Debug {
    /// Read the whole file. Never creates it.
    async fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Create or truncate the file and write `contents` in full.
    async fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()>;

    /// Remove the file.
    async fn remove(&self, path: &Path) -> io::Result<()>;

    /// Check whether the file exists.
    async fn exists(&self, path: &Path) -> io::Result<bool>;

    /// List files in `dir` whose extension equals `extension`.
    async fn list(&self, dir: &Path, extension: &str) -> io::Result<Vec<PathBuf>>;

    /// Create a directory and all of its parents.
    async fn create_dir_all(&self, dir: &Path) -> io::Result<()>;
}

/// Backend over the local filesystem via `tokio::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiskBackend;

#[async_trait]
impl FileBackend for DiskBackend {
    async fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        tokio::fs::read(path).await
    }

    async fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .await?;
        file.write_all(contents).await?;
        file.sync_all().await?;
        Ok(())
    }

    async fn remove(&self, path: &Path) -> io::Result<()> {
        tokio::fs::remove_file(path).await
    }

    async fn exists(&self, path: &Path) -> io::Result<bool> {
        tokio::fs::try_exists(path).await
    }

    async fn list(&self, dir: &Path, extension: &str) -> io::Result<Vec<PathBuf>> {
        let mut entries = tokio::fs::read_dir(dir).await?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(extension) {
                continue;
            }
            if entry.file_type().await?.is_file() {
                files.push(path);
            }
        }
        Ok(files)
    }

    async fn create_dir_all(&self, dir: &Path) -> io::Result<()> {
        tokio::fs::create_dir_all(dir).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_then_read() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("a.json");

        DiskBackend.write(&path, b"{\"x\":1}").await.unwrap();
        assert_eq!(DiskBackend.read(&path).await.unwrap(), b"{\"x\":1}");
    }

    #[tokio::test]
    async fn test_write_truncates() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("a.json");

        DiskBackend.write(&path, b"a much longer body").await.unwrap();
        DiskBackend.write(&path, b"short").await.unwrap();
        assert_eq!(DiskBackend.read(&path).await.unwrap(), b"short");
    }

    #[tokio::test]
    async fn test_read_missing_is_not_found() {
        let temp = TempDir::new().unwrap();
        let err = DiskBackend
            .read(&temp.path().join("missing.json"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(!temp.path().join("missing.json").exists());
    }

    #[tokio::test]
    async fn test_list_filters_extension_and_dirs() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("a.json"), "{}").unwrap();
        std::fs::write(temp.path().join("b.json"), "{}").unwrap();
        std::fs::write(temp.path().join("notes.txt"), "").unwrap();
        std::fs::create_dir(temp.path().join("dir.json")).unwrap();

        let mut names: Vec<String> = DiskBackend
            .list(temp.path(), "json")
            .await
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["a.json", "b.json"]);
    }

    #[tokio::test]
    async fn test_exists_and_remove() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("a.json");
        assert!(!DiskBackend.exists(&path).await.unwrap());

        DiskBackend.write(&path, b"{}").await.unwrap();
        assert!(DiskBackend.exists(&path).await.unwrap());

        DiskBackend.remove(&path).await.unwrap();
        assert!(!DiskBackend.exists(&path).await.unwrap());
    }
}
