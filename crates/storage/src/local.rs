//! Local filesystem storage backend
//!
//! Provides async file I/O with atomic writes so readers on other nodes never
//! observe a half-written shard or sentinel.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use fleet_core::{Error, Result};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::StorageBackend;

/// Local filesystem storage backend
///
/// Stores data under a root directory with support for:
/// - Atomic writes (write to a hidden temp file, then rename)
/// - Automatic parent directory creation
/// - Absolute paths that bypass the root
#[derive(Debug, Clone)]
pub struct LocalStorage {
    /// Base path for relative storage operations
    base_path: PathBuf,
}

impl LocalStorage {
    /// Create a new LocalStorage instance
    ///
    /// # Arguments
    /// * `base_path` - Directory relative paths resolve against
    pub fn new<P: AsRef<Path>>(base_path: P) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
        }
    }

    /// Get the base path
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Resolve a path against the root; absolute paths are kept as is
    fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_path.join(path)
        }
    }

    /// Generate a unique temporary sibling of `full_path`
    fn temp_path(full_path: &Path) -> PathBuf {
        let temp_name = format!(
            ".{}.{}.tmp",
            full_path.file_name().unwrap_or_default().to_string_lossy(),
            Uuid::new_v4()
        );
        full_path.with_file_name(temp_name)
    }

    async fn ensure_parent(full_path: &Path) -> Result<()> {
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::Storage {
                    message: format!("Failed to create directory {:?}: {}", parent, e),
                })?;
        }
        Ok(())
    }

    fn not_found_or(path: &Path, action: &str, e: std::io::Error) -> Error {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::StoragePathNotFound {
                path: path.display().to_string(),
            }
        } else {
            Error::Storage {
                message: format!("Failed to {} {}: {}", action, path.display(), e),
            }
        }
    }
}

#[async_trait]
impl StorageBackend for LocalStorage {
    #[instrument(skip(self), fields(backend = "local"))]
    async fn read(&self, path: &Path) -> Result<Bytes> {
        let full_path = self.resolve_path(path);
        debug!(?full_path, "Reading file");

        fs::read(&full_path)
            .await
            .map(Bytes::from)
            .map_err(|e| Self::not_found_or(path, "read", e))
    }

    #[instrument(skip(self, data), fields(backend = "local", size = data.len()))]
    async fn write(&self, path: &Path, data: Bytes) -> Result<u64> {
        let full_path = self.resolve_path(path);
        let temp_path = Self::temp_path(&full_path);
        let size = data.len() as u64;

        debug!(?full_path, ?temp_path, size, "Writing file atomically");

        Self::ensure_parent(&full_path).await?;

        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| Error::Storage {
                message: format!("Failed to create temp file {:?}: {}", temp_path, e),
            })?;

        file.write_all(&data).await.map_err(|e| Error::Storage {
            message: format!("Failed to write data: {}", e),
        })?;

        file.sync_all().await.map_err(|e| Error::Storage {
            message: format!("Failed to sync file: {}", e),
        })?;

        fs::rename(&temp_path, &full_path)
            .await
            .map_err(|e| Error::Storage {
                message: format!("Failed to rename {:?} to {:?}: {}", temp_path, full_path, e),
            })?;

        debug!(?full_path, size, "File written successfully");
        Ok(size)
    }

    #[instrument(skip(self), fields(backend = "local"))]
    async fn copy(&self, from: &Path, to: &Path) -> Result<u64> {
        let source = self.resolve_path(from);
        let target = self.resolve_path(to);

        // Copying a file onto itself would truncate it.
        if source == target {
            return fs::metadata(&source)
                .await
                .map(|m| m.len())
                .map_err(|e| Self::not_found_or(from, "stat", e));
        }

        Self::ensure_parent(&target).await?;
        let temp_path = Self::temp_path(&target);

        let size = fs::copy(&source, &temp_path)
            .await
            .map_err(|e| Self::not_found_or(from, "copy", e))?;

        fs::rename(&temp_path, &target)
            .await
            .map_err(|e| Error::Storage {
                message: format!("Failed to rename {:?} to {:?}: {}", temp_path, target, e),
            })?;

        debug!(?source, ?target, size, "File copied");
        Ok(size)
    }

    #[instrument(skip(self), fields(backend = "local"))]
    async fn exists(&self, path: &Path) -> Result<bool> {
        let full_path = self.resolve_path(path);
        Ok(fs::metadata(&full_path).await.is_ok())
    }

    #[instrument(skip(self), fields(backend = "local"))]
    async fn clear_files(&self, dir: &Path) -> Result<usize> {
        let full_dir = self.resolve_path(dir);

        let mut entries = match fs::read_dir(&full_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(?full_dir, "Directory missing, nothing to clear");
                return Ok(0);
            }
            Err(e) => {
                return Err(Error::Storage {
                    message: format!("Failed to list {}: {}", full_dir.display(), e),
                })
            }
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await.map_err(|e| Error::Storage {
            message: format!("Failed to list {}: {}", full_dir.display(), e),
        })? {
            let file_type = match entry.file_type().await {
                Ok(t) => t,
                Err(_) => continue,
            };
            if !file_type.is_file() {
                continue;
            }

            match fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                // Another node cleaning the same shared directory got there first.
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(Error::Storage {
                        message: format!("Failed to delete {}: {}", entry.path().display(), e),
                    })
                }
            }
        }

        debug!(?full_dir, removed, "Cleared directory");
        Ok(removed)
    }
}
