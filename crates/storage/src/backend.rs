//! Storage backend trait definition
//!
//! Defines the async interface used for everything a node or the director
//! reads from or writes to disk.

use async_trait::async_trait;
use bytes::Bytes;
use fleet_core::Result;
use std::path::Path;

/// Async trait for storage backends
///
/// Relative paths resolve against the backend root; absolute paths are used
/// as given, which is how config-derived shared paths arrive.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Read data from the given path
    ///
    /// # Errors
    /// `StoragePathNotFound` if the path doesn't exist
    async fn read(&self, path: &Path) -> Result<Bytes>;

    /// Write data to the given path, replacing any existing file
    ///
    /// Creates parent directories if they don't exist.
    ///
    /// # Returns
    /// Number of bytes written
    async fn write(&self, path: &Path, data: Bytes) -> Result<u64>;

    /// Copy a file, replacing the destination
    async fn copy(&self, from: &Path, to: &Path) -> Result<u64>;

    /// Check if a path exists
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Delete every regular file directly inside `dir`, leaving directories alone
    ///
    /// A missing directory counts as already clean.
    ///
    /// # Returns
    /// Number of files removed
    async fn clear_files(&self, dir: &Path) -> Result<usize>;
}
