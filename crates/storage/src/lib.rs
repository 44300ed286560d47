//! Storage - filesystem backend for the search fleet
//!
//! Nodes coordinate through storage mounted identically on every machine:
//! query shards, search outputs, readiness sentinels and replicated
//! manifests all live there. This crate wraps that filesystem behind an
//! async trait so handlers stay independent of the mount.
//!
//! # Example
//!
//! ```no_run
//! use storage::{StorageBackend, LocalStorage};
//! use bytes::Bytes;
//! use std::path::Path;
//!
//! # async fn example() -> fleet_core::Result<()> {
//! let storage = LocalStorage::new("/mnt/shared");
//! storage.write(Path::new("seqsplit/sequences_instance_0.fasta"), Bytes::from(">a\nACGT\n")).await?;
//! let data = storage.read(Path::new("seqsplit/sequences_instance_0.fasta")).await?;
//! # Ok(())
//! # }
//! ```

mod backend;
mod local;

pub use backend::StorageBackend;
pub use local::LocalStorage;
