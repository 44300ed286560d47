//! Live node state shared by every connection task

use std::sync::Arc;

use fleet_core::{ConnectionTable, ConnectionTableHandle, Error, FleetConfig, Result};
use parking_lot::RwLock;
use storage::{LocalStorage, StorageBackend};
use tracing::info;

use crate::search::SearchRegistry;

/// Node state handle type for sharing across connection tasks
pub type NodeStateHandle = Arc<NodeState>;

/// State of one worker node
///
/// The manifest is swapped atomically by `load_config`; each command works on
/// the snapshot it took when it started.
pub struct NodeState {
    /// Currently loaded manifest
    config: RwLock<Option<Arc<FleetConfig>>>,

    /// Open command connections
    connections: ConnectionTableHandle,

    /// Searches launched on this node
    searches: SearchRegistry,

    /// Shared storage
    storage: Arc<dyn StorageBackend>,
}

impl NodeState {
    /// Create state backed by the given storage, with no manifest loaded
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self {
            config: RwLock::new(None),
            connections: Arc::new(ConnectionTable::new()),
            searches: SearchRegistry::new(),
            storage,
        }
    }

    /// Snapshot of the loaded manifest
    pub fn config(&self) -> Result<Arc<FleetConfig>> {
        self.config.read().clone().ok_or(Error::ConfigNotLoaded)
    }

    /// Returns true once a manifest has been loaded
    pub fn has_config(&self) -> bool {
        self.config.read().is_some()
    }

    /// Replace the live manifest
    pub fn install_config(&self, config: FleetConfig) {
        info!(
            nodes = config.node_count(),
            profile = %config.settings.profile,
            "Installed manifest"
        );
        *self.config.write() = Some(Arc::new(config));
    }

    /// Open command connections
    pub fn connections(&self) -> &ConnectionTableHandle {
        &self.connections
    }

    /// Searches launched on this node
    pub fn searches(&self) -> &SearchRegistry {
        &self.searches
    }

    /// Shared storage
    pub fn storage(&self) -> &Arc<dyn StorageBackend> {
        &self.storage
    }
}

impl Default for NodeState {
    fn default() -> Self {
        Self::new(Arc::new(LocalStorage::new(".")))
    }
}
