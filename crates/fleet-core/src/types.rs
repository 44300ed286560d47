//! Core type definitions shared by nodes and the director

use serde::{Deserialize, Serialize};
use std::fmt;

/// Position of a node in the manifest; this is the node's identity
pub type NodeIndex = usize;

/// A worker node as listed in the manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    /// Position in the manifest
    pub index: NodeIndex,

    /// Instance identifier
    pub id: String,

    /// Host name or IP address
    pub address: String,

    /// Command port
    pub port: u16,
}

impl NodeDescriptor {
    /// `host:port` form used to connect
    pub fn socket_address(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

impl fmt::Display for NodeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{} ({})", self.id, self.index, self.socket_address())
    }
}

/// Aggregated search output of every node, merged in manifest order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultBundle {
    /// Concatenated search reports
    pub results: String,

    /// Concatenated query shards
    pub results_fa: String,
}

impl ResultBundle {
    /// Total payload size in bytes
    pub fn len(&self) -> usize {
        self.results.len() + self.results_fa.len()
    }

    /// Returns true if both parts are empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Lifecycle of one asynchronous search on a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SearchState {
    /// No search for this shard was launched on the node
    Unknown,

    /// The search process is running
    Running,

    /// The search process exited successfully
    Succeeded,

    /// The search could not be launched or exited with an error
    Failed {
        exit_code: Option<i32>,
        message: String,
    },
}

impl SearchState {
    /// Returns true once the search can no longer change state
    pub fn is_finished(&self) -> bool {
        matches!(self, SearchState::Succeeded | SearchState::Failed { .. })
    }
}

/// Search state of one node as reported over the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchReport {
    /// Shard the search runs against
    pub node: NodeIndex,

    /// Current state
    #[serde(flatten)]
    pub state: SearchState,
}
