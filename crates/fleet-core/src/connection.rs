//! Connection bookkeeping for a node's command server

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Identity of one accepted connection, unique for the lifetime of the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Connection information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionInfo {
    /// Connection identifier
    pub id: ConnectionId,

    /// Remote peer address
    pub peer: SocketAddr,

    /// Accept timestamp
    pub opened_at: DateTime<Utc>,

    /// Last command received
    pub last_command: Option<String>,

    /// Number of commands handled
    pub commands_handled: u64,
}

/// Thread-safe table of open connections
///
/// Entries are keyed by a per-accept id, so two peers sharing an address
/// never collide.
#[derive(Debug, Default)]
pub struct ConnectionTable {
    connections: DashMap<ConnectionId, ConnectionInfo>,
    next_id: AtomicU64,
}

impl ConnectionTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly accepted connection
    pub fn open(&self, peer: SocketAddr) -> ConnectionId {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.connections.insert(
            id,
            ConnectionInfo {
                id,
                peer,
                opened_at: Utc::now(),
                last_command: None,
                commands_handled: 0,
            },
        );
        info!(connection = %id, peer = %peer, "Connection opened");
        id
    }

    /// Record a command received on a connection
    pub fn record_command(&self, id: ConnectionId, command: &str) {
        if let Some(mut entry) = self.connections.get_mut(&id) {
            entry.last_command = Some(command.to_string());
            entry.commands_handled += 1;
        }
    }

    /// Drop a connection from the table
    pub fn close(&self, id: ConnectionId) -> Option<ConnectionInfo> {
        self.connections.remove(&id).map(|(_, info)| {
            debug!(
                connection = %id,
                peer = %info.peer,
                commands = info.commands_handled,
                "Connection closed"
            );
            info
        })
    }

    /// Look up a connection
    pub fn get(&self, id: ConnectionId) -> Option<ConnectionInfo> {
        self.connections.get(&id).map(|c| c.clone())
    }

    /// Number of open connections
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Returns true if no connection is open
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

/// Shared handle to a connection table
pub type ConnectionTableHandle = Arc<ConnectionTable>;
