//! Background sequence searches
//!
//! Each `start_instance_blast` spawns the search executable against one
//! shard and returns at once. A detached task waits for the process, writes
//! the shard's readiness sentinel and publishes the final state on a watch
//! channel, so `search_status` can observe completion and failures.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use fleet_core::{Error, FleetConfig, NodeIndex, Result, SearchState};
use storage::StorageBackend;
use tokio::process::Command;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Bytes of stderr kept in a failure diagnostic
const STDERR_TAIL_BYTES: usize = 2048;

/// Fully resolved search invocation for one shard
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchCommand {
    /// Shard the search runs against
    pub node: NodeIndex,

    /// Search executable
    pub program: PathBuf,

    /// Command-line arguments
    pub args: Vec<String>,
}

impl SearchCommand {
    /// Build the invocation for `node` from the active profile
    pub fn for_node(config: &FleetConfig, node: NodeIndex) -> Result<Self> {
        if node >= config.node_count() {
            return Err(Error::NodeOutOfRange {
                index: node,
                nodes: config.node_count(),
            });
        }
        let profile = config.active_profile()?;

        let args = vec![
            "-query".to_string(),
            config.shard_path(node).display().to_string(),
            "-db".to_string(),
            config.settings.database.clone(),
            "-out".to_string(),
            config.shard_result_path(node).display().to_string(),
            "-num_threads".to_string(),
            profile.threads.to_string(),
            "-task".to_string(),
            "blastn".to_string(),
            "-penalty".to_string(),
            profile.penalty.to_string(),
            "-reward".to_string(),
            profile.reward.to_string(),
            "-gapopen".to_string(),
            profile.gapopen.to_string(),
            "-gapextend".to_string(),
            profile.gapextend.to_string(),
            "-evalue".to_string(),
            profile.evalue.clone(),
            "-num_descriptions".to_string(),
            profile.num_descriptions.to_string(),
            "-num_alignments".to_string(),
            profile.num_alignments.to_string(),
            "-dust".to_string(),
            "yes".to_string(),
            "-max_hsps".to_string(),
            profile.max_hsps.to_string(),
            "-culling_limit".to_string(),
            profile.culling_limit.to_string(),
            "-soft_masking".to_string(),
            "true".to_string(),
            "-outfmt".to_string(),
            "0".to_string(),
        ];

        Ok(Self {
            node,
            program: config.settings.blastn_bin.clone(),
            args,
        })
    }
}

/// Completion handle of one search
#[derive(Debug, Clone)]
pub struct SearchHandle {
    node: NodeIndex,
    state: watch::Receiver<SearchState>,
}

impl SearchHandle {
    /// A handle that is already finished
    fn settled(node: NodeIndex, state: SearchState) -> Self {
        let (_, rx) = watch::channel(state);
        Self { node, state: rx }
    }

    /// Shard this search runs against
    pub fn node(&self) -> NodeIndex {
        self.node
    }

    /// Current state
    pub fn state(&self) -> SearchState {
        self.state.borrow().clone()
    }

    /// Wait until the search finishes and return its final state
    pub async fn finished(&mut self) -> SearchState {
        let finished = self
            .state
            .wait_for(SearchState::is_finished)
            .await
            .map(|state| state.clone());
        // The publishing task only drops its sender after a final send.
        finished.unwrap_or_else(|_| self.state())
    }
}

/// Searches launched on this node, keyed by shard
#[derive(Debug, Default)]
pub struct SearchRegistry {
    searches: DashMap<NodeIndex, SearchHandle>,
}

impl SearchRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn the search for one shard
    ///
    /// Returns once the process is running. A shard whose search is still
    /// running is refused, so only one process ever writes its sentinel. A
    /// spawn failure is recorded as a failed search and leaves no sentinel.
    pub fn launch(
        &self,
        config: Arc<FleetConfig>,
        node: NodeIndex,
        storage: Arc<dyn StorageBackend>,
    ) -> Result<SearchHandle> {
        let command = SearchCommand::for_node(&config, node)?;

        // Held until the new handle is in place, so two launches cannot race.
        let slot = self.searches.entry(node);
        if let Entry::Occupied(previous) = &slot {
            if !previous.get().state().is_finished() {
                warn!(node, "Search already running for shard, refusing relaunch");
                return Err(Error::SearchLaunch {
                    node,
                    message: "a search for this shard is still running".to_string(),
                });
            }
        }

        let child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn();

        let child = match child {
            Ok(child) => child,
            Err(e) => {
                let message = format!("failed to spawn {}: {}", command.program.display(), e);
                error!(node, error = %e, program = %command.program.display(), "Search launch failed");
                slot.insert(SearchHandle::settled(
                    node,
                    SearchState::Failed {
                        exit_code: None,
                        message: message.clone(),
                    },
                ));
                return Err(Error::SearchLaunch { node, message });
            }
        };

        info!(node, pid = ?child.id(), program = %command.program.display(), "Search started");

        let (tx, rx) = watch::channel(SearchState::Running);
        let handle = SearchHandle { node, state: rx };
        slot.insert(handle.clone());

        let sentinel = config.sentinel_path(node);
        tokio::spawn(async move {
            let mut state = match child.wait_with_output().await {
                Ok(output) if output.status.success() => {
                    info!(node, "Search finished");
                    SearchState::Succeeded
                }
                Ok(output) => {
                    let message = stderr_tail(&output.stderr);
                    warn!(node, exit_code = ?output.status.code(), stderr = %message, "Search exited with failure");
                    SearchState::Failed {
                        exit_code: output.status.code(),
                        message,
                    }
                }
                Err(e) => {
                    error!(node, error = %e, "Lost track of search process");
                    SearchState::Failed {
                        exit_code: None,
                        message: e.to_string(),
                    }
                }
            };

            // The sentinel marks "finished", not "succeeded".
            if let Err(e) = storage.write(&sentinel, Bytes::new()).await {
                error!(node, error = %e, sentinel = %sentinel.display(), "Failed to write sentinel");
                state = SearchState::Failed {
                    exit_code: None,
                    message: format!("search finished but sentinel write failed: {}", e),
                };
            }

            tx.send_replace(state);
        });

        Ok(handle)
    }

    /// State of the search for a shard; `Unknown` if none was launched here
    pub fn status(&self, node: NodeIndex) -> SearchState {
        self.searches
            .get(&node)
            .map(|h| h.state())
            .unwrap_or(SearchState::Unknown)
    }

    /// Handle of the search for a shard
    pub fn handle(&self, node: NodeIndex) -> Option<SearchHandle> {
        self.searches.get(&node).map(|h| h.clone())
    }

    /// Drop every finished search, keeping running ones
    pub fn forget_finished(&self) -> usize {
        let before = self.searches.len();
        self.searches.retain(|_, handle| !handle.state().is_finished());
        before - self.searches.len()
    }

    /// Number of tracked searches
    pub fn len(&self) -> usize {
        self.searches.len()
    }

    /// Returns true if no search is tracked
    pub fn is_empty(&self) -> bool {
        self.searches.is_empty()
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let start = stderr.len().saturating_sub(STDERR_TAIL_BYTES);
    String::from_utf8_lossy(&stderr[start..]).trim().to_string()
}
