//! Fleet manifest configuration
//!
//! The manifest is a TOML document shared by the director and every node. It
//! names the worker instances (in order; a node's identity is its position),
//! the shared-storage directories, the search executable with its tuning
//! profiles, and the director's dispatch settings.

use crate::{Error, NodeDescriptor, NodeIndex, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default command port of a worker node
pub const DEFAULT_PORT: u16 = 5001;

/// Default upper bound on a single wire frame
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 256 * 1024 * 1024; // 256MB

/// Main fleet configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetConfig {
    /// Shared paths and executable settings
    pub settings: Settings,

    /// Ordered worker instances
    pub instances: Vec<InstanceConfig>,

    /// Named search tuning profiles
    #[serde(default)]
    pub profiles: HashMap<String, SearchProfile>,

    /// Director-side dispatch settings
    #[serde(default)]
    pub dispatch: DispatchConfig,
}

/// Shared path and executable settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Command port used by every node without an explicit override
    #[serde(default = "default_port")]
    pub port: u16,

    /// Shared directory receiving replicated manifests
    pub cfg_dir: PathBuf,

    /// Shared staging directory for the echoed input
    pub staging_dir: PathBuf,

    /// Shared directory holding one query shard per node
    pub split_dir: PathBuf,

    /// Shared directory holding one search result per node
    pub split_result_dir: PathBuf,

    /// Shared directory for sentinels and aggregated results
    pub result_dir: PathBuf,

    /// Search executable
    pub blastn_bin: PathBuf,

    /// Search database
    pub database: String,

    /// Active tuning profile name
    #[serde(default = "default_profile_name")]
    pub profile: String,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_profile_name() -> String {
    "default".to_string()
}

/// One worker instance in the manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceConfig {
    /// Instance identifier, unique within the manifest
    pub id: String,

    /// Host name or IP address
    pub address: String,

    /// Per-instance port override
    #[serde(default)]
    pub port: Option<u16>,
}

/// Search tuning parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchProfile {
    pub threads: u32,
    pub penalty: i32,
    pub reward: i32,
    pub gapopen: u32,
    pub gapextend: u32,
    pub evalue: String,
    pub num_descriptions: u32,
    pub num_alignments: u32,
    pub max_hsps: u32,
    pub culling_limit: u32,
}

impl Default for SearchProfile {
    fn default() -> Self {
        Self {
            threads: 1,
            penalty: -3,
            reward: 2,
            gapopen: 5,
            gapextend: 2,
            evalue: "10".to_string(),
            num_descriptions: 10,
            num_alignments: 10,
            max_hsps: 1,
            culling_limit: 5,
        }
    }
}

/// Director-side dispatch settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Index of the node that splits input and answers the readiness barrier
    pub control_node: NodeIndex,

    /// Path on the control node where the manifest is pushed
    pub remote_manifest: String,

    /// Path on the control node where the input FASTA is pushed
    pub remote_fasta: String,

    /// Local directory receiving the collected results
    pub output_dir: PathBuf,

    /// Wait between liveness passes
    #[serde(rename = "liveness_interval_ms", with = "duration_ms")]
    pub liveness_interval: Duration,

    /// Give up on liveness after this long
    #[serde(rename = "liveness_deadline_ms", with = "option_duration_ms")]
    pub liveness_deadline: Option<Duration>,

    /// Wait between readiness polls
    #[serde(rename = "readiness_interval_ms", with = "duration_ms")]
    pub readiness_interval: Duration,

    /// Give up on the readiness barrier after this long
    #[serde(rename = "readiness_deadline_ms", with = "option_duration_ms")]
    pub readiness_deadline: Option<Duration>,

    /// Pause after writes that must propagate through shared storage
    #[serde(rename = "propagation_delay_ms", with = "duration_ms")]
    pub propagation_delay: Duration,

    /// Connect timeout for each node connection
    #[serde(rename = "connect_timeout_ms", with = "duration_ms")]
    pub connect_timeout: Duration,

    /// Steady-state read/write timeout
    #[serde(rename = "io_timeout_ms", with = "duration_ms")]
    pub io_timeout: Duration,

    /// Maximum frame size accepted from a node
    pub max_message_size: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            control_node: 0,
            remote_manifest: "/home/ec2-user/ec2received.cfg".to_string(),
            remote_fasta: "/home/ec2-user/sequencesreceived.fasta".to_string(),
            output_dir: PathBuf::from("."),
            liveness_interval: Duration::from_secs(15),
            liveness_deadline: None,
            readiness_interval: Duration::from_secs(30),
            readiness_deadline: None,
            propagation_delay: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(5),
            io_timeout: Duration::from_secs(120),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

/// Client connection settings derived from the dispatch section
#[derive(Debug, Clone, Copy)]
pub struct ClientConfig {
    /// Connect timeout
    pub connect_timeout: Duration,

    /// Per-operation timeout once connected
    pub io_timeout: Duration,

    /// Maximum accepted frame size
    pub max_message_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        DispatchConfig::default().client_config()
    }
}

impl DispatchConfig {
    /// Client connection settings for this dispatch
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            connect_timeout: self.connect_timeout,
            io_timeout: self.io_timeout,
            max_message_size: self.max_message_size,
        }
    }
}

impl FleetConfig {
    /// Parse and validate a manifest from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: FleetConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a manifest file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => Error::StoragePathNotFound {
                    path: path.display().to_string(),
                },
                _ => Error::Io(e),
            })?;
        Self::from_toml_str(&text)
    }

    /// Check manifest invariants
    pub fn validate(&self) -> Result<()> {
        if self.instances.is_empty() {
            return Err(Error::InvalidConfig {
                message: "manifest lists no instances".to_string(),
            });
        }

        let mut seen = HashSet::new();
        for instance in &self.instances {
            if !seen.insert(instance.id.as_str()) {
                return Err(Error::InvalidConfig {
                    message: format!("duplicate instance id: {}", instance.id),
                });
            }
        }

        if !self.profiles.contains_key(&self.settings.profile) {
            return Err(Error::InvalidConfig {
                message: format!("search profile not defined: {}", self.settings.profile),
            });
        }

        if self.dispatch.control_node >= self.instances.len() {
            return Err(Error::InvalidConfig {
                message: format!(
                    "control node {} out of range for {} instances",
                    self.dispatch.control_node,
                    self.instances.len()
                ),
            });
        }

        Ok(())
    }

    /// Number of nodes in the manifest
    pub fn node_count(&self) -> usize {
        self.instances.len()
    }

    /// Node descriptors in manifest order
    pub fn nodes(&self) -> Vec<NodeDescriptor> {
        self.instances
            .iter()
            .enumerate()
            .map(|(index, instance)| NodeDescriptor {
                index,
                id: instance.id.clone(),
                address: instance.address.clone(),
                port: instance.port.unwrap_or(self.settings.port),
            })
            .collect()
    }

    /// Descriptor of a single node
    pub fn node(&self, index: NodeIndex) -> Result<NodeDescriptor> {
        self.nodes()
            .into_iter()
            .nth(index)
            .ok_or(Error::NodeOutOfRange {
                index,
                nodes: self.node_count(),
            })
    }

    /// Active search profile
    pub fn active_profile(&self) -> Result<&SearchProfile> {
        self.profiles
            .get(&self.settings.profile)
            .ok_or_else(|| Error::InvalidConfig {
                message: format!("search profile not defined: {}", self.settings.profile),
            })
    }

    /// Query shard for a node
    pub fn shard_path(&self, index: NodeIndex) -> PathBuf {
        self.settings
            .split_dir
            .join(format!("sequences_instance_{}.fasta", index))
    }

    /// Search output for a node
    pub fn shard_result_path(&self, index: NodeIndex) -> PathBuf {
        self.settings
            .split_result_dir
            .join(format!("sequences_instance_{}.txt", index))
    }

    /// Readiness sentinel for a node
    pub fn sentinel_path(&self, index: NodeIndex) -> PathBuf {
        self.settings.result_dir.join(format!("ready{}", index))
    }

    /// Aggregated search output
    pub fn aggregate_results_path(&self) -> PathBuf {
        self.settings.result_dir.join("result.txt")
    }

    /// Aggregated query sequences
    pub fn aggregate_fasta_path(&self) -> PathBuf {
        self.settings.result_dir.join("result.fasta")
    }

    /// Directories emptied by `clean`
    pub fn work_dirs(&self) -> [&Path; 4] {
        [
            self.settings.staging_dir.as_path(),
            self.settings.split_dir.as_path(),
            self.settings.split_result_dir.as_path(),
            self.settings.result_dir.as_path(),
        ]
    }

    /// Location of the replicated manifest on shared storage, as seen by every node
    pub fn shared_manifest_path(&self) -> PathBuf {
        let file_name = Path::new(&self.dispatch.remote_manifest)
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "manifest.toml".into());
        self.settings.cfg_dir.join(file_name)
    }
}

/// Millisecond serialization for durations
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

mod option_duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = Option::<u64>::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
    }
}
