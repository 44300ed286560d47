//! Shared harness: a fleet of real nodes on loopback over one temp directory

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use fleet_core::{FleetConfig, Shutdown};
use node::{NodeServer, NodeState, NodeStateHandle};
use tempfile::TempDir;
use tokio::net::TcpListener;

/// Fake search executable: copies the `-query` file to the `-out` file
pub const COPY_QUERY_SCRIPT: &str = r#"#!/bin/sh
while [ $# -gt 0 ]; do
  case "$1" in
    -query) query="$2"; shift 2 ;;
    -out) out="$2"; shift 2 ;;
    *) shift ;;
  esac
done
mkdir -p "$(dirname "$out")"
cp "$query" "$out"
"#;

/// Sequence lengths of the canonical three-node input
pub const SCENARIO_LENGTHS: [usize; 7] = [500, 10, 10, 10, 300, 10, 10];

pub struct Fleet {
    pub root: TempDir,
    pub ports: Vec<u16>,
    pub manifest: PathBuf,
    pub fasta: PathBuf,
    pub states: Vec<Option<NodeStateHandle>>,
    shutdown: Shutdown,
}

impl Fleet {
    /// Lay out a fleet of `nodes` without starting any of them
    pub fn new(nodes: usize) -> Result<Self> {
        let root = tempfile::tempdir()?;
        let blastn = fake_blastn(root.path())?;
        let ports = (0..nodes)
            .map(|_| portpicker::pick_unused_port().expect("No ports free"))
            .collect::<Vec<_>>();

        let director_dir = root.path().join("director");
        std::fs::create_dir_all(&director_dir)?;

        let manifest = director_dir.join("fleet.toml");
        std::fs::write(&manifest, manifest_text(root.path(), &ports, &blastn))?;

        let fasta = director_dir.join("sequences.fasta");
        std::fs::write(&fasta, fasta_with_lengths(&SCENARIO_LENGTHS))?;

        Ok(Self {
            root,
            states: vec![None; nodes],
            ports,
            manifest,
            fasta,
            shutdown: Shutdown::new(),
        })
    }

    /// Lay out and start every node
    pub async fn start(nodes: usize) -> Result<Self> {
        let mut fleet = Self::new(nodes)?;
        for i in 0..nodes {
            fleet.start_node(i).await?;
        }
        Ok(fleet)
    }

    /// Start node `i`; it is accepting connections when this returns
    pub async fn start_node(&mut self, i: usize) -> Result<NodeStateHandle> {
        let listener = TcpListener::bind(("127.0.0.1", self.ports[i])).await?;
        let state = Arc::new(NodeState::default());
        let server = NodeServer::new(state.clone());

        let mut rx = self.shutdown.subscribe();
        tokio::spawn(async move {
            server
                .serve_listener(listener, async move {
                    fleet_core::shutdown::wait_for(&mut rx).await;
                })
                .await
        });

        self.states[i] = Some(state.clone());
        Ok(state)
    }

    pub fn address(&self, i: usize) -> String {
        format!("127.0.0.1:{}", self.ports[i])
    }

    pub fn config(&self) -> Result<FleetConfig> {
        Ok(FleetConfig::from_toml_str(&std::fs::read_to_string(&self.manifest)?)?)
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.root.path().join(relative)
    }
}

impl Drop for Fleet {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

pub fn manifest_text(root: &Path, ports: &[u16], blastn: &str) -> String {
    let mut text = format!(
        r#"[settings]
cfg_dir = "{root}/cfg"
staging_dir = "{root}/staging"
split_dir = "{root}/seqsplit"
split_result_dir = "{root}/seqsplitresult"
result_dir = "{root}/results"
blastn_bin = "{blastn}"
database = "nt"
profile = "quick"

[profiles.quick]
threads = 2
penalty = -3
reward = 2
gapopen = 5
gapextend = 2
evalue = "1e-10"
num_descriptions = 5
num_alignments = 5
max_hsps = 1
culling_limit = 2

[dispatch]
control_node = 0
remote_manifest = "{root}/incoming/fleet.toml"
remote_fasta = "{root}/incoming/sequences.fasta"
output_dir = "{root}/out"
liveness_interval_ms = 50
readiness_interval_ms = 50
readiness_deadline_ms = 20000
propagation_delay_ms = 10
connect_timeout_ms = 1000
io_timeout_ms = 5000
"#,
        root = root.display(),
        blastn = blastn,
    );
    for (i, port) in ports.iter().enumerate() {
        text.push_str(&format!(
            "\n[[instances]]\nid = \"instance_{}\"\naddress = \"127.0.0.1\"\nport = {}\n",
            i, port
        ));
    }
    text
}

pub fn fasta_with_lengths(lengths: &[usize]) -> String {
    lengths
        .iter()
        .enumerate()
        .map(|(i, len)| format!(">seq{}\n{}\n", i, "A".repeat(*len)))
        .collect()
}

#[cfg(unix)]
fn fake_blastn(root: &Path) -> Result<String> {
    use std::os::unix::fs::PermissionsExt;

    let bin = root.join("bin");
    std::fs::create_dir_all(&bin)?;
    let path = bin.join("blastn");
    std::fs::write(&path, COPY_QUERY_SCRIPT)?;
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;
    Ok(path.display().to_string())
}

#[cfg(not(unix))]
fn fake_blastn(_root: &Path) -> Result<String> {
    Ok("blastn".to_string())
}
