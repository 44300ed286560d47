//! Dispatch controller
//!
//! Drives one search run across the fleet in five phases:
//! 1. **Liveness**: every node must answer a ping; a failed pass is retried
//!    from the first node after the liveness interval
//! 2. **Provisioning**: the control node receives the manifest and the
//!    input, replicates the manifest, cleans and splits
//! 3. **Launch**: every node starts the search for its own shard
//! 4. **Readiness**: the control node is polled until every shard is done
//! 5. **Collection**: the aggregated results are fetched and written locally
//!
//! Only the liveness phase retries; any failure after it aborts the run.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use fleet_core::{
    ClientConfig, Error, FleetConfig, NodeDescriptor, Result, ResultBundle, ShutdownReceiver,
};
use storage::{LocalStorage, StorageBackend};
use tracing::{info, warn};
use wire::{ControlReply, Request};

use crate::client::NodeClient;
use crate::policy::PollPolicy;

/// Files written by a completed run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Aggregated search output
    pub results_path: PathBuf,

    /// Aggregated query sequences
    pub fasta_path: PathBuf,

    /// Size of the aggregated search output
    pub results_bytes: usize,

    /// Size of the aggregated query sequences
    pub fasta_bytes: usize,
}

/// Orchestrates a search run against the nodes of one manifest
pub struct DispatchController {
    config: FleetConfig,
    manifest_path: PathBuf,
    client: ClientConfig,
    liveness: PollPolicy,
    readiness: PollPolicy,
    output: LocalStorage,
    shutdown: Option<ShutdownReceiver>,
}

impl DispatchController {
    /// Create a controller for a parsed manifest read from `manifest_path`
    pub fn new(config: FleetConfig, manifest_path: impl Into<PathBuf>) -> Self {
        let client = config.dispatch.client_config();
        let liveness = PollPolicy::liveness_from(&config.dispatch);
        let readiness = PollPolicy::readiness_from(&config.dispatch);
        let output = LocalStorage::new(&config.dispatch.output_dir);

        Self {
            config,
            manifest_path: manifest_path.into(),
            client,
            liveness,
            readiness,
            output,
            shutdown: None,
        }
    }

    /// Load the manifest at `path` and build a controller for it
    pub async fn from_manifest(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config = FleetConfig::load(path).await?;
        Ok(Self::new(config, path))
    }

    /// Cancel polling when `shutdown` fires
    pub fn with_shutdown(mut self, shutdown: ShutdownReceiver) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Override the liveness loop
    pub fn with_liveness_policy(mut self, policy: PollPolicy) -> Self {
        self.liveness = policy;
        self
    }

    /// Manifest driving this controller
    pub fn config(&self) -> &FleetConfig {
        &self.config
    }

    /// Run every phase against `fasta`
    pub async fn run(&mut self, fasta: &Path) -> Result<DispatchOutcome> {
        info!(
            nodes = self.config.node_count(),
            profile = %self.config.settings.profile,
            input = %fasta.display(),
            "Starting dispatch"
        );

        self.check_liveness().await?;
        self.provision(fasta).await?;
        self.launch().await?;
        self.await_readiness().await?;
        let outcome = self.collect().await?;

        info!(
            results = %outcome.results_path.display(),
            fasta = %outcome.fasta_path.display(),
            "Dispatch complete"
        );
        Ok(outcome)
    }

    /// Wait until every node answers a ping in a single pass
    pub async fn check_liveness(&mut self) -> Result<()> {
        let policy = self.liveness;
        let mut shutdown = self.shutdown.take();
        let this = &*self;

        let result = policy
            .run("liveness", shutdown.as_mut(), move |attempt| this.liveness_pass(attempt))
            .await;

        self.shutdown = shutdown;
        result
    }

    async fn liveness_pass(&self, attempt: u32) -> Result<Option<()>> {
        for node in self.config.nodes() {
            match self.ping(&node).await {
                Ok(()) => info!(node = %node, attempt, "Node alive"),
                Err(e) if e.is_retryable() => {
                    warn!(node = %node, attempt, error = %e, "Node not answering, restarting liveness pass");
                    return Ok(None);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(Some(()))
    }

    async fn ping(&self, node: &NodeDescriptor) -> Result<()> {
        let mut client = self.connect(node).await?;
        client.expect_ack(&Request::Ping).await?;
        client.bye().await?;
        client.close().await;
        Ok(())
    }

    /// Push the manifest and input to the control node and split the input
    pub async fn provision(&self, fasta: &Path) -> Result<()> {
        let dispatch = &self.config.dispatch;
        let control = self.config.node(dispatch.control_node)?;
        info!(node = %control, "Provisioning control node");

        let mut client = self.connect(&control).await?;
        client.expect_ack(&Request::Ping).await?;

        client
            .send_file(&self.manifest_path, &dispatch.remote_manifest)
            .await?;
        client
            .expect_ack(&Request::LoadConfig {
                path: dispatch.remote_manifest.clone(),
                replicate: true,
            })
            .await?;
        tokio::time::sleep(dispatch.propagation_delay).await;

        client.expect_ack(&Request::Clean).await?;
        tokio::time::sleep(dispatch.propagation_delay).await;

        client.send_file(fasta, &dispatch.remote_fasta).await?;
        client
            .expect_ack(&Request::SplitFasta {
                path: dispatch.remote_fasta.clone(),
            })
            .await?;

        client.bye().await?;
        client.close().await;

        info!(node = %control, "Input split across {} nodes", self.config.node_count());
        Ok(())
    }

    /// Start the search on every node, each against its own shard
    pub async fn launch(&self) -> Result<()> {
        for node in self.config.nodes() {
            let mut client = self.connect(&node).await?;
            client.expect_ack(&self.load_shared_manifest()).await?;
            client
                .expect_ack(&Request::StartInstanceBlast { node: node.index })
                .await?;
            client.bye().await?;
            client.close().await;

            info!(node = %node, "Search launched");
        }
        Ok(())
    }

    /// Poll the control node until every shard is finished
    pub async fn await_readiness(&mut self) -> Result<()> {
        let policy = self.readiness;
        let mut shutdown = self.shutdown.take();
        let this = &*self;

        let result = policy
            .run("readiness", shutdown.as_mut(), move |attempt| this.readiness_check(attempt))
            .await;

        self.shutdown = shutdown;
        result
    }

    async fn readiness_check(&self, attempt: u32) -> Result<Option<()>> {
        let control = self.config.node(self.config.dispatch.control_node)?;

        let mut client = self.connect(&control).await?;
        client.expect_ack(&self.load_shared_manifest()).await?;
        let reply = client.send_command(&Request::IsInstanceReady).await?;
        client.bye().await?;
        client.close().await;

        match reply {
            ControlReply::Ack => Ok(Some(())),
            ControlReply::NotReady => {
                info!(attempt, "Searches still running");
                Ok(None)
            }
        }
    }

    /// Fetch the aggregated results and write them to the output directory
    pub async fn collect(&self) -> Result<DispatchOutcome> {
        let control = self.config.node(self.config.dispatch.control_node)?;

        let mut client = self.connect(&control).await?;
        client.expect_ack(&self.load_shared_manifest()).await?;
        let bundle = client.receive_results().await?;
        client.bye().await?;
        client.close().await;

        self.persist(&bundle).await
    }

    async fn persist(&self, bundle: &ResultBundle) -> Result<DispatchOutcome> {
        let profile = &self.config.settings.profile;
        let results_path = self.config.dispatch.output_dir.join(format!("{}.txt", profile));
        let fasta_path = self.config.dispatch.output_dir.join(format!("{}.fasta", profile));

        self.output
            .write(&results_path, Bytes::copy_from_slice(bundle.results.as_bytes()))
            .await?;
        self.output
            .write(&fasta_path, Bytes::copy_from_slice(bundle.results_fa.as_bytes()))
            .await?;

        info!(
            results = %results_path.display(),
            bytes = bundle.len(),
            "Results written"
        );

        Ok(DispatchOutcome {
            results_path,
            fasta_path,
            results_bytes: bundle.results.len(),
            fasta_bytes: bundle.results_fa.len(),
        })
    }

    fn load_shared_manifest(&self) -> Request {
        Request::LoadConfig {
            path: self.config.shared_manifest_path().display().to_string(),
            replicate: false,
        }
    }

    async fn connect(&self, node: &NodeDescriptor) -> Result<NodeClient> {
        NodeClient::connect(&node.socket_address(), &self.client)
            .await
            .map_err(|e| match e {
                Error::NodeUnavailable { reason, .. } => Error::NodeUnavailable {
                    address: node.to_string(),
                    reason,
                },
                other => other,
            })
    }
}
