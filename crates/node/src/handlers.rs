//! Command handlers
//!
//! Every handler works on a snapshot of the live manifest and returns a
//! [`Reply`]; failures become explicit error replies so the connection stays
//! usable.

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use fleet_core::{Error, FleetConfig, NodeIndex, Result, ResultBundle, SearchReport};
use seq_shard::{parse_fasta, split_round_robin};
use tracing::{debug, info, warn};
use wire::{Reply, Request};

use crate::state::NodeState;

impl NodeState {
    /// Execute one request and produce its reply
    pub async fn handle(&self, request: &Request) -> Reply {
        let result = match request {
            Request::Ping => Ok(Reply::Ack),
            Request::Bye => Ok(Reply::Ack),
            Request::LoadConfig { path, replicate } => self.load_config(path, *replicate).await,
            Request::Clean => self.clean().await,
            Request::ReceiveFile {
                destination,
                contents,
            } => self.receive_file(destination, contents).await,
            Request::SplitFasta { path } => self.split_fasta(path).await,
            Request::StartInstanceBlast { node } => self.start_search(*node),
            Request::IsInstanceReady => self.is_ready().await,
            Request::ReturnResults => self.return_results().await,
            Request::SearchStatus { node } => Ok(self.search_status(*node)),
        };

        result.unwrap_or_else(|e| {
            warn!(command = request.name(), error = %e, "Command failed");
            Reply::from_error(&e)
        })
    }

    async fn load_config(&self, path: &str, replicate: bool) -> Result<Reply> {
        let config = FleetConfig::load(path).await?;

        if replicate {
            let file_name = Path::new(path).file_name().ok_or_else(|| Error::InvalidConfig {
                message: format!("manifest path has no file name: {}", path),
            })?;
            let copy = config.settings.cfg_dir.join(file_name);
            self.storage().copy(Path::new(path), &copy).await?;
            info!(from = path, to = %copy.display(), "Replicated manifest to shared storage");
        }

        self.install_config(config);
        Ok(Reply::Ack)
    }

    async fn clean(&self) -> Result<Reply> {
        let config = self.config()?;

        let mut removed = 0;
        for dir in config.work_dirs() {
            removed += self.storage().clear_files(dir).await?;
        }
        let forgotten = self.searches().forget_finished();

        info!(removed, forgotten, "Cleaned work directories");
        Ok(Reply::Ack)
    }

    async fn receive_file(&self, destination: &str, contents: &str) -> Result<Reply> {
        let size = self
            .storage()
            .write(Path::new(destination), Bytes::copy_from_slice(contents.as_bytes()))
            .await?;
        info!(destination, size, "Received file");
        Ok(Reply::Ack)
    }

    async fn split_fasta(&self, path: &str) -> Result<Reply> {
        let config = self.config()?;
        let input = Path::new(path);

        let raw = self.storage().read(input).await?;
        let text = std::str::from_utf8(&raw).map_err(|e| Error::InvalidFasta {
            message: format!("{} is not UTF-8: {}", path, e),
        })?;
        let plan = split_round_robin(parse_fasta(text)?, config.node_count())?;

        for shard in plan.shards() {
            let target = config.shard_path(shard.node);
            self.storage()
                .write(&target, Bytes::from(shard.to_fasta()))
                .await?;
            debug!(
                node = shard.node,
                sequences = shard.len(),
                residues = shard.residue_count(),
                path = %target.display(),
                "Wrote shard"
            );
        }

        let file_name = input.file_name().ok_or_else(|| Error::InvalidFasta {
            message: format!("input path has no file name: {}", path),
        })?;
        self.storage()
            .copy(input, &config.settings.staging_dir.join(file_name))
            .await?;

        info!(
            input = path,
            nodes = plan.node_count(),
            sequences = plan.total_sequences(),
            "Split input into shards"
        );
        Ok(Reply::Ack)
    }

    fn start_search(&self, node: NodeIndex) -> Result<Reply> {
        let config = self.config()?;
        self.searches()
            .launch(config, node, Arc::clone(self.storage()))?;
        Ok(Reply::Ack)
    }

    async fn is_ready(&self) -> Result<Reply> {
        let config = self.config()?;

        for node in 0..config.node_count() {
            if !self.storage().exists(&config.sentinel_path(node)).await? {
                debug!(node, "Shard not finished");
                return Ok(Reply::NotReady);
            }
        }
        Ok(Reply::Ack)
    }

    async fn return_results(&self) -> Result<Reply> {
        let config = self.config()?;
        let mut bundle = ResultBundle::default();

        for node in 0..config.node_count() {
            bundle
                .results
                .push_str(&self.read_text(&config.shard_result_path(node)).await?);
            bundle
                .results_fa
                .push_str(&self.read_text(&config.shard_path(node)).await?);
        }

        self.storage()
            .write(
                &config.aggregate_results_path(),
                Bytes::copy_from_slice(bundle.results.as_bytes()),
            )
            .await?;
        self.storage()
            .write(
                &config.aggregate_fasta_path(),
                Bytes::copy_from_slice(bundle.results_fa.as_bytes()),
            )
            .await?;

        info!(
            nodes = config.node_count(),
            results_bytes = bundle.results.len(),
            fasta_bytes = bundle.results_fa.len(),
            "Aggregated results"
        );
        Ok(Reply::Results(bundle))
    }

    /// Read a file that must be UTF-8 text; its bytes are never rewritten
    async fn read_text(&self, path: &Path) -> Result<String> {
        let raw = self.storage().read(path).await?;
        String::from_utf8(raw.to_vec()).map_err(|e| Error::Storage {
            message: format!("{} is not UTF-8 text: {}", path.display(), e.utf8_error()),
        })
    }

    fn search_status(&self, node: NodeIndex) -> Reply {
        Reply::SearchStatus(SearchReport {
            node,
            state: self.searches().status(node),
        })
    }
}
