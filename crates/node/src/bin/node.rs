//! Node binary entry point
//!
//! Usage: `seqfleet-node [bind_addr] [manifest]`

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fleet_core::FleetConfig;
use node::{NodeServer, NodeState, ServerConfig};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "seqfleet-node", version)]
#[command(about = "Worker command server of a seqfleet search fleet", long_about = None)]
struct Args {
    /// Address to listen on
    #[arg(default_value = "0.0.0.0:5001")]
    bind_addr: SocketAddr,

    /// Manifest to load before accepting commands
    manifest: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "seqfleet_node=info,node=info,storage=info,fleet_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let state = Arc::new(NodeState::default());
    if let Some(manifest) = &args.manifest {
        let config = FleetConfig::load(manifest).await?;
        tracing::info!(manifest = %manifest.display(), "Preloaded manifest");
        state.install_config(config);
    }

    tracing::info!("Starting seqfleet node on {}", args.bind_addr);

    let config = ServerConfig {
        addr: args.bind_addr,
        ..ServerConfig::default()
    };
    NodeServer::with_config(state, config).run().await?;

    Ok(())
}
