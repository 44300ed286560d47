//! Director binary entry point
//!
//! Usage: `seqfleet-director --cfg <manifest> --fasta <input>`

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use director::DispatchController;
use fleet_core::Shutdown;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "seqfleet-director", version)]
#[command(about = "Run one search across the seqfleet nodes of a manifest", long_about = None)]
struct Args {
    /// Fleet manifest (TOML)
    #[arg(long)]
    cfg: PathBuf,

    /// Input sequences (FASTA)
    #[arg(long)]
    fasta: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "seqfleet_director=info,director=info,fleet_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let shutdown = Shutdown::new();
    let controller = DispatchController::from_manifest(&args.cfg).await?;
    let mut controller = controller.with_shutdown(shutdown.subscribe());

    let trigger = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received Ctrl+C, cancelling dispatch");
            trigger.trigger();
        }
    });

    let outcome = controller.run(&args.fasta).await?;

    println!("{}", outcome.results_path.display());
    println!("{}", outcome.fasta_path.display());
    Ok(())
}
