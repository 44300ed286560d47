//! Director for the seqfleet search fleet
//!
//! The director holds no state of its own beyond the manifest. It talks to
//! worker nodes over the command protocol to:
//! - **Check** that every node is alive
//! - **Provision** the control node with the manifest and input
//! - **Launch** one search per node
//! - **Wait** for every shard to finish
//! - **Collect** the aggregated results into the output directory
//!
//! # Example
//!
//! ```ignore
//! use director::DispatchController;
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> fleet_core::Result<()> {
//!     let mut controller = DispatchController::from_manifest("fleet.toml").await?;
//!     let outcome = controller.run(Path::new("sequences.fasta")).await?;
//!     println!("{}", outcome.results_path.display());
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod controller;
pub mod policy;

pub use client::NodeClient;
pub use controller::{DispatchController, DispatchOutcome};
pub use policy::PollPolicy;
