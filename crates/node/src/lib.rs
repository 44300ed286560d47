//! Worker node for the seqfleet search fleet
//!
//! A node accepts length-prefixed JSON commands over TCP and works against
//! storage shared with every other node:
//! - **Provisioning**: receive files, load and replicate the manifest, clean
//!   the work directories
//! - **Sharding**: split the input FASTA into one query shard per node
//! - **Searching**: run the search executable per shard in the background,
//!   marking completion with a sentinel file
//! - **Collection**: report readiness and return the aggregated results
//!
//! # Example
//!
//! ```ignore
//! use node::{NodeServer, NodeState};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> fleet_core::Result<()> {
//!     NodeServer::new(Arc::new(NodeState::default())).run().await
//! }
//! ```

mod handlers;
pub mod search;
pub mod server;
pub mod state;

pub use search::{SearchCommand, SearchHandle, SearchRegistry};
pub use server::{NodeServer, ServerConfig};
pub use state::{NodeState, NodeStateHandle};
