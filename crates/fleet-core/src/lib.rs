//! Fleet Core - Foundation for the seqfleet search fleet
//!
//! Provides the shared error type, the fleet manifest, node descriptors and
//! the small pieces of runtime bookkeeping (connection table, shutdown
//! signalling) used by both the worker nodes and the director.

pub mod config;
pub mod connection;
pub mod error;
pub mod shutdown;
pub mod types;

pub use config::{ClientConfig, DispatchConfig, FleetConfig, InstanceConfig, SearchProfile, Settings};
pub use connection::{ConnectionId, ConnectionInfo, ConnectionTable, ConnectionTableHandle};
pub use error::{Error, Result};
pub use shutdown::{Shutdown, ShutdownReceiver};
pub use types::*;
