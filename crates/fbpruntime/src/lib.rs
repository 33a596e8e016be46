//! Network runtime
//!
//! This crate holds the graph topology, wires ports together, runs every
//! component in its own task and detects when the whole network has drained.

mod executor;
mod graph;
mod network;

pub use executor::Completion;
pub use graph::{Connection, Graph, PortRef, StartupOrder};
pub use network::{Network, NetworkConfig};
