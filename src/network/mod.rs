//! Network selection
//!
//! Resolves a network identifier (optionally forked from another network)
//! into the effective connection parameters, and turns that context into a
//! local node command line for `start-network`.

pub mod node;
pub mod resolver;

pub use node::{run_local_node, NodeLaunch};
pub use resolver::{ForkSettings, NetworkContext, NetworkResolver};
