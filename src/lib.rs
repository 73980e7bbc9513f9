//! # bft_ec - Byzantine-tolerant Erasure Coding Simulator
//!
//! A discrete-event model of a tiered erasure-coded storage scheme running over
//! nodes of which a fraction are Byzantine. Nothing is transmitted or encoded:
//! every cost is a closed-form latency or size formula, and the simulation
//! reports storage overhead, repair bandwidth, write latency and recovery latency
//! as nodes leave.
//!
//! ## Core Components
//!
//! - **CostModel**: picks the fragmentation parameter k for a data size and node count
//! - **NodeRegistry**: node status, Byzantine flags and per-level storage
//! - **TierStore**: one tier per level; encodes and places data on target nodes
//! - **Churn** (`Network::handle_node_exit`): re-encodes data lost with a departing node as a new level
//! - **RecoveryEngine**: serial level-by-level reconstruction with Byzantine-aware validation
//!
//! ## Usage
//!
//! ```no_run
//! use bft_ec::{Network, SimConfig};
//! use rand::rngs::StdRng;
//! use rand::SeedableRng;
//!
//! let config = SimConfig::default();
//! let mut network = Network::new(&config, StdRng::from_seed([0; 32]));
//!
//! network.initial_block_distribution();
//! network.handle_node_exit(3);
//! let retrieval = network.retrieve_block(config.block_size_bytes());
//! println!("recovered from level {}", retrieval.level_index());
//! ```
//!
//! Full churn runs and cross-run averaging live in [`Simulator`] and [`Report`];
//! the `bft_ec_sim` binary in `simulator/` drives them from a YAML config.

pub mod ec_config;
pub mod ec_cost_model;
pub mod ec_interface;
pub mod ec_nodes;
pub mod ec_tiers;

// Simulation run and its operations
pub mod ec_churn;
pub mod ec_network;
pub mod ec_recovery;

// Driver and reporting
pub mod ec_report;
pub mod ec_simulator;

// Re-export commonly used types
pub use ec_config::{ConfigError, SimConfig};
pub use ec_cost_model::{CostModel, LatencyModel};
pub use ec_interface::{
    BlockHeight, Bytes, Distribution, Event, EventSink, ExitCost, Level, LogSink, NoOpSink,
    NodeId, Retrieval, Seconds, MB,
};
pub use ec_network::Network;
pub use ec_nodes::{NodeRegistry, NodeStatus, StorageNode};
pub use ec_recovery::RecoveryEngine;
pub use ec_report::{Report, ReportRow};
pub use ec_simulator::{RunResult, Simulator, StepRecord};
pub use ec_tiers::{GeneratorMatrix, PublicVoucher, Tier, TierStore};
