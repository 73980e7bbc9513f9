//! Simulation run state
//!
//! A [`Network`] owns everything one simulation run mutates: node registry,
//! tier store, cumulative counters, current block height, the run's RNG and
//! its event sink. Runs never share a `Network`.

use log::info;
use rand::rngs::StdRng;

use crate::ec_config::SimConfig;
use crate::ec_cost_model::{CostModel, LatencyModel};
use crate::ec_interface::{
    BlockHeight, Bytes, Distribution, Event, EventSink, NodeId, NoOpSink, Retrieval,
    INITIAL_BLOCK_HEIGHT,
};
use crate::ec_nodes::NodeRegistry;
use crate::ec_recovery::RecoveryEngine;
use crate::ec_tiers::TierStore;

pub struct Network {
    pub(crate) config: SimConfig,
    pub(crate) nodes: NodeRegistry,
    pub(crate) tiers: TierStore,
    pub(crate) current_height: BlockHeight,
    pub(crate) total_repair_bandwidth: Bytes,
    pub(crate) total_storage_overhead: Bytes,
    pub(crate) rng: StdRng,
    pub(crate) sink: Box<dyn EventSink>,
}

impl Network {
    /// Create `config.num_nodes` nodes, assigning Byzantine flags from `rng`
    pub fn new(config: &SimConfig, mut rng: StdRng) -> Self {
        let nodes = NodeRegistry::new(config.num_nodes, config.byzantine_fraction, &mut rng);
        Self::with_registry(config, nodes, rng)
    }

    /// Build around an existing registry (fixed Byzantine layout)
    pub fn with_registry(config: &SimConfig, nodes: NodeRegistry, rng: StdRng) -> Self {
        Self {
            config: config.clone(),
            nodes,
            tiers: TierStore::new(
                CostModel::from_config(config),
                LatencyModel::from_config(config),
            ),
            current_height: 0,
            total_repair_bandwidth: 0.0,
            total_storage_overhead: 0.0,
            rng,
            sink: Box::new(NoOpSink),
        }
    }

    pub fn with_sink(mut self, sink: Box<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn nodes(&self) -> &NodeRegistry {
        &self.nodes
    }

    pub fn tiers(&self) -> &TierStore {
        &self.tiers
    }

    pub fn current_height(&self) -> BlockHeight {
        self.current_height
    }

    pub fn total_repair_bandwidth(&self) -> Bytes {
        self.total_repair_bandwidth
    }

    pub fn total_storage_overhead(&self) -> Bytes {
        self.total_storage_overhead
    }

    /// Write the configured block as level 0 over every active node at height 1
    pub fn initial_block_distribution(&mut self) -> Distribution {
        self.current_height = INITIAL_BLOCK_HEIGHT;

        let targets = self.nodes.active_ids();
        let data_size = self.config.block_size_bytes();
        let distribution = self.tiers.distribute_and_encode(
            &mut self.nodes,
            data_size,
            &targets,
            0,
            self.current_height,
            &mut self.rng,
        );
        self.total_storage_overhead += distribution.storage_cost;

        self.sink.log(
            self.current_height,
            Event::BlockDistributed {
                level: 0,
                data_size,
                nodes: targets.len(),
                k: distribution.k,
            },
        );
        info!(
            "initial distribution: {} nodes ({} byzantine), k={}, storage={:.0} bytes",
            targets.len(),
            self.nodes.byzantine_count(),
            distribution.k,
            distribution.storage_cost
        );

        distribution
    }

    /// Try to rebuild a block of `block_size` bytes, level by level
    pub fn retrieve_block(&mut self, block_size: Bytes) -> Retrieval {
        let engine = RecoveryEngine::new(
            &self.nodes,
            &self.tiers,
            self.current_height,
            self.config.discovery_failure_penalty(),
        );
        engine.retrieve_block(block_size, &mut self.rng, self.sink.as_mut())
    }

    /// Bytes a node keeps for the current height: fragment, metadata and fingerprint per level
    pub fn node_footprint(&self, id: NodeId) -> Bytes {
        let Some(node) = self.nodes.get(id) else {
            return 0.0;
        };
        node.levels_at(self.current_height)
            .filter_map(|level| self.tiers.get(level))
            .map(|tier| {
                tier.fragment_size
                    + self.config.piece_metadata_size_bytes
                    + self.config.fingerprint_size_bytes
            })
            .sum()
    }

    /// Mean footprint over active nodes (0 when none are left)
    pub fn avg_active_footprint(&self) -> Bytes {
        let active = self.nodes.active_ids();
        if active.is_empty() {
            return 0.0;
        }
        active.iter().map(|&id| self.node_footprint(id)).sum::<Bytes>() / active.len() as f64
    }
}
