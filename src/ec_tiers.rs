// Tier Store
//
// One tier (level) per erasure-coded generation: level 0 is the initial block,
// every repair adds a new level re-encoding the data lost with exited nodes.

use std::collections::BTreeMap;

use hashbrown::HashMap;
use log::trace;
use rand::Rng;

use crate::ec_cost_model::{CostModel, LatencyModel};
use crate::ec_interface::{BlockHeight, Bytes, Distribution, Level, NodeId};
use crate::ec_nodes::NodeRegistry;

/// Placeholder n x k encoding matrix. Values never enter a cost formula.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorMatrix {
    rows: usize,
    cols: usize,
    values: Vec<f64>,
}

impl GeneratorMatrix {
    pub fn random<R: Rng>(rows: usize, cols: usize, rng: &mut R) -> Self {
        Self {
            rows,
            cols,
            values: (0..rows * cols).map(|_| rng.gen()).collect(),
        }
    }

    /// (rows, cols) = (n, k)
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row < self.rows && col < self.cols {
            self.values.get(row * self.cols + col).copied()
        } else {
            None
        }
    }
}

/// Metadata of one storage level
#[derive(Debug, Clone, PartialEq)]
pub struct Tier {
    /// Fragments needed to reconstruct
    pub k: usize,
    pub fragment_size: Bytes,
    pub generator: GeneratorMatrix,
}

/// Per block height public check data (seed R and one check value per fragment)
#[derive(Debug, Clone, PartialEq)]
pub struct PublicVoucher {
    pub seed: f64,
    pub check_values: Vec<f64>,
}

/// Tier table and voucher table of one simulation run
#[derive(Debug, Clone)]
pub struct TierStore {
    tiers: BTreeMap<Level, Tier>,
    vouchers: HashMap<BlockHeight, PublicVoucher>,
    cost_model: CostModel,
    latency: LatencyModel,
}

impl TierStore {
    pub fn new(cost_model: CostModel, latency: LatencyModel) -> Self {
        Self {
            tiers: BTreeMap::new(),
            vouchers: HashMap::new(),
            cost_model,
            latency,
        }
    }

    pub fn get(&self, level: Level) -> Option<&Tier> {
        self.tiers.get(&level)
    }

    /// Tiers in ascending level order
    pub fn iter(&self) -> impl Iterator<Item = (Level, &Tier)> {
        self.tiers.iter().map(|(&level, tier)| (level, tier))
    }

    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }

    pub fn max_level(&self) -> Option<Level> {
        self.tiers.keys().next_back().copied()
    }

    /// Level a new repair would use: one past the highest, or 0
    pub fn next_level(&self) -> Level {
        self.max_level().map_or(0, |level| level + 1)
    }

    pub fn voucher(&self, height: BlockHeight) -> Option<&PublicVoucher> {
        self.vouchers.get(&height)
    }

    pub fn latency_model(&self) -> &LatencyModel {
        &self.latency
    }

    pub(crate) fn insert(&mut self, level: Level, tier: Tier) {
        self.tiers.insert(level, tier);
    }

    /// Encode `data_size` bytes into k fragments and place one on every target node.
    ///
    /// Records the tier for `level`, marks each target as holding `level` at
    /// `height` and replaces the voucher for `height`. An empty target set is a
    /// no-op returning [`Distribution::NONE`].
    pub fn distribute_and_encode<R: Rng>(
        &mut self,
        nodes: &mut NodeRegistry,
        data_size: Bytes,
        targets: &[NodeId],
        level: Level,
        height: BlockHeight,
        rng: &mut R,
    ) -> Distribution {
        let n = targets.len();
        if n == 0 {
            return Distribution::NONE;
        }

        let k = self
            .cost_model
            .optimal_k(data_size, self.latency.bandwidth_bps, n)
            .min(n);
        if k == 0 {
            return Distribution::NONE;
        }

        let fragment_size = data_size / k as f64;
        self.insert(
            level,
            Tier {
                k,
                fragment_size,
                generator: GeneratorMatrix::random(n, k, rng),
            },
        );

        for &id in targets {
            nodes.store(id, level, height);
        }

        self.vouchers.insert(
            height,
            PublicVoucher {
                seed: rng.gen(),
                check_values: (0..k).map(|_| rng.gen()).collect(),
            },
        );

        let distribution = Distribution {
            storage_cost: n as f64 * fragment_size,
            transfer_latency: self.latency.fragment_upload(fragment_size),
            encode_latency: self.latency.reed_solomon(data_size) + self.latency.fingerprint(data_size),
            k,
        };

        trace!(
            "level {} h{}: {} bytes over {} nodes, k={} fragment={}",
            level,
            height,
            data_size,
            n,
            k,
            fragment_size
        );

        distribution
    }
}
