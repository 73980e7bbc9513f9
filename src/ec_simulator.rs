//! Churn simulation driver
//!
//! One run writes the block, then removes nodes step by step until the
//! configured exit fraction is reached, measuring repair and recovery cost
//! after every step.

use log::{debug, info};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::ec_config::{ConfigError, SimConfig};
use crate::ec_interface::{Bytes, Seconds};
use crate::ec_network::Network;

/// Metrics after the initial write or one churn step
#[derive(Debug, Clone, PartialEq)]
pub struct StepRecord {
    /// Fraction of the initial nodes that have left (0.0 for the initial write)
    pub exit_percentage: f64,
    pub remaining_nodes: usize,
    pub total_storage_overhead: Bytes,
    pub total_repair_bandwidth: Bytes,
    /// Initial write latency, or mean repair latency per exited node
    pub write_latency: Seconds,
    /// Highest level reached by any retrieval, -1 if none succeeded
    pub max_recovery_level: i64,
    /// Mean of the finite retrieval latencies, infinite if none succeeded
    pub avg_recovery_latency: Seconds,
    pub avg_node_storage_bytes: Bytes,
}

/// Output of one full simulation run
#[derive(Debug, Clone)]
pub struct RunResult {
    pub initial_k: usize,
    pub records: Vec<StepRecord>,
}

/// Retrieval statistics over repeated attempts
struct RecoveryStats {
    avg_latency: Seconds,
    max_level: i64,
}

pub struct Simulator {
    config: SimConfig,
}

impl Simulator {
    pub fn new(config: SimConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Run `simulation_runs` independent instances, each with its own RNG drawn from the master seed
    pub fn run_all(&self) -> Result<(Vec<RunResult>, [u8; 32]), ConfigError> {
        let seed = self.config.resolve_seed()?;
        let mut master = StdRng::from_seed(seed);

        info!(
            "starting {} runs: {} nodes, byzantine fraction {}",
            self.config.simulation_runs, self.config.num_nodes, self.config.byzantine_fraction
        );

        let runs = (0..self.config.simulation_runs)
            .map(|run| {
                debug!("run {}", run);
                self.run_single(StdRng::from_seed(master.gen()))
            })
            .collect();

        Ok((runs, seed))
    }

    /// One complete churn simulation on a fresh network
    pub fn run_single(&self, rng: StdRng) -> RunResult {
        let config = &self.config;
        let block_size = config.block_size_bytes();
        let mut network = Network::new(config, rng);
        let mut records = Vec::new();

        let initial = network.initial_block_distribution();
        let stats = self.measure_recovery(&mut network, block_size);
        records.push(StepRecord {
            exit_percentage: 0.0,
            remaining_nodes: config.num_nodes,
            total_storage_overhead: network.total_storage_overhead(),
            total_repair_bandwidth: 0.0,
            write_latency: initial.write_latency(),
            max_recovery_level: 0,
            avg_recovery_latency: stats.avg_latency,
            avg_node_storage_bytes: network.avg_active_footprint(),
        });

        let initial_nodes = config.num_nodes;
        let step = ((initial_nodes as f64 * config.exit_percentage_step) as usize).max(1);
        let max_exited = (initial_nodes as f64 * config.max_exit_percentage) as usize;
        let floor = initial_nodes - max_exited.min(initial_nodes);

        let mut total_exited = 0;
        let mut current_nodes = initial_nodes;
        while current_nodes > floor && current_nodes > 0 {
            let to_exit = step.min(current_nodes - floor);
            if to_exit == 0 {
                break;
            }

            let exit_latency = self.run_exit_step(&mut network, to_exit);
            let stats = self.measure_recovery(&mut network, block_size);
            total_exited += to_exit;
            current_nodes -= to_exit;

            let record = StepRecord {
                exit_percentage: total_exited as f64 / initial_nodes as f64,
                remaining_nodes: current_nodes,
                total_storage_overhead: network.total_storage_overhead(),
                total_repair_bandwidth: network.total_repair_bandwidth(),
                write_latency: exit_latency / to_exit as f64,
                max_recovery_level: stats.max_level,
                avg_recovery_latency: stats.avg_latency,
                avg_node_storage_bytes: network.avg_active_footprint(),
            };
            info!(
                "exit {:.0}%: {} nodes left, {} levels, max recovery level {}, avg recovery {:.4}s",
                record.exit_percentage * 100.0,
                record.remaining_nodes,
                network.tiers().len(),
                record.max_recovery_level,
                record.avg_recovery_latency
            );
            records.push(record);
        }

        RunResult {
            initial_k: initial.k,
            records,
        }
    }

    /// Remove `count` random active nodes; returns their summed repair latency
    fn run_exit_step(&self, network: &mut Network, count: usize) -> Seconds {
        let active = network.nodes().active_ids();
        let leaving: Vec<_> = active
            .choose_multiple(&mut network.rng, count.min(active.len()))
            .copied()
            .collect();

        leaving
            .into_iter()
            .map(|id| network.handle_node_exit(id).latency)
            .sum()
    }

    fn measure_recovery(&self, network: &mut Network, block_size: Bytes) -> RecoveryStats {
        let mut finite = Vec::with_capacity(self.config.recovery_repetitions);
        let mut max_level = -1;

        for _ in 0..self.config.recovery_repetitions {
            let retrieval = network.retrieve_block(block_size);
            if retrieval.is_recovered() {
                finite.push(retrieval.latency());
            }
            max_level = max_level.max(retrieval.level_index());
        }

        let avg_latency = if finite.is_empty() {
            f64::INFINITY
        } else {
            finite.iter().sum::<Seconds>() / finite.len() as f64
        };

        RecoveryStats {
            avg_latency,
            max_level,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(num_nodes: usize, byzantine_fraction: f64) -> SimConfig {
        SimConfig {
            num_nodes,
            byzantine_fraction,
            simulation_runs: 2,
            recovery_repetitions: 10,
            seed: Some("0xabcdef".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_step_schedule() {
        let sim = Simulator::new(config(20, 0.0));
        let result = sim.run_single(StdRng::from_seed([30; 32]));

        // 10% steps of 2 nodes up to 50%
        let exits: Vec<f64> = result.records.iter().map(|r| r.exit_percentage).collect();
        assert_eq!(exits, vec![0.0, 0.1, 0.2, 0.3, 0.4, 0.5]);
        let remaining: Vec<usize> = result.records.iter().map(|r| r.remaining_nodes).collect();
        assert_eq!(remaining, vec![20, 18, 16, 14, 12, 10]);
    }

    #[test]
    fn test_counters_are_cumulative() {
        let sim = Simulator::new(config(20, 0.0));
        let result = sim.run_single(StdRng::from_seed([31; 32]));

        let first = &result.records[0];
        assert_eq!(first.total_repair_bandwidth, 0.0);
        assert_eq!(first.max_recovery_level, 0);
        assert!(first.avg_recovery_latency.is_finite());

        for pair in result.records.windows(2) {
            assert!(pair[1].total_storage_overhead >= pair[0].total_storage_overhead);
            assert!(pair[1].total_repair_bandwidth >= pair[0].total_repair_bandwidth);
        }
        assert!(result.records.last().unwrap().total_repair_bandwidth > 0.0);
    }

    #[test]
    fn test_fully_byzantine_run_never_recovers() {
        let sim = Simulator::new(config(10, 1.0));
        let result = sim.run_single(StdRng::from_seed([32; 32]));

        assert!(result.records[0].avg_recovery_latency.is_infinite());
        for record in &result.records[1..] {
            assert_eq!(record.max_recovery_level, -1);
            assert!(record.avg_recovery_latency.is_infinite());
        }
    }

    #[test]
    fn test_run_all_is_reproducible() {
        let sim = Simulator::new(config(15, 0.2));

        let (first, seed_a) = sim.run_all().unwrap();
        let (second, seed_b) = sim.run_all().unwrap();

        assert_eq!(seed_a, seed_b);
        assert_eq!(first.len(), 2);
        for (a, b) in first.iter().zip(&second) {
            assert_eq!(a.records, b.records);
        }
    }

    #[test]
    fn test_single_node_network() {
        let mut cfg = config(1, 0.0);
        cfg.max_exit_percentage = 1.0;
        let result = Simulator::new(cfg).run_single(StdRng::from_seed([33; 32]));

        assert_eq!(result.initial_k, 1);
        let last = result.records.last().unwrap();
        assert_eq!(last.remaining_nodes, 0);
        assert_eq!(last.max_recovery_level, -1);
        assert_eq!(last.avg_node_storage_bytes, 0.0);
    }
}
