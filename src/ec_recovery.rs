//! Serial, level-by-level block reconstruction
//!
//! The client does not know which level currently holds enough honest
//! fragments, so it walks levels in ascending order:
//!
//! 1. Collect the live providers of the level (active, holding the current height).
//! 2. Fewer providers than k: pay one discovery round trip, move on.
//! 3. Otherwise visit providers one at a time in random order, paying download,
//!    fingerprint and verification for each. Byzantine fragments are paid for
//!    but not counted.
//! 4. k valid fragments: add decode time and stop at this level.
//! 5. List exhausted first: keep the wasted time, move on.
//!
//! Every failed level's cost is carried into the level that finally succeeds.
//! If none does, the result is [`Retrieval::Unrecoverable`].

use log::{debug, trace};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::ec_interface::{BlockHeight, Bytes, Event, EventSink, Retrieval, Seconds};
use crate::ec_nodes::NodeRegistry;
use crate::ec_tiers::TierStore;

/// Read-only view over node and tier state for one retrieval
pub struct RecoveryEngine<'a> {
    nodes: &'a NodeRegistry,
    tiers: &'a TierStore,
    height: BlockHeight,
    discovery_penalty: Seconds,
}

impl<'a> RecoveryEngine<'a> {
    pub fn new(
        nodes: &'a NodeRegistry,
        tiers: &'a TierStore,
        height: BlockHeight,
        discovery_penalty: Seconds,
    ) -> Self {
        Self {
            nodes,
            tiers,
            height,
            discovery_penalty,
        }
    }

    pub fn retrieve_block<R: Rng + ?Sized>(
        &self,
        block_size: Bytes,
        rng: &mut R,
        sink: &mut dyn EventSink,
    ) -> Retrieval {
        let latency = self.tiers.latency_model();
        let mut total: Seconds = 0.0;

        for (level, tier) in self.tiers.iter() {
            let mut providers = self.nodes.providers(level, self.height);

            if providers.len() < tier.k {
                total += self.discovery_penalty;
                trace!(
                    "level {}: {} providers < k={}, discovery penalty",
                    level,
                    providers.len(),
                    tier.k
                );
                sink.log(
                    self.height,
                    Event::LevelInsufficient {
                        level,
                        providers: providers.len(),
                        k: tier.k,
                    },
                );
                continue;
            }

            providers.shuffle(rng);

            let mut level_latency: Seconds = 0.0;
            let mut valid = 0;
            let mut attempted = 0;
            for &id in &providers {
                if valid >= tier.k {
                    break;
                }
                attempted += 1;
                level_latency += latency.fetch_and_verify(tier.fragment_size);

                if self.nodes.get(id).is_some_and(|node| !node.is_byzantine()) {
                    valid += 1;
                }
            }

            if valid >= tier.k {
                level_latency += latency.reed_solomon(tier.k as f64 * tier.fragment_size);
                total += level_latency;

                trace!("level {}: rebuilt after {} fetches", level, attempted);
                debug!("block recovered from level {} in {:.4}s", level, total);
                sink.log(self.height, Event::BlockRecovered { level, latency: total });
                return Retrieval::Recovered {
                    latency: total,
                    bandwidth: block_size,
                    level,
                };
            }

            total += level_latency;
            trace!(
                "level {}: only {}/{} valid after {} fetches",
                level,
                valid,
                tier.k,
                attempted
            );
            sink.log(
                self.height,
                Event::LevelByzantineFailure {
                    level,
                    attempted,
                    valid,
                    k: tier.k,
                },
            );
        }

        debug!("block unrecoverable after {} levels", self.tiers.len());
        sink.log(self.height, Event::BlockUnrecoverable);
        Retrieval::Unrecoverable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ec_config::SimConfig;
    use crate::ec_cost_model::{CostModel, LatencyModel};
    use crate::ec_interface::{NoOpSink, MB};
    use crate::ec_network::tests::{ten_node_config, RecordingSink};
    use crate::ec_network::Network;
    use crate::ec_tiers::{GeneratorMatrix, Tier};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const HEIGHT: BlockHeight = 1;
    const PENALTY: Seconds = 0.05;

    fn empty_tiers() -> TierStore {
        let config = SimConfig::default();
        TierStore::new(CostModel::from_config(&config), LatencyModel::from_config(&config))
    }

    /// Register `level` with `k` fragments of `fragment_size` held by `holders`
    fn add_level(
        tiers: &mut TierStore,
        nodes: &mut NodeRegistry,
        level: u32,
        k: usize,
        fragment_size: Bytes,
        holders: &[usize],
    ) {
        let mut rng = StdRng::from_seed([0; 32]);
        tiers.insert(
            level,
            Tier {
                k,
                fragment_size,
                generator: GeneratorMatrix::random(holders.len(), k, &mut rng),
            },
        );
        for &id in holders {
            nodes.store(id, level, HEIGHT);
        }
    }

    fn retrieve(nodes: &NodeRegistry, tiers: &TierStore, seed: u8) -> Retrieval {
        let engine = RecoveryEngine::new(nodes, tiers, HEIGHT, PENALTY);
        engine.retrieve_block(100.0 * MB, &mut StdRng::from_seed([seed; 32]), &mut NoOpSink)
    }

    #[test]
    fn test_no_levels_is_unrecoverable() {
        let nodes = NodeRegistry::from_byzantine_flags(&[false; 3]);
        let tiers = empty_tiers();

        assert_eq!(retrieve(&nodes, &tiers, 1), Retrieval::Unrecoverable);
    }

    #[test]
    fn test_honest_level_zero_returns_immediately() {
        let mut nodes = NodeRegistry::from_byzantine_flags(&[false; 5]);
        let mut tiers = empty_tiers();
        add_level(&mut tiers, &mut nodes, 0, 3, MB, &[0, 1, 2, 3, 4]);
        add_level(&mut tiers, &mut nodes, 1, 2, MB, &[0, 1]);

        let latency = *tiers.latency_model();
        let expected = 3.0 * latency.fetch_and_verify(MB) + latency.reed_solomon(3.0 * MB);

        for seed in 0..8 {
            match retrieve(&nodes, &tiers, seed) {
                Retrieval::Recovered {
                    latency,
                    bandwidth,
                    level,
                } => {
                    assert_eq!(level, 0);
                    assert_eq!(bandwidth, 100.0 * MB);
                    assert!((latency - expected).abs() < 1e-9);
                }
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[test]
    fn test_insufficient_level_pays_penalty() {
        let mut nodes = NodeRegistry::from_byzantine_flags(&[false; 4]);
        let mut tiers = empty_tiers();
        // level 0 lost most holders, level 1 is intact
        add_level(&mut tiers, &mut nodes, 0, 3, MB, &[0, 1]);
        add_level(&mut tiers, &mut nodes, 1, 2, 2.0 * MB, &[0, 1, 2, 3]);

        let latency = *tiers.latency_model();
        let expected =
            PENALTY + 2.0 * latency.fetch_and_verify(2.0 * MB) + latency.reed_solomon(4.0 * MB);

        let result = retrieve(&nodes, &tiers, 2);
        assert_eq!(result.level_index(), 1);
        assert!((result.latency() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_cost_accumulates_across_failed_levels() {
        // nodes 0..3 byzantine, 3 and 4 honest
        let mut nodes = NodeRegistry::from_byzantine_flags(&[true, true, true, false, false]);
        let mut tiers = empty_tiers();
        // level 0: 5 providers but only 2 honest for k=3 -> every provider fetched
        add_level(&mut tiers, &mut nodes, 0, 3, MB, &[0, 1, 2, 3, 4]);
        // level 1: k=4 with 2 providers -> penalty
        add_level(&mut tiers, &mut nodes, 1, 4, MB, &[3, 4]);
        // level 2: both holders honest
        add_level(&mut tiers, &mut nodes, 2, 2, 0.5 * MB, &[3, 4]);

        let latency = *tiers.latency_model();
        let expected = 5.0 * latency.fetch_and_verify(MB)
            + PENALTY
            + 2.0 * latency.fetch_and_verify(0.5 * MB)
            + latency.reed_solomon(MB);

        for seed in 0..8 {
            let result = retrieve(&nodes, &tiers, seed);
            assert_eq!(result.level_index(), 2);
            assert!(
                (result.latency() - expected).abs() < 1e-9,
                "seed {}: {} != {}",
                seed,
                result.latency(),
                expected
            );
        }
    }

    #[test]
    fn test_byzantine_fetches_counted_before_success() {
        // one Byzantine among four, k=3: between 3 and 4 fetches depending on order
        let mut nodes = NodeRegistry::from_byzantine_flags(&[true, false, false, false]);
        let mut tiers = empty_tiers();
        add_level(&mut tiers, &mut nodes, 0, 3, MB, &[0, 1, 2, 3]);

        let latency = *tiers.latency_model();
        let fetch = latency.fetch_and_verify(MB);
        let decode = latency.reed_solomon(3.0 * MB);

        for seed in 0..16 {
            let result = retrieve(&nodes, &tiers, seed);
            assert_eq!(result.level_index(), 0);
            let fetches = ((result.latency() - decode) / fetch).round();
            assert!(fetches == 3.0 || fetches == 4.0, "fetches={}", fetches);
        }
    }

    #[test]
    fn test_inactive_holders_are_not_providers() {
        let mut nodes = NodeRegistry::from_byzantine_flags(&[false; 3]);
        let mut tiers = empty_tiers();
        add_level(&mut tiers, &mut nodes, 0, 3, MB, &[0, 1, 2]);
        nodes.deactivate(1);

        assert_eq!(retrieve(&nodes, &tiers, 3), Retrieval::Unrecoverable);
    }

    #[test]
    fn test_events_for_failed_and_successful_levels() {
        let mut nodes = NodeRegistry::from_byzantine_flags(&[true, false, false]);
        let mut tiers = empty_tiers();
        add_level(&mut tiers, &mut nodes, 0, 3, MB, &[0, 1, 2]);
        add_level(&mut tiers, &mut nodes, 1, 3, MB, &[1, 2]);
        add_level(&mut tiers, &mut nodes, 2, 2, MB, &[1, 2]);

        let mut sink = RecordingSink::default();
        let engine = RecoveryEngine::new(&nodes, &tiers, HEIGHT, PENALTY);
        let result = engine.retrieve_block(MB, &mut StdRng::from_seed([4; 32]), &mut sink);

        let events = sink.events.borrow();
        assert_eq!(
            events[0],
            Event::LevelByzantineFailure {
                level: 0,
                attempted: 3,
                valid: 2,
                k: 3,
            }
        );
        assert_eq!(
            events[1],
            Event::LevelInsufficient {
                level: 1,
                providers: 2,
                k: 3,
            }
        );
        assert_eq!(
            events[2],
            Event::BlockRecovered {
                level: 2,
                latency: result.latency(),
            }
        );
    }

    #[test]
    fn test_exhausted_levels_end_with_unrecoverable_event() {
        let mut nodes = NodeRegistry::from_byzantine_flags(&[true, true, false]);
        let mut tiers = empty_tiers();
        add_level(&mut tiers, &mut nodes, 0, 2, MB, &[0, 1, 2]);
        add_level(&mut tiers, &mut nodes, 1, 3, MB, &[2]);

        let mut sink = RecordingSink::default();
        let engine = RecoveryEngine::new(&nodes, &tiers, HEIGHT, PENALTY);
        let result = engine.retrieve_block(MB, &mut StdRng::from_seed([5; 32]), &mut sink);

        assert_eq!(result, Retrieval::Unrecoverable);
        let events = sink.events.borrow();
        assert_eq!(events.len(), 3);
        assert!(matches!(
            events[0],
            Event::LevelByzantineFailure { level: 0, valid: 1, k: 2, .. }
        ));
        assert!(matches!(events[1], Event::LevelInsufficient { level: 1, .. }));
        assert_eq!(events[2], Event::BlockUnrecoverable);
        assert!(!events
            .iter()
            .any(|e| matches!(e, Event::BlockRecovered { .. })));
    }

    #[test]
    fn test_honest_network_recovers_at_level_zero() {
        let mut network = Network::new(&ten_node_config(0.0), StdRng::from_seed([20; 32]));
        network.initial_block_distribution();

        for _ in 0..20 {
            let result = network.retrieve_block(100.0 * MB);
            assert_eq!(result.level_index(), 0);
            assert!(result.latency().is_finite());
        }
    }

    #[test]
    fn test_fully_byzantine_network_never_recovers() {
        let mut network = Network::new(&ten_node_config(1.0), StdRng::from_seed([21; 32]));
        network.initial_block_distribution();

        for round in 0..5 {
            for _ in 0..10 {
                let result = network.retrieve_block(100.0 * MB);
                assert_eq!(result.level_index(), -1);
                assert!(result.latency().is_infinite());
                assert_eq!(result.bandwidth(), 0.0);
            }
            network.handle_node_exit(round);
        }
    }

    #[test]
    fn test_churned_network_accumulates_penalties() {
        // honest network: every reachable level succeeds deterministically
        let mut network = Network::new(&ten_node_config(0.0), StdRng::from_seed([22; 32]));
        network.initial_block_distribution();
        for id in 0..7 {
            network.handle_node_exit(id);
        }

        let latency = *network.tiers().latency_model();
        let penalty = network.config().discovery_failure_penalty();
        let height = network.current_height();
        let mut expected = 0.0;
        let mut expected_level = None;
        for (level, tier) in network.tiers().iter() {
            if network.nodes().providers(level, height).len() < tier.k {
                expected += penalty;
                continue;
            }
            expected += tier.k as f64 * latency.fetch_and_verify(tier.fragment_size)
                + latency.reed_solomon(tier.k as f64 * tier.fragment_size);
            expected_level = Some(level);
            break;
        }

        let result = network.retrieve_block(100.0 * MB);
        let level = expected_level.expect("last level spans the survivors");
        assert_eq!(result.level_index(), level as i64);
        assert!((result.latency() - expected).abs() < 1e-9);
    }
}
