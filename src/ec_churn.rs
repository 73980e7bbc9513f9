// Churn Controller
//
// A departing node takes its current-height fragments with it. Their total is
// re-encoded as a fresh level over the nodes still active.

use log::debug;

use crate::ec_interface::{Bytes, Event, ExitCost, NodeId};
use crate::ec_network::Network;

impl Network {
    /// Remove `node_id` from the network and repair the data it held.
    ///
    /// Exiting an inactive node is a no-op. Levels the node stored at an older
    /// block height are stale and do not count toward the repair.
    pub fn handle_node_exit(&mut self, node_id: NodeId) -> ExitCost {
        if !self.nodes.deactivate(node_id) {
            return ExitCost::NONE;
        }

        let height = self.current_height;
        let reencode_bytes: Bytes = match self.nodes.get(node_id) {
            Some(node) => node
                .levels_at(height)
                .filter_map(|level| self.tiers.get(level))
                .map(|tier| tier.fragment_size)
                .sum(),
            None => 0.0,
        };

        self.sink.log(
            height,
            Event::NodeExited {
                node: node_id,
                reencode_bytes,
            },
        );

        if reencode_bytes == 0.0 {
            return ExitCost::NONE;
        }

        let level = self.tiers.next_level();
        let targets = self.nodes.active_ids();
        let distribution = self.tiers.distribute_and_encode(
            &mut self.nodes,
            reencode_bytes,
            &targets,
            level,
            height,
            &mut self.rng,
        );

        self.total_storage_overhead += distribution.storage_cost;
        self.total_repair_bandwidth += reencode_bytes;

        // no active nodes left: the data is lost, no level is recorded
        if distribution.k > 0 {
            self.sink.log(
                height,
                Event::LevelCreated {
                    level,
                    data_size: reencode_bytes,
                },
            );
            debug!(
                "node {} exited: re-encoding {:.0} bytes as level {} over {} nodes (k={})",
                node_id,
                reencode_bytes,
                level,
                targets.len(),
                distribution.k
            );
        } else {
            debug!(
                "node {} exited: {:.0} bytes lost, no active nodes to re-encode onto",
                node_id, reencode_bytes
            );
        }

        ExitCost {
            repair_bandwidth: reencode_bytes,
            latency: distribution.write_latency(),
        }
    }
}
