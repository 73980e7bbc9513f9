// Node Registry
//
// Per-node status, Byzantine flag and sparse level -> block height storage map,
// plus a level -> holders index so providers are found without scanning all nodes.

use std::collections::BTreeMap;

use indexmap::IndexSet;
use rand::Rng;

use crate::ec_interface::{BlockHeight, Level, NodeId};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeStatus {
    Active,
    Inactive,
}

/// A storage node in the simulated network
#[derive(Debug, Clone)]
pub struct StorageNode {
    id: NodeId,
    status: NodeStatus,
    byzantine: bool,
    // level -> block height last stored
    storage: BTreeMap<Level, BlockHeight>,
}

impl StorageNode {
    fn new(id: NodeId, byzantine: bool) -> Self {
        Self {
            id,
            status: NodeStatus::Active,
            byzantine,
            storage: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn status(&self) -> NodeStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status == NodeStatus::Active
    }

    pub fn is_byzantine(&self) -> bool {
        self.byzantine
    }

    pub fn stored_height(&self, level: Level) -> Option<BlockHeight> {
        self.storage.get(&level).copied()
    }

    /// Levels held at exactly `height`, ascending
    pub fn levels_at(&self, height: BlockHeight) -> impl Iterator<Item = Level> + '_ {
        self.storage
            .iter()
            .filter(move |&(_, &h)| h == height)
            .map(|(&level, _)| level)
    }
}

/// All nodes of one simulation run
#[derive(Debug, Clone, Default)]
pub struct NodeRegistry {
    nodes: Vec<StorageNode>,
    // active nodes holding each level, in storage order
    holders: BTreeMap<Level, IndexSet<NodeId>>,
}

impl NodeRegistry {
    /// Create `num_nodes` active nodes, each Byzantine with probability `byzantine_fraction`
    pub fn new<R: Rng>(num_nodes: usize, byzantine_fraction: f64, rng: &mut R) -> Self {
        let flags: Vec<bool> = (0..num_nodes)
            .map(|_| rng.gen::<f64>() < byzantine_fraction)
            .collect();
        Self::from_byzantine_flags(&flags)
    }

    /// Create one active node per flag; node ids are the flag indices
    pub fn from_byzantine_flags(flags: &[bool]) -> Self {
        Self {
            nodes: flags
                .iter()
                .enumerate()
                .map(|(id, &byzantine)| StorageNode::new(id, byzantine))
                .collect(),
            holders: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: NodeId) -> Option<&StorageNode> {
        self.nodes.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StorageNode> {
        self.nodes.iter()
    }

    pub fn active_ids(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|n| n.is_active())
            .map(|n| n.id)
            .collect()
    }

    pub fn active_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_active()).count()
    }

    pub fn byzantine_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.byzantine).count()
    }

    /// Record that `id` stores `level` at `height` (overwrites any earlier height)
    pub fn store(&mut self, id: NodeId, level: Level, height: BlockHeight) {
        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };
        node.storage.insert(level, height);
        if node.is_active() {
            self.holders.entry(level).or_default().insert(id);
        }
    }

    /// Flip `id` to inactive. Returns false if it was already inactive (or unknown).
    pub fn deactivate(&mut self, id: NodeId) -> bool {
        let Some(node) = self.nodes.get_mut(id) else {
            return false;
        };
        if node.status == NodeStatus::Inactive {
            return false;
        }
        node.status = NodeStatus::Inactive;

        for level in node.storage.keys() {
            if let Some(set) = self.holders.get_mut(level) {
                set.shift_remove(&id);
            }
        }
        true
    }

    /// Active nodes whose stored height for `level` equals `height`
    pub fn providers(&self, level: Level, height: BlockHeight) -> Vec<NodeId> {
        let Some(set) = self.holders.get(&level) else {
            return Vec::new();
        };
        set.iter()
            .copied()
            .filter(|&id| self.nodes[id].stored_height(level) == Some(height))
            .collect()
    }
}
