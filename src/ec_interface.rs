// all sizes are tracked as f64 bytes since fragment size = data / k is not integral
pub type NodeId = usize;
pub type Level = u32;
pub type BlockHeight = u64;
pub type Bytes = f64;
pub type Seconds = f64;

/// Bytes per megabyte (binary)
pub const MB: f64 = 1024.0 * 1024.0;

/// Height assigned by the initial block distribution
pub const INITIAL_BLOCK_HEIGHT: BlockHeight = 1;

// ============================================================================
// Operation Results
// ============================================================================

/// Cost of encoding data and distributing it over a set of nodes
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Distribution {
    /// Total bytes stored across all target nodes (n * fragment size)
    pub storage_cost: Bytes,

    /// Time to ship one fragment plus its fingerprint
    pub transfer_latency: Seconds,

    /// Reed-Solomon encoding plus fingerprint generation time
    pub encode_latency: Seconds,

    /// Fragmentation parameter used (0 for a no-op distribution)
    pub k: usize,
}

impl Distribution {
    /// No-op distribution (no targets or k resolved to zero)
    pub const NONE: Distribution = Distribution {
        storage_cost: 0.0,
        transfer_latency: 0.0,
        encode_latency: 0.0,
        k: 0,
    };

    pub fn write_latency(&self) -> Seconds {
        self.encode_latency + self.transfer_latency
    }
}

/// Cost of a single node departure
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct ExitCost {
    pub repair_bandwidth: Bytes,
    pub latency: Seconds,
}

impl ExitCost {
    pub const NONE: ExitCost = ExitCost {
        repair_bandwidth: 0.0,
        latency: 0.0,
    };
}

/// Outcome of a block retrieval attempt
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Retrieval {
    /// Block rebuilt from `level`; `latency` includes every earlier failed level
    Recovered {
        latency: Seconds,
        bandwidth: Bytes,
        level: Level,
    },
    /// No level had enough honest fragments
    Unrecoverable,
}

impl Retrieval {
    pub fn is_recovered(&self) -> bool {
        matches!(self, Retrieval::Recovered { .. })
    }

    /// Total latency; infinite when unrecoverable
    pub fn latency(&self) -> Seconds {
        match self {
            Retrieval::Recovered { latency, .. } => *latency,
            Retrieval::Unrecoverable => f64::INFINITY,
        }
    }

    pub fn bandwidth(&self) -> Bytes {
        match self {
            Retrieval::Recovered { bandwidth, .. } => *bandwidth,
            Retrieval::Unrecoverable => 0.0,
        }
    }

    /// Level index with -1 standing for unrecoverable
    pub fn level_index(&self) -> i64 {
        match self {
            Retrieval::Recovered { level, .. } => *level as i64,
            Retrieval::Unrecoverable => -1,
        }
    }
}

// ============================================================================
// Event Logging System
// ============================================================================

/// Events emitted by a simulation run for debugging and analysis
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Data encoded and spread over `nodes` targets at `level`
    BlockDistributed {
        level: Level,
        data_size: Bytes,
        nodes: usize,
        k: usize,
    },
    /// Node switched to inactive
    NodeExited {
        node: NodeId,
        reencode_bytes: Bytes,
    },
    /// Repair created a new level
    LevelCreated {
        level: Level,
        data_size: Bytes,
    },
    /// Too few live providers to attempt the level
    LevelInsufficient {
        level: Level,
        providers: usize,
        k: usize,
    },
    /// Enough providers but too many Byzantine responses
    LevelByzantineFailure {
        level: Level,
        attempted: usize,
        valid: usize,
        k: usize,
    },
    BlockRecovered {
        level: Level,
        latency: Seconds,
    },
    BlockUnrecoverable,
}

/// Trait for consuming events from a simulation run
pub trait EventSink {
    fn log(&mut self, height: BlockHeight, event: Event);
}

/// No-op event sink (zero overhead)
pub struct NoOpSink;

impl EventSink for NoOpSink {
    #[inline(always)]
    fn log(&mut self, _height: BlockHeight, _event: Event) {}
}

/// Forwards every event to the `log` facade at debug level
pub struct LogSink;

impl EventSink for LogSink {
    fn log(&mut self, height: BlockHeight, event: Event) {
        log::debug!("h{} {:?}", height, event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unrecoverable_sentinel() {
        let r = Retrieval::Unrecoverable;

        assert!(!r.is_recovered());
        assert!(r.latency().is_infinite());
        assert_eq!(r.bandwidth(), 0.0);
        assert_eq!(r.level_index(), -1);
    }

    #[test]
    fn test_recovered_accessors() {
        let r = Retrieval::Recovered {
            latency: 1.5,
            bandwidth: 100.0,
            level: 3,
        };

        assert!(r.is_recovered());
        assert_eq!(r.latency(), 1.5);
        assert_eq!(r.bandwidth(), 100.0);
        assert_eq!(r.level_index(), 3);
    }

    #[test]
    fn test_write_latency_sums_encode_and_transfer() {
        let d = Distribution {
            storage_cost: 10.0,
            transfer_latency: 0.25,
            encode_latency: 0.5,
            k: 2,
        };
        assert_eq!(d.write_latency(), 0.75);
        assert_eq!(Distribution::NONE.write_latency(), 0.0);
    }
}
