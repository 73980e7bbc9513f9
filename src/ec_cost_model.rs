//! Fragmentation parameter selection
//!
//! Picks the k minimising a weighted sum of storage cost and expected
//! retrieval latency, bounded so that k honest fragments survive f = (n-1)/3
//! Byzantine holders.

use crate::ec_config::SimConfig;
use crate::ec_interface::{Bytes, Seconds, MB};

/// Weights and network constants of the k cost function
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostModel {
    /// Storage weight (A)
    pub weight_a: f64,
    /// Latency weight (B)
    pub weight_b: f64,
    /// Per-connection round trip (R)
    pub connection_overhead: Seconds,
}

impl CostModel {
    pub fn from_config(config: &SimConfig) -> Self {
        Self {
            weight_a: config.weight_a,
            weight_b: config.weight_b,
            connection_overhead: config.connection_overhead_s,
        }
    }

    /// Largest k that tolerates f = floor((n-1)/3) Byzantine nodes: n - 2f
    pub fn max_safe_k(num_nodes: usize) -> usize {
        let f = num_nodes.saturating_sub(1) / 3;
        num_nodes - 2 * f
    }

    /// Weighted cost of splitting `data_size` into `k` fragments over `num_nodes`
    pub fn total_cost(&self, data_size: Bytes, bandwidth_bps: f64, num_nodes: usize, k: usize) -> f64 {
        let n = num_nodes as f64;
        let k = k as f64;
        let bytes_per_sec = bandwidth_bps / 8.0;

        // storage term in MB keeps both terms on a comparable scale
        let storage_cost = self.weight_a * n * (data_size / MB) / k;
        let latency_cost = self.weight_b
            * 1.5
            * (k - 1.0)
            * (self.connection_overhead + data_size / (bytes_per_sec * k));

        storage_cost + latency_cost
    }

    /// Cost-minimising k in [1, max_safe_k]; ties go to the smallest k
    pub fn optimal_k(&self, data_size: Bytes, bandwidth_bps: f64, num_nodes: usize) -> usize {
        let k_max = Self::max_safe_k(num_nodes);
        if k_max < 1 {
            return 1;
        }

        let mut best_k = 1;
        let mut best_cost = f64::INFINITY;
        for k in 1..=k_max {
            let cost = self.total_cost(data_size, bandwidth_bps, num_nodes, k);
            if cost < best_cost {
                best_cost = cost;
                best_k = k;
            }
        }

        best_k
    }
}

/// Closed-form latency formulas shared by distribution and recovery
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencyModel {
    pub bandwidth_bps: f64,
    pub connection_overhead: Seconds,
    pub rs_compute_time_per_mb: Seconds,
    pub hf_compute_time_per_mb: Seconds,
    pub hf_verify_fixed_time: Seconds,
    pub fingerprint_size: Bytes,
}

impl LatencyModel {
    pub fn from_config(config: &SimConfig) -> Self {
        Self {
            bandwidth_bps: config.bandwidth_bits_per_sec(),
            connection_overhead: config.connection_overhead_s,
            rs_compute_time_per_mb: config.rs_compute_time_per_mb,
            hf_compute_time_per_mb: config.hf_compute_time_per_mb,
            hf_verify_fixed_time: config.hf_verify_fixed_time,
            fingerprint_size: config.fingerprint_size_bytes,
        }
    }

    /// Wire time plus one connection setup
    pub fn transfer(&self, bytes: Bytes) -> Seconds {
        bytes * 8.0 / self.bandwidth_bps + self.connection_overhead
    }

    /// Pushing one fragment together with its fingerprint fragment
    pub fn fragment_upload(&self, fragment_size: Bytes) -> Seconds {
        self.transfer(fragment_size + self.fingerprint_size)
    }

    /// Reed-Solomon encode (or decode) time
    pub fn reed_solomon(&self, bytes: Bytes) -> Seconds {
        bytes / MB * self.rs_compute_time_per_mb
    }

    pub fn fingerprint(&self, bytes: Bytes) -> Seconds {
        bytes / MB * self.hf_compute_time_per_mb
    }

    /// Download one fragment, fingerprint it and verify against the voucher
    pub fn fetch_and_verify(&self, fragment_size: Bytes) -> Seconds {
        self.transfer(fragment_size) + self.fingerprint(fragment_size) + self.hf_verify_fixed_time
    }
}
