//! Simulation parameter bundle
//!
//! Every constant the engine consumes lives in [`SimConfig`]. Configs are
//! usually loaded from YAML; missing fields fall back to the defaults below.

use std::fs;
use std::path::Path;

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use thiserror::Error;

use crate::ec_interface::{Bytes, Seconds, MB};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Configuration for a BFT erasure-coding churn simulation
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Number of storage nodes created per run
    pub num_nodes: usize,

    /// Probability (0.0 to 1.0) that a node is Byzantine
    pub byzantine_fraction: f64,

    /// Size of the block being stored
    pub block_size_mb: f64,

    /// Independent full simulation runs averaged in the report
    pub simulation_runs: usize,

    /// Retrievals per measurement point
    pub recovery_repetitions: usize,

    /// Fraction of the initial nodes leaving per churn step
    pub exit_percentage_step: f64,

    /// Stop once this fraction of the initial nodes has left
    pub max_exit_percentage: f64,

    /// Link speed
    pub network_speed_gbps: f64,

    /// Per-connection round trip (R); also the discovery-failure penalty
    pub connection_overhead_s: Seconds,

    /// Reed-Solomon encode/decode time per MB
    pub rs_compute_time_per_mb: Seconds,

    /// Homomorphic fingerprint computation time per MB
    pub hf_compute_time_per_mb: Seconds,

    /// Fixed time to verify a fingerprint
    pub hf_verify_fixed_time: Seconds,

    /// Fingerprint fragment shipped with every data fragment
    pub fingerprint_size_bytes: Bytes,

    /// Per-fragment metadata kept on a node
    pub piece_metadata_size_bytes: Bytes,

    /// Storage weight in the k cost function
    pub weight_a: f64,

    /// Latency weight in the k cost function
    pub weight_b: f64,

    /// Hex encoded 32 byte seed (None = generate random)
    pub seed: Option<String>,

    /// Finite stand-in for unrecoverable latency in reports (None = infinity)
    pub unrecoverable_latency: Option<Seconds>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            num_nodes: 100,
            byzantine_fraction: 0.1,
            block_size_mb: 100.0,
            simulation_runs: 10,
            recovery_repetitions: 100,
            exit_percentage_step: 0.1,
            max_exit_percentage: 0.5,
            network_speed_gbps: 1.0,
            connection_overhead_s: 0.05,
            rs_compute_time_per_mb: 0.01,
            hf_compute_time_per_mb: 0.005,
            hf_verify_fixed_time: 0.001,
            fingerprint_size_bytes: 1024.0,
            piece_metadata_size_bytes: 256.0,
            weight_a: 1.0,
            weight_b: 1.0,
            seed: None,
            unrecoverable_latency: None,
        }
    }
}

impl SimConfig {
    /// Parse and validate a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: SimConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(field: &'static str, reason: &str) -> Result<(), ConfigError> {
            Err(ConfigError::Invalid {
                field,
                reason: reason.to_string(),
            })
        }

        if self.num_nodes < 1 {
            return invalid("num_nodes", "must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.byzantine_fraction) {
            return invalid("byzantine_fraction", "must be within [0, 1]");
        }
        if !(self.block_size_mb > 0.0) {
            return invalid("block_size_mb", "must be positive");
        }
        if self.simulation_runs < 1 {
            return invalid("simulation_runs", "must be at least 1");
        }
        if self.recovery_repetitions < 1 {
            return invalid("recovery_repetitions", "must be at least 1");
        }
        if !(self.exit_percentage_step > 0.0 && self.exit_percentage_step <= 1.0) {
            return invalid("exit_percentage_step", "must be within (0, 1]");
        }
        if !(0.0..=1.0).contains(&self.max_exit_percentage) {
            return invalid("max_exit_percentage", "must be within [0, 1]");
        }
        if !(self.network_speed_gbps > 0.0) {
            return invalid("network_speed_gbps", "must be positive");
        }

        let non_negative = [
            ("connection_overhead_s", self.connection_overhead_s),
            ("rs_compute_time_per_mb", self.rs_compute_time_per_mb),
            ("hf_compute_time_per_mb", self.hf_compute_time_per_mb),
            ("hf_verify_fixed_time", self.hf_verify_fixed_time),
            ("fingerprint_size_bytes", self.fingerprint_size_bytes),
            ("piece_metadata_size_bytes", self.piece_metadata_size_bytes),
            ("weight_a", self.weight_a),
            ("weight_b", self.weight_b),
        ];
        for (field, value) in non_negative {
            if !(value >= 0.0) {
                return invalid(field, "must not be negative");
            }
        }

        if let Some(seed) = &self.seed {
            parse_seed_hex(seed)?;
        }
        Ok(())
    }

    pub fn block_size_bytes(&self) -> Bytes {
        self.block_size_mb * MB
    }

    pub fn bandwidth_bits_per_sec(&self) -> f64 {
        self.network_speed_gbps * 1e9
    }

    /// Latency charged when a level has too few live providers (one round trip)
    pub fn discovery_failure_penalty(&self) -> Seconds {
        self.connection_overhead_s
    }

    /// Resolve the seed once and store it, so every later run replays it
    pub fn pin_seed(&mut self) -> Result<[u8; 32], ConfigError> {
        let seed = self.resolve_seed()?;
        self.seed = Some(format!("0x{}", seed_to_hex(&seed)));
        Ok(seed)
    }

    /// Get or generate seed
    pub fn resolve_seed(&self) -> Result<[u8; 32], ConfigError> {
        match &self.seed {
            Some(hex) => parse_seed_hex(hex),
            None => {
                let mut seed = [0u8; 32];
                StdRng::from_entropy().fill_bytes(&mut seed);
                Ok(seed)
            }
        }
    }
}

/// Parse up to 32 bytes of hex (optional 0x prefix); shorter input is zero padded
pub fn parse_seed_hex(hex: &str) -> Result<[u8; 32], ConfigError> {
    let hex = hex.strip_prefix("0x").unwrap_or(hex);
    let mut seed = [0u8; 32];

    if hex.len() > 64 || hex.len() % 2 != 0 {
        return Err(ConfigError::Invalid {
            field: "seed",
            reason: format!("expected an even number of hex digits up to 64, got {}", hex.len()),
        });
    }

    for (i, chunk) in hex.as_bytes().chunks(2).enumerate() {
        let byte = std::str::from_utf8(chunk)
            .ok()
            .and_then(|s| u8::from_str_radix(s, 16).ok())
            .ok_or_else(|| ConfigError::Invalid {
                field: "seed",
                reason: format!("bad hex digits at offset {}", i * 2),
            })?;
        seed[i] = byte;
    }

    Ok(seed)
}

pub fn seed_to_hex(seed: &[u8; 32]) -> String {
    seed.iter().map(|b| format!("{:02x}", b)).collect()
}
