//! Reproducibility tracking: environment snapshots, seed derivation, parameter digests.

use crate::error::XdgError;
use crate::params::Parameters;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Snapshot of the launch environment, stored with every run record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentSnapshot {
    pub platform: String,
    pub system_info: String,
    pub device_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// Hash of the variables that change what the trainer sees
    /// (PATH, PYTHONPATH, CUDA_VISIBLE_DEVICES).
    pub env_vars_hash: String,
}

impl EnvironmentSnapshot {
    pub fn capture(device_id: Option<&str>) -> Self {
        Self {
            platform: std::env::consts::OS.to_string(),
            system_info: format!("{} {}", std::env::consts::OS, std::env::consts::ARCH),
            device_id: device_id.map(str::to_string),
            timestamp: Utc::now(),
            env_vars_hash: Self::compute_env_vars_hash(),
        }
    }

    fn compute_env_vars_hash() -> String {
        let mut hasher = Sha256::new();
        for var in &["PATH", "PYTHONPATH", "CUDA_VISIBLE_DEVICES"] {
            let value = std::env::var(var).unwrap_or_default();
            hasher.update(var.as_bytes());
            hasher.update(b"=");
            hasher.update(value.as_bytes());
            hasher.update(b"\n");
        }
        format!("{:x}", hasher.finalize())
    }
}

/// SHA-256 over the canonical JSON form of a parameter set.
pub fn parameters_digest(params: &Parameters) -> Result<String, XdgError> {
    let bytes = serde_json::to_vec(params)?;
    Ok(format!("{:x}", Sha256::digest(&bytes)))
}

/// Derives stable per-component seeds from one global seed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedManager {
    pub global_seed: u64,
    pub component_seeds: HashMap<String, u64>,
}

impl SeedManager {
    pub fn new(global_seed: u64) -> Self {
        Self {
            global_seed,
            component_seeds: HashMap::new(),
        }
    }

    pub fn get_seed(&mut self, component: &str) -> u64 {
        let global = self.global_seed;
        *self
            .component_seeds
            .entry(component.to_string())
            .or_insert_with(|| derive_seed(global, component))
    }
}

fn derive_seed(global: u64, component: &str) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(global.to_le_bytes());
    hasher.update(component.as_bytes());
    let digest = hasher.finalize();
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(head)
}
