//! Context-dependent gating masks and other values derived from [`Parameters`].
//!
//! Each task gets one mask per hidden layer. A `0.0` entry silences that unit
//! for the task, `1.0` lets it through.
//!
//! - `XdG`: a seeded random subset of `round(gate_pct * width)` units is
//!   silenced per task and layer.
//! - `split`: units are cut into `n_subnetworks` contiguous blocks and task
//!   `t` keeps only block `t % n_subnetworks`.
//! - ungated: every unit stays active.

use crate::error::XdgError;
use crate::params::{GatingType, Parameters};
use crate::training::reproducibility::SeedManager;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

/// Masks for one task: `layers[l][unit]`.
pub type TaskMask = Vec<Vec<f32>>;

/// Values the trainer expects alongside the raw parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedParameters {
    pub n_layers: usize,
    pub n_hidden: Vec<usize>,
    /// `gating[task][layer][unit]`.
    pub gating: Vec<TaskMask>,
}

impl DerivedParameters {
    pub fn from_parameters(params: &Parameters) -> Self {
        Self {
            n_layers: params.layer_dims.len(),
            n_hidden: params.hidden_dims().to_vec(),
            gating: gating_masks(params),
        }
    }
}

/// Build the per-task masks for the configured gating scheme.
pub fn gating_masks(params: &Parameters) -> Vec<TaskMask> {
    let hidden = params.hidden_dims();
    match params.gating_type {
        None => (0..params.n_tasks)
            .map(|_| hidden.iter().map(|&w| vec![1.0; w]).collect())
            .collect(),
        Some(GatingType::Xdg) => {
            let mut seeds = SeedManager::new(params.seed);
            (0..params.n_tasks)
                .map(|task| {
                    let mut rng = StdRng::seed_from_u64(seeds.get_seed(&format!("xdg/{task}")));
                    hidden
                        .iter()
                        .map(|&w| xdg_layer_mask(w, params.gate_pct, &mut rng))
                        .collect()
                })
                .collect()
        }
        Some(GatingType::Split) => (0..params.n_tasks)
            .map(|task| {
                hidden
                    .iter()
                    .map(|&w| split_layer_mask(w, params.n_subnetworks, task))
                    .collect()
            })
            .collect(),
    }
}

fn xdg_layer_mask(width: usize, gate_pct: f64, rng: &mut StdRng) -> Vec<f32> {
    let silenced = (gate_pct * width as f64).round() as usize;
    let mut order: Vec<usize> = (0..width).collect();
    order.shuffle(rng);

    let mut mask = vec![1.0; width];
    for &unit in order.iter().take(silenced) {
        mask[unit] = 0.0;
    }
    mask
}

fn split_layer_mask(width: usize, n_subnetworks: usize, task: usize) -> Vec<f32> {
    let block = task % n_subnetworks;
    // Last block absorbs the remainder.
    let size = width / n_subnetworks;
    let start = block * size;
    let end = if block + 1 == n_subnetworks {
        width
    } else {
        start + size
    };
    (0..width)
        .map(|unit| if (start..end).contains(&unit) { 1.0 } else { 0.0 })
        .collect()
}

/// Parameters plus derived values as one JSON object, as the trainer reads them.
pub fn trainer_payload(params: &Parameters) -> Result<serde_json::Value, XdgError> {
    let mut payload = serde_json::to_value(params)?;
    let derived = serde_json::to_value(DerivedParameters::from_parameters(params))?;

    match (payload.as_object_mut(), derived) {
        (Some(target), serde_json::Value::Object(extra)) => {
            target.extend(extra);
            Ok(payload)
        }
        _ => Err(XdgError::config("parameters did not serialize to an object")),
    }
}
