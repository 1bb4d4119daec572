//! Partial parameter records and the field-wise merge.

use super::{GatingType, Parameters, Stabilization, TaskKind};
use crate::error::XdgError;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::PathBuf;

/// A partial [`Parameters`] record. Every `Some` field overrides the target;
/// `None` leaves it untouched.
///
/// Nullable target fields use a double option: `Some(None)` explicitly clears
/// the value (e.g. disables gating), `None` leaves it alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParameterUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stabilization: Option<Stabilization>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub learning_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<TaskKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save_analysis: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub train_convolutional_layers: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_tasks: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer_dims: Option<Vec<usize>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multihead: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drop_keep_pct: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_drop_keep_pct: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_train_batches: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub omega_c: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub omega_xi: Option<f64>,
    #[serde(
        default,
        rename = "EWC_fisher_num_batches",
        alias = "ewc_fisher_num_batches",
        skip_serializing_if = "Option::is_none"
    )]
    pub ewc_fisher_num_batches: Option<usize>,
    #[serde(
        default,
        deserialize_with = "explicit_null",
        skip_serializing_if = "Option::is_none"
    )]
    pub gating_type: Option<Option<GatingType>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gate_pct: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_subnetworks: Option<usize>,
    #[serde(
        default,
        deserialize_with = "explicit_null",
        skip_serializing_if = "Option::is_none"
    )]
    pub separability: Option<Option<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

/// A present key always yields `Some`, even when its value is `null`.
fn explicit_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

macro_rules! merge_fields {
    ($update:expr, $target:expr, $changed:ident; $($field:ident => $name:literal),+ $(,)?) => {
        $(
            if let Some(value) = &$update.$field {
                $target.$field = value.clone();
                $changed.push($name);
            }
        )+
    };
}

impl ParameterUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a loose key/value mapping. Unknown keys are rejected.
    pub fn from_json(value: serde_json::Value) -> Result<Self, XdgError> {
        serde_json::from_value(value).map_err(|e| XdgError::config(format!("bad update: {e}")))
    }

    /// True when the update would not touch any field.
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Overwrite every field present in this update; return the trainer names
    /// of the fields that were written.
    pub fn apply_to(&self, target: &mut Parameters) -> Vec<&'static str> {
        let mut changed = Vec::new();
        merge_fields!(self, target, changed;
            save_dir => "save_dir",
            stabilization => "stabilization",
            learning_rate => "learning_rate",
            task => "task",
            save_analysis => "save_analysis",
            train_convolutional_layers => "train_convolutional_layers",
            n_tasks => "n_tasks",
            layer_dims => "layer_dims",
            multihead => "multihead",
            drop_keep_pct => "drop_keep_pct",
            input_drop_keep_pct => "input_drop_keep_pct",
            batch_size => "batch_size",
            n_train_batches => "n_train_batches",
            omega_c => "omega_c",
            omega_xi => "omega_xi",
            ewc_fisher_num_batches => "EWC_fisher_num_batches",
            gating_type => "gating_type",
            gate_pct => "gate_pct",
            n_subnetworks => "n_subnetworks",
            separability => "separability",
            seed => "seed",
        );
        changed
    }

    pub fn save_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.save_dir = Some(dir.into());
        self
    }

    pub fn stabilization(mut self, method: Stabilization) -> Self {
        self.stabilization = Some(method);
        self
    }

    pub fn task(mut self, task: TaskKind) -> Self {
        self.task = Some(task);
        self
    }

    pub fn train_convolutional_layers(mut self, train: bool) -> Self {
        self.train_convolutional_layers = Some(train);
        self
    }

    pub fn n_tasks(mut self, n: usize) -> Self {
        self.n_tasks = Some(n);
        self
    }

    pub fn layer_dims(mut self, dims: &[usize]) -> Self {
        self.layer_dims = Some(dims.to_vec());
        self
    }

    pub fn multihead(mut self, multihead: bool) -> Self {
        self.multihead = Some(multihead);
        self
    }

    pub fn drop_keep_pct(mut self, pct: f64) -> Self {
        self.drop_keep_pct = Some(pct);
        self
    }

    pub fn input_drop_keep_pct(mut self, pct: f64) -> Self {
        self.input_drop_keep_pct = Some(pct);
        self
    }

    pub fn n_train_batches(mut self, n: usize) -> Self {
        self.n_train_batches = Some(n);
        self
    }

    pub fn omega_c(mut self, omega: f64) -> Self {
        self.omega_c = Some(omega);
        self
    }

    pub fn omega_xi(mut self, xi: f64) -> Self {
        self.omega_xi = Some(xi);
        self
    }

    pub fn gating_type(mut self, gating: Option<GatingType>) -> Self {
        self.gating_type = Some(gating);
        self
    }

    pub fn gate_pct(mut self, pct: f64) -> Self {
        self.gate_pct = Some(pct);
        self
    }

    pub fn separability(mut self, sep: f64) -> Self {
        self.separability = Some(Some(sep));
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}
