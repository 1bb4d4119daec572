//! Training parameters: the typed record consumed by the external trainer.
//!
//! [`Parameters`] carries every field the trainer reads, with the built-in
//! defaults present at process start. [`ParameterUpdate`] is a partial record
//! merged field-by-field into a [`ParameterStore`]. Named update sets for each
//! dataset and network variant live in [`sets`].

pub mod sets;
pub mod store;
pub mod update;

pub use store::ParameterStore;
pub use update::ParameterUpdate;

use crate::error::XdgError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Synaptic stabilization method applied between tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stabilization {
    /// Synaptic intelligence (path-integral importance).
    #[serde(rename = "pathint")]
    PathInt,
    /// Elastic weight consolidation.
    #[serde(rename = "EWC")]
    Ewc,
}

impl fmt::Display for Stabilization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PathInt => write!(f, "pathint"),
            Self::Ewc => write!(f, "EWC"),
        }
    }
}

/// Context-dependent gating scheme for hidden units.
///
/// Absence of gating is expressed as `None` on [`Parameters::gating_type`],
/// which the trainer receives as `null`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GatingType {
    #[serde(rename = "XdG")]
    Xdg,
    #[serde(rename = "split")]
    Split,
}

impl fmt::Display for GatingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Xdg => write!(f, "XdG"),
            Self::Split => write!(f, "split"),
        }
    }
}

/// Dataset family the trainer builds its task sequence from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Mnist,
    ColoredMnist,
    Cifar,
    Imagenet,
}

/// Full parameter set handed to the trainer for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameters {
    pub save_dir: PathBuf,
    pub stabilization: Stabilization,
    pub learning_rate: f64,
    pub task: TaskKind,
    pub save_analysis: bool,
    pub train_convolutional_layers: bool,

    pub n_tasks: usize,
    pub layer_dims: Vec<usize>,
    pub multihead: bool,

    pub drop_keep_pct: f64,
    pub input_drop_keep_pct: f64,

    pub batch_size: usize,
    pub n_train_batches: usize,

    pub omega_c: f64,
    pub omega_xi: f64,
    #[serde(rename = "EWC_fisher_num_batches")]
    pub ewc_fisher_num_batches: usize,

    pub gating_type: Option<GatingType>,
    pub gate_pct: f64,
    pub n_subnetworks: usize,

    /// Color/shape separability of the colored-MNIST task, in `[0, 1]`.
    pub separability: Option<f64>,

    /// Seed for gating masks and any other launcher-side randomness.
    pub seed: u64,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            save_dir: PathBuf::from("./savedir/"),
            stabilization: Stabilization::PathInt,
            learning_rate: 0.001,
            task: TaskKind::Mnist,
            save_analysis: true,
            train_convolutional_layers: false,
            n_tasks: 100,
            layer_dims: vec![784, 2000, 2000, 10],
            multihead: false,
            drop_keep_pct: 0.5,
            input_drop_keep_pct: 1.0,
            batch_size: 256,
            n_train_batches: 3906,
            omega_c: 0.1,
            omega_xi: 0.01,
            ewc_fisher_num_batches: 16,
            gating_type: Some(GatingType::Xdg),
            gate_pct: 0.8,
            n_subnetworks: 4,
            separability: None,
            seed: 42,
        }
    }
}

impl Parameters {
    /// Check every field against the trainer's expectations.
    pub fn validate(&self) -> Result<(), XdgError> {
        if self.layer_dims.len() < 2 {
            return Err(XdgError::invalid(
                "layer_dims",
                format!(
                    "needs an input and an output width, got {} entries",
                    self.layer_dims.len()
                ),
            ));
        }
        if let Some(pos) = self.layer_dims.iter().position(|&d| d == 0) {
            return Err(XdgError::invalid(
                "layer_dims",
                format!("layer {pos} has zero width"),
            ));
        }

        check_probability("drop_keep_pct", self.drop_keep_pct)?;
        check_probability("input_drop_keep_pct", self.input_drop_keep_pct)?;
        check_probability("gate_pct", self.gate_pct)?;
        if let Some(sep) = self.separability {
            check_probability("separability", sep)?;
        }

        check_nonzero("n_tasks", self.n_tasks)?;
        check_nonzero("batch_size", self.batch_size)?;
        check_nonzero("n_train_batches", self.n_train_batches)?;
        check_nonzero("n_subnetworks", self.n_subnetworks)?;
        check_nonzero("EWC_fisher_num_batches", self.ewc_fisher_num_batches)?;

        check_non_negative("omega_c", self.omega_c)?;
        check_non_negative("omega_xi", self.omega_xi)?;
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(XdgError::invalid(
                "learning_rate",
                format!("must be positive, got {}", self.learning_rate),
            ));
        }

        if self.gating_type == Some(GatingType::Split) {
            let narrowest = self.hidden_dims().iter().copied().min().unwrap_or(0);
            if narrowest != 0 && narrowest < self.n_subnetworks {
                return Err(XdgError::invalid(
                    "n_subnetworks",
                    format!(
                        "{} subnetworks do not fit a hidden layer of width {narrowest}",
                        self.n_subnetworks
                    ),
                ));
            }
        }

        Ok(())
    }

    /// Widths of the hidden layers (everything between input and output).
    pub fn hidden_dims(&self) -> &[usize] {
        let n = self.layer_dims.len();
        self.layer_dims.get(1..n.saturating_sub(1)).unwrap_or(&[])
    }
}

fn check_probability(field: &'static str, value: f64) -> Result<(), XdgError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(XdgError::invalid(
            field,
            format!("must be within [0, 1], got {value}"),
        ))
    }
}

fn check_nonzero(field: &'static str, value: usize) -> Result<(), XdgError> {
    if value == 0 {
        Err(XdgError::invalid(field, "must be greater than zero"))
    } else {
        Ok(())
    }
}

fn check_non_negative(field: &'static str, value: f64) -> Result<(), XdgError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(XdgError::invalid(
            field,
            format!("must be finite and non-negative, got {value}"),
        ))
    }
}
