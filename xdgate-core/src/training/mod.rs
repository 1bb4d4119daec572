//! Training orchestration: trainers, the run wrapper, run records, sweeps.

pub mod experiment;
pub mod reproducibility;
pub mod runner;
pub mod sweep;
pub mod trainer;

pub use experiment::{RunLedger, RunRecord, RunStatus};
pub use runner::{Interrupts, RunOutcome, try_model};
pub use sweep::Linspace;
pub use trainer::{DryRunTrainer, PythonTrainer, Trainer};
