//! # xdgate-core - continual-learning experiment launcher
//!
//! Configures and launches sequential multi-task training runs that fight
//! catastrophic forgetting with synaptic stabilization (synaptic
//! intelligence, EWC) and context-dependent gating (XdG) of hidden units.
//!
//! The network and its training loop belong to an external Python trainer.
//! This crate owns everything around it:
//!
//! - a typed, validated parameter record and its store ([`params`]),
//! - per-task gating masks and other derived values ([`gating`]),
//! - the scenarios and the launcher that runs them ([`scenarios`]),
//! - trainers, the run wrapper and run records ([`training`]),
//! - the Python subprocess runtime ([`runtime`]) and launcher configuration
//!   ([`config`]).

pub mod config;
pub mod error;
pub mod gating;
pub mod params;
pub mod runtime;
pub mod scenarios;
pub mod training;

pub use config::{LauncherConfig, load_config};
pub use error::XdgError;
pub use params::{GatingType, ParameterStore, ParameterUpdate, Parameters, Stabilization, TaskKind};
pub use runtime::PythonRuntime;
pub use scenarios::{Launcher, NetworkVariant, Scenario, ScenarioPlan};
pub use training::{DryRunTrainer, Interrupts, PythonTrainer, RunOutcome, Trainer};
