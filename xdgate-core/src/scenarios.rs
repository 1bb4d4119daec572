//! Experiment scenarios and the launcher that executes them.
//!
//! A scenario is a fixed plan: for every run, an ordered list of parameter
//! updates (dataset, network variant, gating, stabilization, extras) and an
//! output file name. The [`Launcher`] merges each run's updates into its
//! [`ParameterStore`] and hands the result to the trainer. Runs execute one at
//! a time; the first error aborts the rest of the plan.

use crate::config::LauncherConfig;
use crate::error::XdgError;
use crate::params::{GatingType, ParameterStore, ParameterUpdate, Stabilization, sets};
use crate::training::experiment::{RunLedger, RunRecord, RunStatus};
use crate::training::reproducibility::{EnvironmentSnapshot, parameters_digest};
use crate::training::runner::{Interrupts, RunOutcome, try_model};
use crate::training::sweep::{Linspace, float_literal};
use crate::training::trainer::Trainer;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info};

/// Number of separability points in the colored-MNIST sweep.
pub const SEPARABILITY_POINTS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scenario {
    /// 100 permuted-MNIST tasks, SI + XdG.
    Mnist,
    /// Separability sweep over colored MNIST, SI without gating.
    ColoredMnist,
    /// 100 ImageNet splits, SI + XdG.
    Imagenet,
    /// 20 CIFAR splits, SI + XdG.
    Cifar,
}

impl Scenario {
    pub const ALL: [Scenario; 4] = [
        Scenario::Mnist,
        Scenario::ColoredMnist,
        Scenario::Imagenet,
        Scenario::Cifar,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mnist => "mnist",
            Self::ColoredMnist => "colored-mnist",
            Self::Imagenet => "imagenet",
            Self::Cifar => "cifar",
        }
    }

    /// Build the run plan for this scenario and network variant.
    pub fn plan(self, variant: NetworkVariant) -> Result<ScenarioPlan, XdgError> {
        let variant_update = variant.update_for(self)?;
        let suffix = variant.file_suffix();

        let runs = match self {
            Self::Mnist => vec![PlannedRun::single(
                compose(
                    sets::mnist(),
                    (variant, variant_update),
                    sets::gating(Some(GatingType::Xdg), 0.8, 0.8),
                    sets::stabilization(Stabilization::PathInt, 0.035, 0.01),
                    None,
                ),
                format!("mnist_SI_XdG{suffix}.pkl"),
            )],
            Self::Imagenet => vec![PlannedRun::single(
                compose(
                    sets::imagenet(),
                    (variant, variant_update),
                    sets::gating(Some(GatingType::Xdg), 0.80, 1.0),
                    sets::stabilization(Stabilization::PathInt, 0.75, 0.01),
                    Some(sets::train_conv_layers(true)),
                ),
                format!("imagenet_SI_XdG{suffix}.pkl"),
            )],
            Self::Cifar => vec![PlannedRun::single(
                compose(
                    sets::cifar(),
                    (variant, variant_update),
                    sets::gating(Some(GatingType::Xdg), 0.8, 1.0),
                    sets::stabilization(Stabilization::PathInt, 0.035, 0.01),
                    Some(sets::train_conv_layers(true)),
                ),
                format!("cifar_SI_XdG{suffix}.pkl"),
            )],
            Self::ColoredMnist => Linspace::new(0.0, 1.0, SEPARABILITY_POINTS)
                .values()
                .into_iter()
                .map(|sep| {
                    let literal = float_literal(sep);
                    let mut updates = compose(
                        sets::colored_mnist(),
                        (variant, variant_update.clone()),
                        sets::gating(None, 0.8, 0.8),
                        sets::stabilization(Stabilization::PathInt, 0.035, 0.01),
                        Some(sets::train_conv_layers(true)),
                    );
                    updates.push(sets::separability(sep));
                    PlannedRun {
                        label: Some(format!("Separability: {literal}")),
                        updates,
                        save_name: format!("mnist_colorized_{literal}.pkl"),
                    }
                })
                .collect(),
        };

        Ok(ScenarioPlan {
            scenario: self,
            banner: self.banner().to_string(),
            runs,
        })
    }

    fn banner(&self) -> &'static str {
        match self {
            Self::Mnist => "MNIST - Synaptic Stabilization = SI - Gating = 80%",
            Self::ColoredMnist => "Colored MNIST - Synaptic Stabilization = SI - Gating = 80%",
            Self::Imagenet => "ImageNet - Synaptic Stabilization = SI - Gating = 80%",
            Self::Cifar => "CIFAR - Synaptic Stabilization = SI - Gating = 80%",
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scenario {
    type Err = XdgError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|sc| sc.as_str() == s)
            .ok_or_else(|| XdgError::config(format!("unknown scenario '{s}'")))
    }
}

/// Network shape applied on top of a dataset's defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NetworkVariant {
    #[default]
    Standard,
    /// One output head per task (CIFAR and ImageNet).
    Multihead,
    /// Hidden layers widened and divided into fixed subnetworks.
    Split,
}

impl NetworkVariant {
    fn update_for(self, scenario: Scenario) -> Result<Option<ParameterUpdate>, XdgError> {
        let update = match (self, scenario) {
            (Self::Standard, _) => return Ok(None),
            (Self::Multihead, Scenario::Cifar) => sets::multihead(),
            (Self::Multihead, Scenario::Imagenet) => sets::imagenet_multihead(),
            (Self::Split, Scenario::Mnist) => sets::mnist_split(),
            (Self::Split, Scenario::Cifar) => sets::cifar_split(),
            (Self::Split, Scenario::Imagenet) => sets::imagenet_split(),
            (variant, scenario) => {
                return Err(XdgError::unsupported(format!(
                    "{variant} network is not defined for {scenario}"
                )));
            }
        };
        Ok(Some(update))
    }

    fn file_suffix(self) -> &'static str {
        match self {
            Self::Standard => "",
            Self::Multihead => "_multihead",
            Self::Split => "_split",
        }
    }
}

impl fmt::Display for NetworkVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Standard => write!(f, "standard"),
            Self::Multihead => write!(f, "multihead"),
            Self::Split => write!(f, "split"),
        }
    }
}

impl FromStr for NetworkVariant {
    type Err = XdgError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard" => Ok(Self::Standard),
            "multihead" => Ok(Self::Multihead),
            "split" => Ok(Self::Split),
            other => Err(XdgError::config(format!("unknown network variant '{other}'"))),
        }
    }
}

/// Dataset, variant, gating, stabilization, extras. A split network swaps the
/// scenario's gating scheme for split gating.
fn compose(
    dataset: ParameterUpdate,
    variant: (NetworkVariant, Option<ParameterUpdate>),
    gating: ParameterUpdate,
    stabilization: ParameterUpdate,
    extras: Option<ParameterUpdate>,
) -> Vec<ParameterUpdate> {
    let (variant, variant_update) = variant;

    let mut updates = vec![dataset];
    updates.extend(variant_update);
    updates.push(if variant == NetworkVariant::Split {
        gating.gating_type(Some(GatingType::Split))
    } else {
        gating
    });
    updates.push(stabilization);
    updates.extend(extras);
    updates
}

/// One trainer invocation within a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedRun {
    /// Progress line printed before the run.
    pub label: Option<String>,
    pub updates: Vec<ParameterUpdate>,
    pub save_name: String,
}

impl PlannedRun {
    fn single(updates: Vec<ParameterUpdate>, save_name: String) -> Self {
        Self {
            label: None,
            updates,
            save_name,
        }
    }
}

/// Everything a scenario will do, computed before anything runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioPlan {
    pub scenario: Scenario,
    pub banner: String,
    pub runs: Vec<PlannedRun>,
}

/// Executes scenario plans against one parameter store.
pub struct Launcher {
    trainer: Arc<dyn Trainer>,
    store: ParameterStore,
    device_id: Option<String>,
    interrupts: Interrupts,
    save_dir_override: Option<ParameterUpdate>,
    ledger: bool,
}

impl Launcher {
    pub fn new(trainer: Arc<dyn Trainer>, device_id: Option<String>) -> Self {
        Self {
            trainer,
            store: ParameterStore::new(),
            device_id,
            interrupts: Interrupts::new(),
            save_dir_override: None,
            ledger: false,
        }
    }

    /// Launcher seeded from configuration: `[defaults]` is merged into the
    /// store once, `[output]` controls the save directory and the ledger.
    pub fn from_config(
        trainer: Arc<dyn Trainer>,
        device_id: Option<String>,
        config: &LauncherConfig,
    ) -> Result<Self, XdgError> {
        let mut launcher = Self::new(trainer, device_id);
        if !config.defaults.is_empty() {
            launcher.store.update(&config.defaults)?;
        }
        launcher.save_dir_override = config.save_dir_update();
        launcher.ledger = config.output.ledger;
        Ok(launcher)
    }

    pub fn with_interrupts(mut self, interrupts: Interrupts) -> Self {
        self.interrupts = interrupts;
        self
    }

    pub fn store(&self) -> &ParameterStore {
        &self.store
    }

    /// Run every planned run in order. Cancelled runs are reported and the
    /// plan continues; any other error stops it.
    pub async fn run(&mut self, plan: &ScenarioPlan) -> Result<Vec<RunOutcome>, XdgError> {
        println!("{}", plan.banner);
        info!(
            scenario = %plan.scenario,
            runs = plan.runs.len(),
            trainer = self.trainer.name(),
            "Starting scenario"
        );

        let mut outcomes = Vec::with_capacity(plan.runs.len());
        for (index, run) in plan.runs.iter().enumerate() {
            if let Some(label) = &run.label {
                println!("{label}");
            }
            self.store.update_all(&run.updates)?;
            if let Some(forced) = &self.save_dir_override {
                self.store.update(forced)?;
            }

            let outcome = self.launch(plan.scenario, run).await?;
            info!(
                scenario = %plan.scenario,
                run = index + 1,
                of = plan.runs.len(),
                completed = outcome.is_completed(),
                "Run finished"
            );
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    async fn launch(
        &self,
        scenario: Scenario,
        run: &PlannedRun,
    ) -> Result<RunOutcome, XdgError> {
        let params = self.store.parameters().clone();
        let cancel = self.interrupts.begin_run();
        let started_at = Utc::now();

        let result = try_model(
            self.trainer.as_ref(),
            &params,
            &run.save_name,
            self.device_id.as_deref(),
            &cancel,
        )
        .await;

        if self.ledger {
            let record = RunRecord::new(
                scenario.as_str(),
                params.save_dir.join(&run.save_name),
                parameters_digest(&params)?,
                EnvironmentSnapshot::capture(self.device_id.as_deref()),
                started_at,
            );
            let record = match &result {
                Ok(RunOutcome::Completed { .. }) => record,
                Ok(RunOutcome::Cancelled) => record.with_status(RunStatus::Cancelled),
                Err(e) => record.with_error(e),
            };
            if let Err(ledger_err) = RunLedger::append(&params.save_dir, record) {
                error!(error = %ledger_err, "Failed to record run");
                if result.is_ok() {
                    return Err(ledger_err);
                }
            }
        }

        if let Err(e) = &result {
            error!(save_name = %run.save_name, error = %e, "Run failed");
        }
        result
    }
}

/// 100 sequential MNIST permutations with synaptic intelligence and XdG.
pub async fn run_mnist_si_model(launcher: &mut Launcher) -> Result<Vec<RunOutcome>, XdgError> {
    launcher
        .run(&Scenario::Mnist.plan(NetworkVariant::Standard)?)
        .await
}

/// One colored-MNIST run per separability coefficient in `[0, 1]`.
pub async fn run_colored_mnist_si_model(
    launcher: &mut Launcher,
) -> Result<Vec<RunOutcome>, XdgError> {
    launcher
        .run(&Scenario::ColoredMnist.plan(NetworkVariant::Standard)?)
        .await
}

/// 100 sequential ImageNet tasks with synaptic intelligence and XdG.
pub async fn run_imagenet_si_model(launcher: &mut Launcher) -> Result<Vec<RunOutcome>, XdgError> {
    launcher
        .run(&Scenario::Imagenet.plan(NetworkVariant::Standard)?)
        .await
}

pub async fn run_cifar_si_model(launcher: &mut Launcher) -> Result<Vec<RunOutcome>, XdgError> {
    launcher
        .run(&Scenario::Cifar.plan(NetworkVariant::Standard)?)
        .await
}
