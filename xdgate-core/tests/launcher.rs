//! End-to-end launcher behavior against scripted trainers.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use xdgate_core::training::experiment::{LEDGER_FILE, RunLedger, RunStatus};
use xdgate_core::{
    DryRunTrainer, GatingType, Launcher, LauncherConfig, NetworkVariant, Parameters, RunOutcome,
    Scenario, TaskKind, Trainer, XdgError,
};

/// Records every call; fails or cancels on request.
#[derive(Default)]
struct ScriptedTrainer {
    calls: Mutex<Vec<(String, Parameters, Option<String>)>>,
    fail_on: Option<usize>,
    cancel_on: Option<usize>,
}

impl ScriptedTrainer {
    fn calls(&self) -> Vec<(String, Parameters, Option<String>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Trainer for ScriptedTrainer {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn train(
        &self,
        params: &Parameters,
        save_name: &str,
        device_id: Option<&str>,
        _cancel: &CancellationToken,
    ) -> Result<(), XdgError> {
        let index = {
            let mut calls = self.calls.lock().unwrap();
            calls.push((
                save_name.to_string(),
                params.clone(),
                device_id.map(str::to_string),
            ));
            calls.len() - 1
        };
        if self.fail_on == Some(index) {
            return Err(XdgError::training("CUDA out of memory"));
        }
        if self.cancel_on == Some(index) {
            return Err(XdgError::Cancelled);
        }
        Ok(())
    }
}

fn config_in(dir: &std::path::Path, ledger: bool) -> LauncherConfig {
    let mut config = LauncherConfig::default();
    config.output.save_dir = Some(dir.to_path_buf());
    config.output.ledger = ledger;
    config
}

#[tokio::test]
async fn colored_sweep_runs_fifty_times_in_order() {
    let trainer = Arc::new(ScriptedTrainer::default());
    let mut launcher = Launcher::new(trainer.clone(), Some("1".to_string()));

    let outcomes = xdgate_core::scenarios::run_colored_mnist_si_model(&mut launcher)
        .await
        .unwrap();

    assert_eq!(outcomes.len(), 50);
    assert!(outcomes.iter().all(RunOutcome::is_completed));

    let calls = trainer.calls();
    assert_eq!(calls.len(), 50);
    for (i, (save_name, params, device)) in calls.iter().enumerate() {
        let sep = params.separability.unwrap();
        assert!((sep - i as f64 / 49.0).abs() < 1e-12);
        assert_eq!(save_name, &format!("mnist_colorized_{sep:?}.pkl"));
        assert_eq!(params.gating_type, None);
        assert_eq!(device.as_deref(), Some("1"));
    }
}

#[tokio::test]
async fn error_on_one_run_aborts_the_rest() {
    let trainer = Arc::new(ScriptedTrainer {
        fail_on: Some(3),
        ..ScriptedTrainer::default()
    });
    let mut launcher = Launcher::new(trainer.clone(), None);

    let err = xdgate_core::scenarios::run_colored_mnist_si_model(&mut launcher)
        .await
        .unwrap_err();

    assert!(matches!(err, XdgError::Training(ref msg) if msg == "CUDA out of memory"));
    assert_eq!(trainer.calls().len(), 4);
}

#[tokio::test]
async fn cancellation_returns_normally_without_rollback() {
    let trainer = Arc::new(ScriptedTrainer {
        cancel_on: Some(0),
        ..ScriptedTrainer::default()
    });
    let mut launcher = Launcher::new(trainer.clone(), Some("0".to_string()));

    let outcomes = xdgate_core::scenarios::run_mnist_si_model(&mut launcher)
        .await
        .unwrap();

    assert_eq!(outcomes, vec![RunOutcome::Cancelled]);
    let params = launcher.store().parameters();
    assert_eq!(params.gating_type, Some(GatingType::Xdg));
    assert_eq!(params.omega_c, 0.035);
    assert_eq!(params.input_drop_keep_pct, 0.8);
}

#[tokio::test]
async fn cancelled_sweep_point_does_not_stop_the_sweep() {
    let trainer = Arc::new(ScriptedTrainer {
        cancel_on: Some(10),
        ..ScriptedTrainer::default()
    });
    let mut launcher = Launcher::new(trainer.clone(), None);

    let outcomes = xdgate_core::scenarios::run_colored_mnist_si_model(&mut launcher)
        .await
        .unwrap();

    assert_eq!(outcomes.len(), 50);
    assert_eq!(outcomes[10], RunOutcome::Cancelled);
    assert_eq!(outcomes.iter().filter(|o| o.is_completed()).count(), 49);
}

#[tokio::test]
async fn store_carries_state_between_scenarios() {
    let trainer = Arc::new(ScriptedTrainer::default());
    let mut launcher = Launcher::new(trainer.clone(), None);

    xdgate_core::scenarios::run_imagenet_si_model(&mut launcher)
        .await
        .unwrap();
    xdgate_core::scenarios::run_mnist_si_model(&mut launcher)
        .await
        .unwrap();

    // MNIST never mentions conv-layer training, so ImageNet's setting survives.
    let calls = trainer.calls();
    assert!(calls[0].1.train_convolutional_layers);
    assert!(calls[1].1.train_convolutional_layers);
    assert_eq!(calls[1].1.layer_dims, vec![784, 2000, 2000, 10]);
}

#[tokio::test]
async fn cifar_runs_once_with_conv_training() {
    let trainer = Arc::new(ScriptedTrainer::default());
    let mut launcher = Launcher::new(trainer.clone(), Some("2".to_string()));

    let outcomes = xdgate_core::scenarios::run_cifar_si_model(&mut launcher)
        .await
        .unwrap();

    assert_eq!(
        outcomes,
        vec![RunOutcome::Completed {
            save_path: Parameters::default().save_dir.join("cifar_SI_XdG.pkl")
        }]
    );
    let calls = trainer.calls();
    assert_eq!(calls.len(), 1);
    let (save_name, params, device) = &calls[0];
    assert_eq!(save_name, "cifar_SI_XdG.pkl");
    assert_eq!(device.as_deref(), Some("2"));
    assert_eq!(params.task, TaskKind::Cifar);
    assert_eq!(params.gating_type, Some(GatingType::Xdg));
    assert_eq!(params.gate_pct, 0.8);
    assert_eq!(params.input_drop_keep_pct, 1.0);
    assert_eq!(params.omega_c, 0.035);
    assert!(params.train_convolutional_layers);
}

#[tokio::test]
async fn ledger_records_every_outcome() {
    let dir = tempfile::tempdir().unwrap();
    let trainer = Arc::new(ScriptedTrainer {
        cancel_on: Some(0),
        fail_on: Some(1),
        ..ScriptedTrainer::default()
    });
    let mut launcher =
        Launcher::from_config(trainer.clone(), None, &config_in(dir.path(), true)).unwrap();

    let plan = Scenario::Cifar.plan(NetworkVariant::Standard).unwrap();
    launcher.run(&plan).await.unwrap();
    assert!(launcher.run(&plan).await.is_err());

    let ledger = RunLedger::load(&dir.path().join(LEDGER_FILE)).unwrap();
    let statuses: Vec<_> = ledger.runs.iter().map(|r| r.status.clone()).collect();
    assert_eq!(statuses, vec![RunStatus::Cancelled, RunStatus::Failed]);
    assert_eq!(ledger.runs[0].save_path, dir.path().join("cifar_SI_XdG.pkl"));
    assert_eq!(ledger.runs[0].params_digest, ledger.runs[1].params_digest);
}

#[tokio::test]
async fn config_defaults_apply_before_scenarios() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_in(dir.path(), false);
    config.defaults = xdgate_core::ParameterUpdate::new().seed(9).omega_c(5.0);

    let trainer = Arc::new(ScriptedTrainer::default());
    let mut launcher = Launcher::from_config(trainer.clone(), None, &config).unwrap();
    assert_eq!(launcher.store().parameters().seed, 9);

    xdgate_core::scenarios::run_mnist_si_model(&mut launcher)
        .await
        .unwrap();

    let (_, params, _) = &trainer.calls()[0];
    assert_eq!(params.seed, 9);
    assert_eq!(params.omega_c, 0.035);
    assert_eq!(params.save_dir, dir.path());
    assert!(!dir.path().join(LEDGER_FILE).exists());
}

#[tokio::test]
async fn dry_run_writes_one_parameter_file_per_run() {
    let dir = tempfile::tempdir().unwrap();
    let mut launcher = Launcher::from_config(
        Arc::new(DryRunTrainer),
        Some("0".to_string()),
        &config_in(dir.path(), true),
    )
    .unwrap();

    let plan = Scenario::Imagenet.plan(NetworkVariant::Split).unwrap();
    let outcomes = launcher.run(&plan).await.unwrap();

    assert_eq!(
        outcomes,
        vec![RunOutcome::Completed {
            save_path: dir.path().join("imagenet_SI_XdG_split.pkl")
        }]
    );
    let written = dir.path().join("imagenet_SI_XdG_split.pkl.params.json");
    let params: Parameters =
        serde_json::from_str(&std::fs::read_to_string(written).unwrap()).unwrap();
    assert_eq!(params.gating_type, Some(GatingType::Split));
    assert_eq!(params.layer_dims, vec![4096, 3665, 3665, 10]);
}
