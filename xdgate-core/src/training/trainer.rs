//! Trainer collaborators.
//!
//! A [`Trainer`] consumes one merged parameter set and writes one result file
//! named by the caller into `params.save_dir`. Implementations must return
//! [`XdgError::Cancelled`] once `cancel` fires.

use crate::config::PythonConfig;
use crate::error::XdgError;
use crate::gating::trainer_payload;
use crate::params::Parameters;
use crate::runtime::PythonRuntime;
use async_trait::async_trait;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Loads the payload from stdin into the trainer's parameter module, then runs
/// `model.main(save_fn, gpu_id)` from the trainer directory. An interrupt inside
/// Python exits with [`crate::runtime::INTERRUPTED_EXIT_CODE`].
///
/// When the payload carries `gating`, it is written to `par["gating"]` after
/// `update_parameters`, replacing any masks the trainer derived itself.
const BRIDGE_SCRIPT: &str = r#"
import json, sys
payload = json.load(sys.stdin)
save_fn = payload.pop("__save_fn")
gpu_id = payload.pop("__gpu_id")
gating = payload.pop("gating", None)
sys.path.insert(0, ".")
from parameters import par, update_parameters
update_parameters(payload)
if gating is not None:
    par["gating"] = gating
import model
try:
    model.main(save_fn, gpu_id)
except KeyboardInterrupt:
    sys.exit(130)
"#;

#[async_trait]
pub trait Trainer: Send + Sync {
    /// Short name for logs and run records.
    fn name(&self) -> &str;

    async fn train(
        &self,
        params: &Parameters,
        save_name: &str,
        device_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<(), XdgError>;
}

/// Runs the external Python trainer through [`PythonRuntime`].
pub struct PythonTrainer {
    runtime: PythonRuntime,
    gating_masks: bool,
}

impl PythonTrainer {
    pub fn new(runtime: PythonRuntime) -> Self {
        Self {
            runtime,
            gating_masks: true,
        }
    }

    pub fn from_config(config: &PythonConfig) -> Self {
        Self::new(PythonRuntime::from_config(config)).with_gating_masks(config.gating_masks)
    }

    /// Whether launcher-built masks override the trainer's own.
    pub fn with_gating_masks(mut self, enabled: bool) -> Self {
        self.gating_masks = enabled;
        self
    }

    fn payload(
        &self,
        params: &Parameters,
        save_name: &str,
        device_id: Option<&str>,
    ) -> Result<serde_json::Value, XdgError> {
        let mut payload = trainer_payload(params)?;
        if let Some(map) = payload.as_object_mut() {
            if !self.gating_masks {
                map.remove("gating");
            }
            map.insert("__save_fn".into(), save_name.into());
            map.insert("__gpu_id".into(), device_id.into());
        }
        Ok(payload)
    }
}

#[async_trait]
impl Trainer for PythonTrainer {
    fn name(&self) -> &str {
        "python"
    }

    async fn train(
        &self,
        params: &Parameters,
        save_name: &str,
        device_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<(), XdgError> {
        let payload = self.payload(params, save_name, device_id)?;

        let mut envs = Vec::new();
        if let Some(device) = device_id {
            envs.push(("CUDA_VISIBLE_DEVICES", device));
        }

        info!(
            trainer_dir = %self.runtime.workdir().display(),
            save_name,
            device = device_id.unwrap_or("cpu"),
            "Launching Python trainer"
        );

        self.runtime
            .run_script(BRIDGE_SCRIPT, &payload, &envs, cancel)
            .await
    }
}

/// Writes the merged parameters next to where the result would go instead of
/// training. Output is `<save_dir>/<save_name>.params.json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunTrainer;

#[async_trait]
impl Trainer for DryRunTrainer {
    fn name(&self) -> &str {
        "dry-run"
    }

    async fn train(
        &self,
        params: &Parameters,
        save_name: &str,
        _device_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<(), XdgError> {
        if cancel.is_cancelled() {
            return Err(XdgError::Cancelled);
        }

        let path = params.save_dir.join(format!("{save_name}.params.json"));
        write_params(&path, params).await?;
        debug!(path = %path.display(), "Dry run wrote parameters");
        Ok(())
    }
}

async fn write_params(path: &Path, params: &Parameters) -> Result<(), XdgError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let content = serde_json::to_string_pretty(params)?;
    tokio::fs::write(path, content).await?;
    Ok(())
}
