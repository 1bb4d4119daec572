//! Launcher configuration.
//!
//! Uses `figment` for layered configuration: defaults -> user config file ->
//! workspace config file -> environment. The user file lives at
//! `~/.config/xdgate/config.toml`, the workspace file at `./xdgate.toml`
//! unless an explicit path is given.

use crate::error::XdgError;
use crate::params::ParameterUpdate;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level launcher configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LauncherConfig {
    /// Python trainer runtime.
    #[serde(default)]
    pub python: PythonConfig,
    /// Where results and the run ledger go.
    #[serde(default)]
    pub output: OutputConfig,
    /// Parameter overrides applied on top of the built-in defaults, before
    /// any scenario update.
    #[serde(default)]
    pub defaults: ParameterUpdate,
}

/// Python runtime configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PythonConfig {
    /// Path to Python executable (`python3` if not set).
    #[serde(default)]
    pub python_path: Option<PathBuf>,
    /// Path to virtual environment (auto-detected if not set). Relative
    /// paths are taken from the launcher's working directory, not from
    /// `trainer_dir`.
    #[serde(default)]
    pub venv_path: Option<PathBuf>,
    /// Directory containing the trainer's `model.py` and `parameters.py`.
    #[serde(default = "default_trainer_dir")]
    pub trainer_dir: PathBuf,
    /// Upper bound on a single training run (seconds).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Send launcher-built gating masks to the trainer. They replace the
    /// masks the trainer would generate itself.
    #[serde(default = "default_true")]
    pub gating_masks: bool,
}

impl Default for PythonConfig {
    fn default() -> Self {
        Self {
            python_path: None,
            venv_path: None,
            trainer_dir: default_trainer_dir(),
            timeout_secs: default_timeout_secs(),
            gating_masks: true,
        }
    }
}

fn default_trainer_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_timeout_secs() -> u64 {
    7 * 24 * 3600
}

/// Output configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Overrides every scenario's `save_dir` when set.
    #[serde(default)]
    pub save_dir: Option<PathBuf>,
    /// Append a record per run to `<save_dir>/runs.json`.
    #[serde(default = "default_true")]
    pub ledger: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            save_dir: None,
            ledger: true,
        }
    }
}

fn default_true() -> bool {
    true
}

impl LauncherConfig {
    /// Update forcing the configured output directory, applied after every
    /// scenario update so it wins over the dataset's `save_dir`.
    pub fn save_dir_update(&self) -> Option<ParameterUpdate> {
        self.output
            .save_dir
            .as_ref()
            .map(|dir| ParameterUpdate::new().save_dir(dir.clone()))
    }
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Environment variables (prefixed with `XDGATE_`, nested with `__`)
/// 2. Explicit config file, or `<workspace>/xdgate.toml`
/// 3. User config (`~/.config/xdgate/config.toml`)
/// 4. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    explicit: Option<&Path>,
) -> Result<LauncherConfig, XdgError> {
    let mut figment = Figment::from(Serialized::defaults(LauncherConfig::default()));

    if let Some(config_dir) = directories::ProjectDirs::from("dev", "xdgate", "xdgate") {
        let user_config = config_dir.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    match explicit {
        Some(path) => {
            if !path.exists() {
                return Err(XdgError::config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            figment = figment.merge(Toml::file(path));
        }
        None => {
            if let Some(ws) = workspace {
                let ws_config = ws.join("xdgate.toml");
                if ws_config.exists() {
                    figment = figment.merge(Toml::file(&ws_config));
                }
            }
        }
    }

    // XDGATE_PYTHON__TIMEOUT_SECS, XDGATE_OUTPUT__SAVE_DIR, ...
    figment = figment.merge(Env::prefixed("XDGATE_").split("__"));

    figment.extract().map_err(|e| XdgError::Figment(Box::new(e)))
}
