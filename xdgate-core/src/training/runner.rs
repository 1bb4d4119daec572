//! Run wrapper and interrupt wiring.

use super::trainer::Trainer;
use crate::error::XdgError;
use crate::params::Parameters;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Result of a run that did not fail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Completed { save_path: PathBuf },
    Cancelled,
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// Invoke the trainer once.
///
/// Cancellation is the only recoverable failure: it prints a notice and
/// returns [`RunOutcome::Cancelled`]. Every other error is returned unchanged.
/// Nothing written by an abandoned run is cleaned up.
pub async fn try_model(
    trainer: &dyn Trainer,
    params: &Parameters,
    save_name: &str,
    device_id: Option<&str>,
    cancel: &CancellationToken,
) -> Result<RunOutcome, XdgError> {
    match trainer.train(params, save_name, device_id, cancel).await {
        Ok(()) => Ok(RunOutcome::Completed {
            save_path: params.save_dir.join(save_name),
        }),
        Err(e) if e.is_cancelled() => {
            println!("Quit by KeyboardInterrupt.");
            warn!(save_name, trainer = trainer.name(), "Run abandoned by interrupt");
            Ok(RunOutcome::Cancelled)
        }
        Err(e) => Err(e),
    }
}

/// Hands out one cancellation token per run and cancels the current one on
/// interrupt. An interrupt abandons only the run in flight.
#[derive(Debug, Clone, Default)]
pub struct Interrupts {
    current: Arc<Mutex<CancellationToken>>,
}

impl Interrupts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh token for the next run.
    pub fn begin_run(&self) -> CancellationToken {
        let token = CancellationToken::new();
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        *current = token.clone();
        token
    }

    /// Cancel the run in flight, if any.
    pub fn interrupt(&self) {
        self.current
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .cancel();
    }

    /// Spawn a task that turns every Ctrl-C into [`Interrupts::interrupt`].
    pub fn listen_for_ctrl_c(&self) -> JoinHandle<()> {
        let interrupts = self.clone();
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupt received, abandoning current run");
                interrupts.interrupt();
            }
        })
    }
}
