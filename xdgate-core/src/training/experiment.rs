//! Run records and the on-disk run ledger.

use super::reproducibility::EnvironmentSnapshot;
use crate::error::XdgError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File name of the ledger inside a save directory.
pub const LEDGER_FILE: &str = "runs.json";

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Cancelled,
    Failed,
}

/// One trainer invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: String,
    pub scenario: String,
    pub save_path: PathBuf,
    pub status: RunStatus,
    /// SHA-256 of the merged parameters the trainer received.
    pub params_digest: String,
    pub environment: EnvironmentSnapshot,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunRecord {
    pub fn new(
        scenario: &str,
        save_path: PathBuf,
        params_digest: String,
        environment: EnvironmentSnapshot,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            scenario: scenario.to_string(),
            save_path,
            status: RunStatus::Completed,
            params_digest,
            environment,
            error: None,
            started_at,
            finished_at: Utc::now(),
        }
    }

    pub fn with_status(mut self, status: RunStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_error(mut self, error: &XdgError) -> Self {
        self.status = RunStatus::Failed;
        self.error = Some(error.to_string());
        self
    }
}

/// Every run launched into one save directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunLedger {
    pub runs: Vec<RunRecord>,
}

impl RunLedger {
    pub fn new() -> Self {
        Self { runs: Vec::new() }
    }

    pub fn add(&mut self, record: RunRecord) {
        self.runs.push(record);
    }

    pub fn load(path: &Path) -> Result<Self, XdgError> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), XdgError> {
        let content = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, &content)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Load the ledger in `save_dir`, append `record`, write it back.
    pub fn append(save_dir: &Path, record: RunRecord) -> Result<(), XdgError> {
        std::fs::create_dir_all(save_dir)?;
        let path = save_dir.join(LEDGER_FILE);
        let mut ledger = Self::load(&path)?;
        ledger.add(record);
        ledger.save(&path)
    }
}
