//! The parameter store: an owned, versioned configuration value.

use super::{ParameterUpdate, Parameters};
use crate::error::XdgError;
use tracing::debug;

/// Holds the current [`Parameters`] and how many merges produced it.
///
/// Merges are last-write-wins per field and validated before they take
/// effect; a rejected merge leaves the store as it was.
#[derive(Debug, Clone, Default)]
pub struct ParameterStore {
    current: Parameters,
    revision: u64,
}

impl ParameterStore {
    /// Store seeded with the built-in defaults.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parameters(&self) -> &Parameters {
        &self.current
    }

    /// Number of successful merges since construction.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Merge `partial` into the store.
    pub fn update(&mut self, partial: &ParameterUpdate) -> Result<(), XdgError> {
        let mut candidate = self.current.clone();
        let changed = partial.apply_to(&mut candidate);
        candidate.validate()?;

        self.current = candidate;
        self.revision += 1;
        debug!(revision = self.revision, fields = ?changed, "Parameters updated");
        Ok(())
    }

    /// Merge each update in order, stopping at the first rejected one.
    pub fn update_all<'a, I>(&mut self, updates: I) -> Result<(), XdgError>
    where
        I: IntoIterator<Item = &'a ParameterUpdate>,
    {
        for update in updates {
            self.update(update)?;
        }
        Ok(())
    }

    /// Merge a loose key/value mapping, rejecting unknown keys.
    pub fn update_json(&mut self, value: serde_json::Value) -> Result<(), XdgError> {
        let partial = ParameterUpdate::from_json(value)?;
        self.update(&partial)
    }
}
