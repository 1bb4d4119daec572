//! Evenly spaced parameter sweeps.

use serde::{Deserialize, Serialize};

/// `num` evenly spaced points over the closed interval `[start, stop]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Linspace {
    pub start: f64,
    pub stop: f64,
    pub num: usize,
}

impl Linspace {
    pub fn new(start: f64, stop: f64, num: usize) -> Self {
        Self { start, stop, num }
    }

    /// Point `i` is `start + i * step`; the last point is exactly `stop`.
    pub fn values(&self) -> Vec<f64> {
        match self.num {
            0 => Vec::new(),
            1 => vec![self.start],
            n => {
                let step = (self.stop - self.start) / (n - 1) as f64;
                let mut values: Vec<f64> = (0..n).map(|i| self.start + i as f64 * step).collect();
                values[n - 1] = self.stop;
                values
            }
        }
    }
}

/// Shortest literal that reads back as the same `f64`, always with a
/// fractional part (`0.0`, `0.5`, `0.02040816326530612`).
pub fn float_literal(value: f64) -> String {
    format!("{value:?}")
}
