//! Error types for the xdgate-core crate.

use thiserror::Error;

/// Top-level error type for launcher operations.
#[derive(Debug, Error)]
pub enum XdgError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid parameter `{field}`: {reason}")]
    InvalidParameter { field: &'static str, reason: String },

    #[error("Unsupported variant: {0}")]
    UnsupportedVariant(String),

    #[error("Training error: {0}")]
    Training(String),

    #[error("Python runtime error: {0}")]
    Python(String),

    #[error("Run cancelled")]
    Cancelled,

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Config source error: {0}")]
    Figment(#[from] Box<figment::Error>),
}

impl XdgError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            field,
            reason: reason.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::UnsupportedVariant(msg.into())
    }

    pub fn training(msg: impl Into<String>) -> Self {
        Self::Training(msg.into())
    }

    pub fn python(msg: impl Into<String>) -> Self {
        Self::Python(msg.into())
    }

    /// Whether this error represents an interactive cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
