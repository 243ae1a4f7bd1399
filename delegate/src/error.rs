//! Raised errors.
//!
//! Only conditions the caller cannot continue past are raised: bad configuration
//! and checkpoint storage failures. Everything a provider can do wrong is a
//! value inside [`TaskResult`](crate::core::types::TaskResult).

use thiserror::Error;

use crate::core::types::ErrorKind;

#[derive(Debug, Error)]
pub enum AgentError {
    /// Unknown provider or template, malformed options, invalid config file.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Checkpoint create/restore/prune failed (disk, permissions, git).
    #[error("storage error: {0}")]
    Storage(String),
}

impl AgentError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Wrap an I/O error chain, keeping every context layer in the message.
    pub fn storage(err: anyhow::Error) -> Self {
        Self::Storage(format!("{err:#}"))
    }

    /// Same kind, with `prefix` in front of the message.
    pub fn prefixed(self, prefix: impl std::fmt::Display) -> Self {
        match self {
            Self::Configuration(message) => Self::Configuration(format!("{prefix}: {message}")),
            Self::Storage(message) => Self::Storage(format!("{prefix}: {message}")),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Storage(_) => ErrorKind::Storage,
        }
    }
}
