//! Provider abstraction for task dispatch.
//!
//! The [`Provider`] trait decouples orchestration from the backend that
//! actually performs a task (a coding-assistant CLI, an HTTP model API). Tests
//! use scripted providers that return predetermined results without spawning
//! processes or opening sockets.
//!
//! Contract: an ordinary task failure is a `TaskResult` with `success = false`.
//! Only a failure to reach the backend at all is a [`TransportError`].

pub mod cli;
pub mod http;
pub mod placeholder;
pub mod registry;

use std::collections::BTreeSet;
use std::path::PathBuf;

use thiserror::Error;

use crate::core::types::{Capability, TaskResult};

pub use registry::{ProviderFactory, ProviderRegistry};

/// Per-dispatch inputs besides the rendered prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskContext {
    /// Project root; CLI providers run here and HTTP operations resolve against it.
    pub workdir: PathBuf,
    pub auto_accept: bool,
    pub continue_session: bool,
}

/// The backend could not be reached.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("cannot start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot reach {endpoint}: {message}")]
    Unreachable { endpoint: String, message: String },
    #[error("{0}")]
    Other(String),
}

/// A pluggable task backend.
pub trait Provider {
    /// Registry id of this provider.
    fn id(&self) -> &str;

    fn capabilities(&self) -> BTreeSet<Capability>;

    fn supports_auto_accept(&self) -> bool {
        self.capabilities().contains(&Capability::AutoAccept)
    }

    /// Run one task. Must not retry.
    fn execute(&self, prompt: &str, ctx: &TaskContext) -> Result<TaskResult, TransportError>;
}
