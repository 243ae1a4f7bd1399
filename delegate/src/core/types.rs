//! Shared task types.
//!
//! These types define the contract between the orchestrator, the controllers
//! and the provider adapters. They carry no I/O and serialize deterministically.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::phase::TaskPhase;

/// Error taxonomy shared by raised errors and failed results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    Storage,
    Transport,
    TaskFailure,
    Timeout,
    PartialApplication,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::Storage => "storage",
            ErrorKind::Transport => "transport",
            ErrorKind::TaskFailure => "task_failure",
            ErrorKind::Timeout => "timeout",
            ErrorKind::PartialApplication => "partial_application",
        }
    }

    /// Partial application is worse than either outcome, so it always rolls back.
    pub fn forces_rollback(self) -> bool {
        self == ErrorKind::PartialApplication
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured error carried by a failed [`TaskResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskError {
    pub kind: ErrorKind,
    pub detail: String,
}

impl TaskError {
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.detail)
    }
}

/// Capability tags a provider can advertise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    FileEdit,
    FileCreate,
    Terminal,
    Search,
    AutoAccept,
}

impl Capability {
    pub fn as_str(self) -> &'static str {
        match self {
            Capability::FileEdit => "file_edit",
            Capability::FileCreate => "file_create",
            Capability::Terminal => "terminal",
            Capability::Search => "search",
            Capability::AutoAccept => "auto_accept",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-task options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOptions {
    /// Let the provider apply changes without per-change confirmation.
    pub auto_accept: bool,
    /// Snapshot the project before dispatching.
    pub create_checkpoint: bool,
    /// Snapshot the project again after a successful task.
    pub checkpoint_after: bool,
    /// Prompt template identifier.
    pub prompt_template: String,
    /// Reuse the provider's previous conversation.
    pub continue_session: bool,
    /// Provider id to use instead of the configured default.
    pub provider_override: Option<String>,
    /// Overrides `auto_restore_on_failure` from the config when set.
    pub auto_restore_on_failure: Option<bool>,
    /// Checkpoint taken by an enclosing controller (the batch boundary).
    pub boundary_checkpoint: Option<String>,
}

impl Default for TaskOptions {
    fn default() -> Self {
        Self {
            auto_accept: false,
            create_checkpoint: true,
            checkpoint_after: false,
            prompt_template: "default".to_string(),
            continue_session: false,
            provider_override: None,
            auto_restore_on_failure: None,
            boundary_checkpoint: None,
        }
    }
}

/// Outcome of an automatic or controller-driven rollback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackRecord {
    pub checkpoint_id: String,
    pub restored: bool,
    pub detail: Vec<String>,
}

/// Diagnostic metadata attached to a result. Never drives control flow upstream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollback: Option<RollbackRecord>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    /// File operations applied by an HTTP adapter, in order (`create src/a.rs`).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub applied_operations: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub phases: Vec<TaskPhase>,
    /// Operations an HTTP adapter planned but left unapplied without auto-accept.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dry_run: Option<usize>,
}

/// Outcome of executing one task.
///
/// `error` is present iff `success` is false; use the constructors to keep it so.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult {
    pub success: bool,
    pub output: String,
    pub error: Option<TaskError>,
    pub checkpoint_id: Option<String>,
    pub provider: String,
    #[serde(default)]
    pub diagnostics: Diagnostics,
}

impl TaskResult {
    pub fn succeeded(provider: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
            checkpoint_id: None,
            provider: provider.into(),
            diagnostics: Diagnostics::default(),
        }
    }

    pub fn failed(provider: impl Into<String>, output: impl Into<String>, error: TaskError) -> Self {
        Self {
            success: false,
            output: output.into(),
            error: Some(error),
            checkpoint_id: None,
            provider: provider.into(),
            diagnostics: Diagnostics::default(),
        }
    }

    /// Turn a successful result into a failure, keeping output and diagnostics.
    pub fn into_failure(mut self, error: TaskError) -> Self {
        self.success = false;
        self.error = Some(error);
        self
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|err| err.kind)
    }

    pub fn rolled_back(&self) -> bool {
        self.diagnostics
            .rollback
            .as_ref()
            .is_some_and(|record| record.restored)
    }
}
