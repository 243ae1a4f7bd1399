//! Checkpointed delegation of coding tasks to external providers.
//!
//! A task is handed to a provider (a coding-assistant CLI or an HTTP model API)
//! after the project state has been snapshotted, so that a failed or partially
//! applied change can be rolled back. The crate is layered the same way
//! throughout:
//!
//! - **[`core`]**: Pure, deterministic types and rules (task results, the task
//!   phase machine, retention selection). No I/O.
//! - **[`io`]**: Side-effecting helpers (git, subprocesses, config, prompts,
//!   the session log).
//! - **[`checkpoint`]**: The checkpoint store (git stash snapshots or file backups).
//! - **[`provider`]**: The provider trait, registry and adapters.
//!
//! [`orchestrator`], [`batch`] and [`interactive`] coordinate those pieces to
//! implement the CLI commands; [`report`] formats their results.

pub mod batch;
pub mod checkpoint;
pub mod core;
pub mod error;
pub mod exit_codes;
pub mod interactive;
pub mod io;
pub mod logging;
pub mod orchestrator;
pub mod provider;
pub mod report;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
