//! Side-effecting helpers: filesystem, subprocesses, git, config and logs.

pub mod config;
pub mod context;
pub mod git;
pub mod paths;
pub mod process;
pub mod prompt;
pub mod search;
pub mod session_log;
