//! Stable exit codes for delegate CLI commands.

/// Command succeeded (for `batch`: every task succeeded).
pub const OK: i32 = 0;
/// Command failed: task failure, configuration/storage error, or failed restore.
pub const FAILED: i32 = 1;
