//! Append-only session log at `.delegate/sessions.jsonl`.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::types::{ErrorKind, TaskResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEntry {
    pub timestamp: String,
    pub task: String,
    pub provider: String,
    pub success: bool,
    pub checkpoint_id: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub output_length: usize,
    pub rolled_back: bool,
}

impl SessionEntry {
    pub fn from_result(timestamp: String, task: &str, result: &TaskResult) -> Self {
        Self {
            timestamp,
            task: task.to_string(),
            provider: result.provider.clone(),
            success: result.success,
            checkpoint_id: result.checkpoint_id.clone(),
            error_kind: result.error_kind(),
            output_length: result.output.len(),
            rolled_back: result.rolled_back(),
        }
    }
}

/// Append one entry as a single JSON line.
pub fn append_entry(path: &Path, entry: &SessionEntry) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let mut line = serde_json::to_string(entry).context("serialize session entry")?;
    line.push('\n');
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open {}", path.display()))?;
    file.write_all(line.as_bytes())
        .with_context(|| format!("append {}", path.display()))?;
    Ok(())
}

/// The most recent `limit` entries, oldest first. Unparseable lines are skipped.
pub fn recent_entries(path: &Path, limit: usize) -> Result<Vec<SessionEntry>> {
    if limit == 0 || !path.exists() {
        return Ok(Vec::new());
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let mut entries: Vec<SessionEntry> = contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str(line) {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!(err = %err, "skipping unreadable session log line");
                None
            }
        })
        .collect();
    let skip = entries.len().saturating_sub(limit);
    entries.drain(..skip);
    Ok(entries)
}

/// Summarise entries for the continue-session prompt section.
pub fn session_hint(entries: &[SessionEntry]) -> String {
    entries
        .iter()
        .map(|entry| {
            let status = match (entry.success, entry.error_kind) {
                (true, _) => "ok".to_string(),
                (false, Some(kind)) if entry.rolled_back => format!("failed ({kind}, rolled back)"),
                (false, Some(kind)) => format!("failed ({kind})"),
                (false, None) => "failed".to_string(),
            };
            format!("- [{status}] {}", entry.task)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
