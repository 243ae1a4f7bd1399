//! Human-readable summaries printed by the CLI.

use std::fmt::Write as _;

use crate::batch::BatchOutcome;
use crate::checkpoint::{Checkpoint, RestoreOutcome};
use crate::core::types::{RollbackRecord, TaskResult};

pub fn task_summary(result: &TaskResult) -> String {
    let mut out = String::new();
    match &result.error {
        None => {
            let _ = writeln!(out, "task succeeded (provider: {})", result.provider);
        }
        Some(error) => {
            let _ = writeln!(out, "task failed (provider: {}): {error}", result.provider);
        }
    }
    if let Some(planned) = result.diagnostics.dry_run {
        let _ = writeln!(
            out,
            "dry run: {planned} planned operations were NOT applied; rerun with auto-accept to apply them"
        );
    }
    if let Some(id) = &result.checkpoint_id {
        let _ = writeln!(out, "checkpoint: {id}");
    }
    for operation in &result.diagnostics.applied_operations {
        let _ = writeln!(out, "applied: {operation}");
    }
    if let Some(record) = &result.diagnostics.rollback {
        out.push_str(&rollback_summary(record));
    }
    for warning in &result.diagnostics.warnings {
        let _ = writeln!(out, "warning: {warning}");
    }
    if !result.output.trim().is_empty() {
        let _ = writeln!(out, "\n{}", result.output.trim_end());
    }
    out
}

pub fn rollback_summary(record: &RollbackRecord) -> String {
    let mut out = String::new();
    if record.restored {
        let _ = writeln!(out, "rolled back to checkpoint {}", record.checkpoint_id);
    } else {
        let _ = writeln!(
            out,
            "rollback to checkpoint {} FAILED; inspect the project before continuing",
            record.checkpoint_id
        );
    }
    for line in &record.detail {
        let _ = writeln!(out, "  {line}");
    }
    out
}

pub fn batch_summary(outcome: &BatchOutcome) -> String {
    let mut out = String::new();
    for (index, result) in outcome.results.iter().enumerate() {
        let status = match &result.error {
            None => "ok".to_string(),
            Some(error) => format!("failed: {error}"),
        };
        let _ = writeln!(out, "[{}] {status}", index + 1);
    }
    if let Some(id) = &outcome.checkpoint_id {
        let _ = writeln!(out, "batch checkpoint: {id}");
    }
    if let Some(record) = &outcome.rollback {
        out.push_str(&rollback_summary(record));
    }
    let _ = writeln!(
        out,
        "{} of {} tasks succeeded",
        outcome.results.len() - outcome.failed_count(),
        outcome.results.len()
    );
    out
}

pub fn checkpoint_line(checkpoint: &Checkpoint) -> String {
    format!(
        "{}  {}  {} files  {}",
        checkpoint.id, checkpoint.strategy, checkpoint.modified_files_count, checkpoint.description
    )
}

pub fn checkpoint_list(checkpoints: &[Checkpoint]) -> String {
    if checkpoints.is_empty() {
        return "no checkpoints\n".to_string();
    }
    let mut out = String::new();
    for checkpoint in checkpoints {
        let _ = writeln!(out, "{}", checkpoint_line(checkpoint));
    }
    out
}

pub fn restore_summary(id: &str, outcome: &RestoreOutcome) -> String {
    let mut out = String::new();
    if outcome.restored {
        let _ = writeln!(out, "restored checkpoint {id}");
    } else {
        let _ = writeln!(out, "checkpoint {id} was not restored");
    }
    for line in &outcome.detail {
        let _ = writeln!(out, "  {line}");
    }
    out
}
