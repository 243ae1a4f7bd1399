//! Version-control snapshots built on `git stash`.
//!
//! Creating a snapshot is non-destructive: the changes are stashed and the new
//! entry is applied straight back, so the stash commit is a copy of the working
//! tree while the tree itself is untouched.

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use super::{Checkpoint, RestoreOutcome};
use crate::io::git::Git;
use crate::io::paths::STATE_DIR_NAME;

const EXCLUDED: [&str; 1] = [STATE_DIR_NAME];
const PRE_RESTORE_MESSAGE: &str = "delegate pre-restore";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VcsSnapshot {
    /// Stash commit holding the changes; `None` for a clean tree.
    pub storage_ref: Option<String>,
    pub head: Option<String>,
    pub modified_files_count: usize,
}

#[instrument(skip_all, fields(id))]
pub fn create_snapshot(git: &Git, id: &str) -> Result<VcsSnapshot> {
    let head = git.head()?;
    let changes = git.changes_except_prefixes(&EXCLUDED)?;
    if changes.is_empty() {
        return Ok(VcsSnapshot {
            storage_ref: None,
            head,
            modified_files_count: 0,
        });
    }

    let stash = git.stash_push(&format!("delegate checkpoint {id}"), &EXCLUDED)?;
    if let Some(commit) = &stash {
        git.stash_apply(commit).with_context(|| {
            format!("re-apply checkpoint stash; your changes are preserved in stash {commit}")
        })?;
    }
    Ok(VcsSnapshot {
        storage_ref: stash,
        head,
        modified_files_count: changes.len(),
    })
}

/// Return the working tree to `checkpoint`.
///
/// Refuses (nothing touched) when HEAD moved. Current changes are shelved in a
/// pre-restore stash first; if the checkpoint stash does not apply cleanly
/// they are put back and the failure is reported.
#[instrument(skip_all, fields(id = %checkpoint.id))]
pub fn restore_snapshot(git: &Git, checkpoint: &Checkpoint) -> Result<RestoreOutcome> {
    let current_head = git.head()?;
    if current_head != checkpoint.head {
        warn!(?current_head, recorded = ?checkpoint.head, "HEAD moved since checkpoint");
        return Ok(RestoreOutcome {
            restored: false,
            detail: vec![format!(
                "HEAD moved from {} to {} since checkpoint {}; reset to the recorded commit before restoring",
                short(checkpoint.head.as_deref()),
                short(current_head.as_deref()),
                checkpoint.id
            )],
        });
    }

    let mut detail = Vec::new();
    let shelved = if git.changes_except_prefixes(&EXCLUDED)?.is_empty() {
        None
    } else {
        git.stash_push(&format!("{PRE_RESTORE_MESSAGE} {}", checkpoint.id), &EXCLUDED)?
    };
    if let Some(commit) = &shelved {
        detail.push(format!("current changes shelved in stash {commit}"));
    }

    if let Some(stash) = &checkpoint.storage_ref {
        if let Err(err) = git.stash_apply(stash) {
            warn!(err = %err, "checkpoint stash did not apply, putting changes back");
            git.discard_changes(&EXCLUDED)?;
            if let Some(commit) = &shelved {
                git.stash_apply(commit)
                    .with_context(|| format!("re-apply pre-restore stash {commit}"))?;
            }
            detail.push(format!("applying checkpoint stash failed: {err:#}"));
            return Ok(RestoreOutcome {
                restored: false,
                detail,
            });
        }
    }

    info!(id = %checkpoint.id, "working tree restored");
    detail.push(format!("working tree restored to checkpoint {}", checkpoint.id));
    Ok(RestoreOutcome {
        restored: true,
        detail,
    })
}

/// Drop the stash entry backing a snapshot, if it still exists.
pub fn delete_snapshot(git: &Git, storage_ref: Option<&str>) -> Result<()> {
    if let Some(commit) = storage_ref {
        git.stash_drop(commit)?;
    }
    Ok(())
}

/// Drop all but the newest `keep` pre-restore stashes. Returns how many went.
pub fn prune_shelved(git: &Git, keep: usize) -> Result<usize> {
    let shelved: Vec<String> = git
        .stash_entries()?
        .into_iter()
        .filter(|(_, subject)| subject.contains(PRE_RESTORE_MESSAGE))
        .map(|(commit, _)| commit)
        .collect();
    let mut dropped = 0;
    for commit in shelved.iter().skip(keep) {
        if git.stash_drop(commit)? {
            dropped += 1;
        }
    }
    if dropped > 0 {
        debug!(dropped, keep, "pruned pre-restore stashes");
    }
    Ok(dropped)
}

fn short(commit: Option<&str>) -> &str {
    match commit {
        Some(sha) => sha.get(..12).unwrap_or(sha),
        None => "(none)",
    }
}
