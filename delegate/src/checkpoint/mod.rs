//! Checkpoint store: capture and restore project state snapshots.
//!
//! The strategy is chosen once per store by probing the project: a git work
//! tree with at least one commit uses stash snapshots ([`vcs`]), anything else
//! uses file copies ([`backup`]). Metadata for every checkpoint lives in
//! `.delegate/checkpoints/<id>.json`.

pub mod backup;
pub mod vcs;

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::core::retention::select_for_pruning;
use crate::error::AgentError;
use crate::io::config::AgentConfig;
use crate::io::git::Git;
use crate::io::paths::ProjectPaths;
use backup::IgnoreRules;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    VersionControlSnapshot,
    FileBackup,
}

impl Strategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::VersionControlSnapshot => "version-control-snapshot",
            Strategy::FileBackup => "file-backup",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable record of one snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    pub description: String,
    pub strategy: Strategy,
    /// Stash commit (version control) or copied tree path (file backup).
    pub storage_ref: Option<String>,
    /// HEAD when the checkpoint was taken (version control only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head: Option<String>,
    pub modified_files_count: usize,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreOutcome {
    pub restored: bool,
    pub detail: Vec<String>,
}

/// Owns every checkpoint of one project.
pub struct CheckpointStore {
    paths: ProjectPaths,
    strategy: Strategy,
    git: Git,
    ignore: IgnoreRules,
    max_checkpoints: usize,
    protected: BTreeSet<String>,
}

impl CheckpointStore {
    /// Open the store for a project, probing for the snapshot strategy.
    pub fn open(paths: ProjectPaths, config: &AgentConfig) -> Result<Self, AgentError> {
        let git = Git::new(&paths.root).with_timeout(config.checkpoint_timeout());
        let strategy = probe_strategy(&git);
        Self::with_strategy(paths, config, strategy)
    }

    /// Open the store with a fixed strategy.
    pub fn with_strategy(
        paths: ProjectPaths,
        config: &AgentConfig,
        strategy: Strategy,
    ) -> Result<Self, AgentError> {
        let ignore = IgnoreRules::new(&config.ignore_patterns)
            .map_err(|err| AgentError::configuration(format!("{err:#}")))?;
        let git = Git::new(&paths.root).with_timeout(config.checkpoint_timeout());
        debug!(%strategy, root = %paths.root.display(), "checkpoint store opened");
        Ok(Self {
            paths,
            strategy,
            git,
            ignore,
            max_checkpoints: config.max_checkpoints,
            protected: BTreeSet::new(),
        })
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Exclude `id` from retention until [`unprotect`](Self::unprotect).
    pub fn protect(&mut self, id: &str) {
        self.protected.insert(id.to_string());
    }

    pub fn unprotect(&mut self, id: &str) {
        self.protected.remove(id);
    }

    /// Snapshot the project. Retention runs afterwards and never fails the call.
    #[instrument(skip_all, fields(strategy = %self.strategy))]
    pub fn create_checkpoint(&self, description: &str) -> Result<Checkpoint, AgentError> {
        let checkpoint = self.try_create(description).map_err(AgentError::storage)?;
        info!(id = %checkpoint.id, files = checkpoint.modified_files_count, "checkpoint created");
        self.apply_retention();
        Ok(checkpoint)
    }

    /// Restore `id`. An unknown id is reported, not raised.
    #[instrument(skip_all, fields(id, prune_new_files))]
    pub fn restore_checkpoint(
        &self,
        id: &str,
        prune_new_files: bool,
    ) -> Result<RestoreOutcome, AgentError> {
        let Some(checkpoint) = self.load(id).map_err(AgentError::storage)? else {
            return Ok(RestoreOutcome {
                restored: false,
                detail: vec![format!("checkpoint {id} not found")],
            });
        };
        let outcome = match checkpoint.strategy {
            Strategy::VersionControlSnapshot => vcs::restore_snapshot(&self.git, &checkpoint),
            Strategy::FileBackup => backup::restore_backup(
                &self.paths.root,
                &self.paths.checkpoint_dir(id),
                &self.ignore,
                prune_new_files,
            ),
        }
        .map_err(AgentError::storage)?;
        if checkpoint.strategy == Strategy::VersionControlSnapshot {
            self.prune_shelved_changes();
        }
        if outcome.restored {
            info!(id, "checkpoint restored");
        } else {
            warn!(id, detail = ?outcome.detail, "checkpoint not restored");
        }
        Ok(outcome)
    }

    /// Checkpoints, most recent first.
    pub fn list_checkpoints(&self, limit: Option<usize>) -> Result<Vec<Checkpoint>, AgentError> {
        let mut all = self.load_all().map_err(AgentError::storage)?;
        if let Some(limit) = limit {
            all.truncate(limit);
        }
        Ok(all)
    }

    /// Remove a checkpoint's storage, then its metadata. Returns false if unknown.
    #[instrument(skip_all, fields(id))]
    pub fn delete_checkpoint(&self, id: &str) -> Result<bool, AgentError> {
        self.try_delete(id).map_err(AgentError::storage)
    }

    fn try_create(&self, description: &str) -> Result<Checkpoint> {
        fs::create_dir_all(&self.paths.checkpoints_dir)
            .with_context(|| format!("create {}", self.paths.checkpoints_dir.display()))?;
        let id = new_checkpoint_id(Utc::now(), |candidate| {
            self.paths.checkpoint_meta(candidate).exists()
                || self.paths.checkpoint_dir(candidate).exists()
        });
        let created_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);

        let checkpoint = match self.strategy {
            Strategy::VersionControlSnapshot => {
                let snapshot = vcs::create_snapshot(&self.git, &id)?;
                Checkpoint {
                    id,
                    description: description.to_string(),
                    strategy: self.strategy,
                    storage_ref: snapshot.storage_ref,
                    head: snapshot.head,
                    modified_files_count: snapshot.modified_files_count,
                    created_at,
                }
            }
            Strategy::FileBackup => {
                let storage_dir = self.paths.checkpoint_dir(&id);
                let manifest = backup::create_backup(&self.paths.root, &storage_dir, &self.ignore)
                    .inspect_err(|_| {
                        if let Err(err) = fs::remove_dir_all(&storage_dir) {
                            warn!(err = %err, "failed to clean up partial backup");
                        }
                    })?;
                Checkpoint {
                    storage_ref: Some(storage_dir.display().to_string()),
                    id,
                    description: description.to_string(),
                    strategy: self.strategy,
                    head: None,
                    modified_files_count: manifest.files.len(),
                    created_at,
                }
            }
        };
        write_metadata(&self.paths.checkpoint_meta(&checkpoint.id), &checkpoint)?;
        Ok(checkpoint)
    }

    fn try_delete(&self, id: &str) -> Result<bool> {
        let Some(checkpoint) = self.load(id)? else {
            return Ok(false);
        };
        match checkpoint.strategy {
            Strategy::VersionControlSnapshot => {
                vcs::delete_snapshot(&self.git, checkpoint.storage_ref.as_deref())?;
            }
            Strategy::FileBackup => {
                let dir = self.paths.checkpoint_dir(id);
                if dir.exists() {
                    fs::remove_dir_all(&dir)
                        .with_context(|| format!("remove {}", dir.display()))?;
                }
            }
        }
        let meta = self.paths.checkpoint_meta(id);
        fs::remove_file(&meta).with_context(|| format!("remove {}", meta.display()))?;
        debug!(id, "checkpoint deleted");
        Ok(true)
    }

    fn apply_retention(&self) {
        let ids: Vec<String> = match self.load_all() {
            Ok(all) => all.into_iter().map(|c| c.id).collect(),
            Err(err) => {
                warn!(err = %err, "retention skipped: cannot list checkpoints");
                return;
            }
        };
        for id in select_for_pruning(&ids, self.max_checkpoints, &self.protected) {
            match self.try_delete(id) {
                Ok(_) => debug!(id, "pruned old checkpoint"),
                Err(err) => warn!(id, err = %err, "failed to prune checkpoint"),
            }
        }
        if self.strategy == Strategy::VersionControlSnapshot {
            self.prune_shelved_changes();
        }
    }

    /// Pre-restore stashes fall under the same limit as checkpoints.
    fn prune_shelved_changes(&self) {
        if let Err(err) = vcs::prune_shelved(&self.git, self.max_checkpoints) {
            warn!(err = %err, "failed to prune pre-restore stashes");
        }
    }

    fn load(&self, id: &str) -> Result<Option<Checkpoint>> {
        if !is_valid_id(id) {
            return Ok(None);
        }
        let path = self.paths.checkpoint_meta(id);
        if !path.exists() {
            return Ok(None);
        }
        read_metadata(&path).map(Some)
    }

    fn load_all(&self) -> Result<Vec<Checkpoint>> {
        let dir = &self.paths.checkpoints_dir;
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut all = Vec::new();
        for entry in fs::read_dir(dir).with_context(|| format!("read {}", dir.display()))? {
            let path = entry.with_context(|| format!("read {}", dir.display()))?.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            match read_metadata(&path) {
                Ok(checkpoint) => all.push(checkpoint),
                Err(err) => warn!(path = %path.display(), err = %err, "skipping unreadable checkpoint"),
            }
        }
        all.sort_by(|a, b| id_sort_key(&b.id).cmp(&id_sort_key(&a.id)));
        Ok(all)
    }
}

fn probe_strategy(git: &Git) -> Strategy {
    if !git.is_work_tree() {
        return Strategy::FileBackup;
    }
    match git.head() {
        Ok(Some(_)) => Strategy::VersionControlSnapshot,
        Ok(None) => {
            debug!("repository has no commits, using file backups");
            Strategy::FileBackup
        }
        Err(err) => {
            warn!(err = %err, "cannot read HEAD, using file backups");
            Strategy::FileBackup
        }
    }
}

/// `YYYYMMDD_HHMMSS_ffffff` in UTC, with `_<n>` appended while `taken` says so.
pub fn new_checkpoint_id(now: DateTime<Utc>, taken: impl Fn(&str) -> bool) -> String {
    let base = now.format("%Y%m%d_%H%M%S_%6f").to_string();
    if !taken(&base) {
        return base;
    }
    let mut n = 1u32;
    loop {
        let candidate = format!("{base}_{n}");
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// Orders ids by timestamp, then numerically by collision suffix.
fn id_sort_key(id: &str) -> (&str, u32) {
    let mut parts = id.splitn(4, '_');
    let date = parts.next().unwrap_or_default();
    let time = parts.next().unwrap_or_default();
    let micros = parts.next().unwrap_or_default();
    let suffix = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
    let base_len = date.len() + time.len() + micros.len() + 2;
    (id.get(..base_len).unwrap_or(id), suffix)
}

/// Ids name files, so anything outside the generated alphabet is unknown.
fn is_valid_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_digit() || c == '_')
}

fn read_metadata(path: &Path) -> Result<Checkpoint> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))
}

fn write_metadata(path: &Path, checkpoint: &Checkpoint) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(checkpoint).context("serialize checkpoint")?;
    buf.push('\n');
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, buf).with_context(|| format!("write {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}
