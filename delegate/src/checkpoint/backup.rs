//! File-backup snapshots for projects outside version control.
//!
//! A snapshot is a plain copy of the project tree under
//! `checkpoints/<id>/tree/` plus `manifest.json`, which lists every copied file
//! with its size and sha256 so restores can be verified.

use std::collections::BTreeSet;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument, warn};
use walkdir::WalkDir;

use super::RestoreOutcome;
use crate::io::paths::ProjectPaths;

const MANIFEST_FILE: &str = "manifest.json";
const TREE_DIR: &str = "tree";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Path relative to the project root, `/`-separated.
    pub path: String,
    pub size: u64,
    pub sha256: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub files: Vec<ManifestEntry>,
}

/// Decides which project paths take part in a backup.
#[derive(Debug, Clone)]
pub struct IgnoreRules {
    patterns: Vec<glob::Pattern>,
}

impl IgnoreRules {
    pub fn new(patterns: &[String]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|raw| glob::Pattern::new(raw).with_context(|| format!("ignore pattern '{raw}'")))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// True if any component of `relative` matches a pattern, or it is state.
    pub fn is_ignored(&self, relative: &Path) -> bool {
        if ProjectPaths::is_state_path(relative) {
            return true;
        }
        relative.components().any(|component| {
            let name = component.as_os_str().to_string_lossy();
            self.patterns.iter().any(|pattern| pattern.matches(&name))
        })
    }
}

/// Copy the project tree into `storage_dir`. Returns the manifest written.
#[instrument(skip_all, fields(storage = %storage_dir.display()))]
pub fn create_backup(root: &Path, storage_dir: &Path, rules: &IgnoreRules) -> Result<Manifest> {
    let tree_dir = storage_dir.join(TREE_DIR);
    fs::create_dir_all(&tree_dir).with_context(|| format!("create {}", tree_dir.display()))?;

    let mut manifest = Manifest::default();
    for relative in project_files(root, rules)? {
        let source = root.join(&relative);
        let target = tree_dir.join(&relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        fs::copy(&source, &target).with_context(|| {
            format!("copy {} -> {}", source.display(), target.display())
        })?;
        let (size, sha256) = digest_file(&target)?;
        manifest.files.push(ManifestEntry {
            path: to_manifest_path(&relative),
            size,
            sha256,
        });
    }

    let manifest_path = storage_dir.join(MANIFEST_FILE);
    let mut buf = serde_json::to_string_pretty(&manifest).context("serialize manifest")?;
    buf.push('\n');
    fs::write(&manifest_path, buf).with_context(|| format!("write {}", manifest_path.display()))?;
    debug!(files = manifest.files.len(), "backup written");
    Ok(manifest)
}

/// Copy every manifest file back into the project and verify its digest.
///
/// With `prune_new_files`, files not in the manifest are deleted afterwards.
#[instrument(skip_all, fields(storage = %storage_dir.display(), prune_new_files))]
pub fn restore_backup(
    root: &Path,
    storage_dir: &Path,
    rules: &IgnoreRules,
    prune_new_files: bool,
) -> Result<RestoreOutcome> {
    let manifest = load_manifest(storage_dir)?;
    let tree_dir = storage_dir.join(TREE_DIR);
    let mut outcome = RestoreOutcome {
        restored: true,
        detail: Vec::new(),
    };

    for entry in &manifest.files {
        let relative = from_manifest_path(&entry.path)?;
        let source = tree_dir.join(&relative);
        let target = root.join(&relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        if target.is_dir() {
            fs::remove_dir_all(&target)
                .with_context(|| format!("replace directory {}", target.display()))?;
        }
        fs::copy(&source, &target).with_context(|| {
            format!("copy {} -> {}", source.display(), target.display())
        })?;
        let (size, sha256) = digest_file(&target)?;
        if size != entry.size || sha256 != entry.sha256 {
            warn!(path = %entry.path, "restored file does not match manifest");
            outcome.restored = false;
            outcome
                .detail
                .push(format!("{}: checksum mismatch after restore", entry.path));
        }
    }
    outcome
        .detail
        .push(format!("restored {} files", manifest.files.len()));

    if prune_new_files {
        let known: BTreeSet<&str> = manifest.files.iter().map(|e| e.path.as_str()).collect();
        let mut removed = 0usize;
        for relative in project_files(root, rules)? {
            if known.contains(to_manifest_path(&relative).as_str()) {
                continue;
            }
            let path = root.join(&relative);
            fs::remove_file(&path).with_context(|| format!("remove {}", path.display()))?;
            remove_empty_parents(root, &path);
            removed += 1;
        }
        if removed > 0 {
            outcome
                .detail
                .push(format!("removed {removed} files created after the checkpoint"));
        }
    }

    Ok(outcome)
}

pub fn load_manifest(storage_dir: &Path) -> Result<Manifest> {
    let path = storage_dir.join(MANIFEST_FILE);
    let raw = fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))
}

/// Regular files under `root` that are not ignored, relative and sorted.
fn project_files(root: &Path, rules: &IgnoreRules) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| match entry.path().strip_prefix(root) {
            Ok(relative) => relative.as_os_str().is_empty() || !rules.is_ignored(relative),
            Err(_) => false,
        });
    for entry in walker {
        let entry = entry.with_context(|| format!("walk {}", root.display()))?;
        if !entry.file_type().is_file() {
            if entry.file_type().is_symlink() {
                debug!(path = %entry.path().display(), "skipping symlink");
            }
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .with_context(|| format!("relativize {}", entry.path().display()))?;
        files.push(relative.to_path_buf());
    }
    Ok(files)
}

fn digest_file(path: &Path) -> Result<(u64, String)> {
    let mut file = fs::File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut size = 0u64;
    let mut chunk = [0u8; 8192];
    loop {
        let n = file
            .read(&mut chunk)
            .with_context(|| format!("read {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&chunk[..n]);
        size += n as u64;
    }
    Ok((size, hex::encode(hasher.finalize())))
}

fn remove_empty_parents(root: &Path, removed: &Path) {
    let mut dir = removed.parent();
    while let Some(current) = dir {
        if current == root || fs::remove_dir(current).is_err() {
            break;
        }
        dir = current.parent();
    }
}

fn to_manifest_path(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Manifest paths are written by us, but are still checked before joining.
fn from_manifest_path(raw: &str) -> Result<PathBuf> {
    let path = PathBuf::from(raw);
    if path.is_absolute() || raw.split('/').any(|part| part == "..") {
        return Err(anyhow!("manifest path escapes the project: {raw}"));
    }
    Ok(path)
}
