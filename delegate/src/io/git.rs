//! Git adapter for checkpoints and the version-control boundary.
//!
//! Checkpoints shelve changes with `git stash` and must never lose operator
//! work, so we keep a small, explicit wrapper around `git` subprocess calls.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};

use crate::io::process::{CommandOutput, run_command_with_timeout};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
const OUTPUT_LIMIT_BYTES: usize = 4 * 1024 * 1024;

/// Parsed `git status --porcelain` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    /// 2-letter XY code, or "??" for untracked.
    pub code: String,
    /// Path for the changed file.
    pub path: String,
}

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
    timeout: Duration,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// True if the workdir is inside a git work tree (false if git is missing).
    pub fn is_work_tree(&self) -> bool {
        match self.run(&["rev-parse", "--is-inside-work-tree"]) {
            Ok(out) => out.status.success() && String::from_utf8_lossy(&out.stdout).trim() == "true",
            Err(err) => {
                debug!(err = %err, "git probe failed");
                false
            }
        }
    }

    /// Current HEAD commit, or `None` for a repository without commits.
    pub fn head(&self) -> Result<Option<String>> {
        self.rev_parse_optional("HEAD")
    }

    /// Get status entries (including untracked) in porcelain format.
    pub fn status_porcelain(&self) -> Result<Vec<StatusEntry>> {
        let out = self.run_capture(&["status", "--porcelain=v1", "-uall"])?;
        let mut entries = Vec::new();
        for line in out.lines() {
            if line.trim().is_empty() {
                continue;
            }
            entries.push(parse_status_line(line)?);
        }
        Ok(entries)
    }

    /// Status entries whose path does not start with any of `excluded_prefixes`.
    pub fn changes_except_prefixes(&self, excluded_prefixes: &[&str]) -> Result<Vec<StatusEntry>> {
        Ok(self
            .status_porcelain()?
            .into_iter()
            .filter(|entry| {
                !excluded_prefixes
                    .iter()
                    .any(|prefix| entry.path.starts_with(prefix))
            })
            .collect())
    }

    /// Shelve tracked and untracked changes under `message`, leaving `excluded`
    /// paths alone. Returns the new stash commit, or `None` if nothing was shelved.
    #[instrument(skip_all, fields(message))]
    pub fn stash_push(&self, message: &str, excluded: &[&str]) -> Result<Option<String>> {
        let before = self.stash_top()?;
        let excludes: Vec<String> = excluded
            .iter()
            .map(|path| format!(":(exclude){path}"))
            .collect();
        let mut args = vec!["stash", "push", "--include-untracked", "-m", message, "--", "."];
        args.extend(excludes.iter().map(String::as_str));
        self.run_checked(&args)?;
        let after = self.stash_top()?;
        if after == before {
            debug!("nothing to stash");
            return Ok(None);
        }
        debug!(stash = ?after, "stash created");
        Ok(after)
    }

    /// Apply a stash commit onto the working tree and index, keeping the stash
    /// entry. Staged changes come back staged.
    #[instrument(skip_all, fields(commit))]
    pub fn stash_apply(&self, commit: &str) -> Result<()> {
        self.run_checked(&["stash", "apply", "--index", commit])?;
        Ok(())
    }

    /// Stash entries, newest first, as `(commit, subject)`.
    pub fn stash_entries(&self) -> Result<Vec<(String, String)>> {
        let listing = self.run_capture(&["stash", "list", "--format=%H %gs"])?;
        Ok(listing
            .lines()
            .filter_map(|line| line.split_once(' '))
            .map(|(commit, subject)| (commit.to_string(), subject.to_string()))
            .collect())
    }

    /// Drop the stash entry whose commit is `commit`. Returns false if absent.
    #[instrument(skip_all, fields(commit))]
    pub fn stash_drop(&self, commit: &str) -> Result<bool> {
        let listing = self.run_capture(&["stash", "list", "--format=%H"])?;
        let Some(index) = listing.lines().position(|line| line.trim() == commit) else {
            warn!(commit, "stash entry not found");
            return Ok(false);
        };
        self.run_checked(&["stash", "drop", &format!("stash@{{{index}}}")])?;
        Ok(true)
    }

    /// Discard every change under the workdir except `excluded` paths, returning
    /// tracked files to HEAD and deleting untracked (non-ignored) files.
    #[instrument(skip_all)]
    pub fn discard_changes(&self, excluded: &[&str]) -> Result<()> {
        self.run_checked(&["reset", "-q", "HEAD", "--", "."])?;
        self.run_checked(&["checkout", "--", "."])?;
        let mut args = vec!["clean", "-fd"];
        for path in excluded {
            args.push("-e");
            args.push(*path);
        }
        args.extend(["--", "."]);
        self.run_checked(&args)?;
        Ok(())
    }

    /// Move HEAD back to `commit`, keeping index and working tree.
    #[instrument(skip_all, fields(commit))]
    pub fn reset_soft(&self, commit: &str) -> Result<()> {
        self.run_checked(&["reset", "--soft", commit])?;
        Ok(())
    }

    fn stash_top(&self) -> Result<Option<String>> {
        self.rev_parse_optional("refs/stash")
    }

    fn rev_parse_optional(&self, rev: &str) -> Result<Option<String>> {
        let out = self.run(&["rev-parse", "-q", "--verify", rev])?;
        if !out.status.success() {
            return Ok(None);
        }
        let sha = String::from_utf8_lossy(&out.stdout).trim().to_string();
        Ok((!sha.is_empty()).then_some(sha))
    }

    fn run_capture(&self, args: &[&str]) -> Result<String> {
        let output = self.run_checked(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn run_checked(&self, args: &[&str]) -> Result<CommandOutput> {
        let output = self.run(args)?;
        if output.timed_out {
            return Err(anyhow!(
                "git {} timed out after {:?}",
                args.join(" "),
                self.timeout
            ));
        }
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<CommandOutput> {
        let mut cmd = Command::new("git");
        cmd.args(args).current_dir(&self.workdir);
        run_command_with_timeout(cmd, None, self.timeout, OUTPUT_LIMIT_BYTES)
            .with_context(|| format!("run git {}", args.join(" ")))
    }
}

fn parse_status_line(line: &str) -> Result<StatusEntry> {
    if let Some(path) = line.strip_prefix("?? ") {
        return Ok(StatusEntry {
            code: "??".to_string(),
            path: unquote(path.trim()),
        });
    }
    if line.len() < 4 {
        return Err(anyhow!("unexpected porcelain line: '{line}'"));
    }
    let code = line[..2].to_string();
    let mut path = line[3..].trim().to_string();
    if let Some((_, new)) = path.split_once("->") {
        path = new.trim().to_string();
    }
    Ok(StatusEntry {
        code,
        path: unquote(&path),
    })
}

/// Porcelain quotes paths with special characters.
fn unquote(path: &str) -> String {
    path.strip_prefix('"')
        .and_then(|p| p.strip_suffix('"'))
        .unwrap_or(path)
        .to_string()
}
