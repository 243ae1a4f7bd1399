//! Optional semantic search used to enrich the prompt with related code.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Result, bail};
use tracing::{debug, instrument};

use crate::io::config::SearchConfig;
use crate::io::process::run_command_with_timeout;

const OUTPUT_LIMIT_BYTES: usize = 256 * 1024;

/// Read-only source of context snippets for a task.
pub trait SearchSource {
    fn search(&self, query: &str) -> Result<Vec<String>>;
}

/// Runs `[search] command` with the task text appended; each stdout line is a snippet.
#[derive(Debug, Clone)]
pub struct CommandSearch {
    program: String,
    args: Vec<String>,
    workdir: PathBuf,
    limit: usize,
    timeout: Duration,
}

impl CommandSearch {
    /// `None` when no search command is configured.
    pub fn from_config(config: &SearchConfig, workdir: impl Into<PathBuf>) -> Option<Self> {
        let (program, args) = config.command.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
            workdir: workdir.into(),
            limit: config.limit,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }
}

impl SearchSource for CommandSearch {
    #[instrument(skip_all, fields(program = %self.program))]
    fn search(&self, query: &str) -> Result<Vec<String>> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).arg(query).current_dir(&self.workdir);
        let output = run_command_with_timeout(cmd, None, self.timeout, OUTPUT_LIMIT_BYTES)?;
        if output.timed_out {
            bail!("search command timed out after {:?}", self.timeout);
        }
        if !output.status.success() {
            bail!(
                "search command exited with {:?}: {}",
                output.status.code(),
                output.stderr_lossy().trim()
            );
        }
        let snippets: Vec<String> = String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .take(self.limit)
            .map(str::to_string)
            .collect();
        debug!(count = snippets.len(), "search snippets collected");
        Ok(snippets)
    }
}
