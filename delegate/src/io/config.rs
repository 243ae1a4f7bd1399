//! Agent configuration stored under `.delegate/agent.toml`.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// What to do when the pre-task checkpoint cannot be created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointErrorPolicy {
    /// Fail the task with a storage error before dispatching anything.
    Abort,
    /// Dispatch anyway, without a safety net, and warn loudly.
    Proceed,
}

/// Agent configuration (TOML).
///
/// Meant to be edited by humans. Missing fields default to the values below.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentConfig {
    /// Provider id used when a task does not override it.
    pub provider: String,

    /// Restore the pre-task checkpoint when a task fails.
    pub auto_restore_on_failure: bool,

    /// Checkpoints kept by retention; older ones are deleted after each create.
    pub max_checkpoints: usize,

    pub on_checkpoint_error: CheckpointErrorPolicy,

    /// Default for manual `restore`: delete files created after the checkpoint.
    pub prune_new_files_on_restore: bool,

    /// Undo commits made by a provider and fail the task.
    pub enforce_vcs_boundary: bool,

    /// Session log entries summarised into the prompt when continuing a session.
    pub session_hint_entries: usize,

    /// Default bound on one provider call, in seconds.
    pub provider_timeout_secs: u64,

    /// Bound on each git call made while checkpointing, in seconds.
    pub checkpoint_timeout_secs: u64,

    /// Truncate captured provider output beyond this many bytes.
    pub output_limit_bytes: usize,

    /// Paths (glob patterns, matched per path component) left out of file backups.
    pub ignore_patterns: Vec<String>,

    pub providers: BTreeMap<String, ProviderSettings>,

    pub search: SearchConfig,
}

/// Per-provider settings (`[providers.<id>]`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProviderSettings {
    /// Executable for CLI providers.
    pub executable: Option<String>,
    /// Extra arguments placed before the generated flags.
    pub args: Vec<String>,
    /// Write the prompt to stdin instead of passing it after `--print`.
    pub prompt_via_stdin: bool,
    /// Completion endpoint for HTTP providers.
    pub endpoint: Option<String>,
    pub model: Option<String>,
    /// Environment variable holding the bearer token.
    pub api_key_env: Option<String>,
    /// Overrides `provider_timeout_secs` for this provider.
    pub timeout_secs: Option<u64>,
}

/// Optional semantic search command (`[search]`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SearchConfig {
    /// Command to run; the task text is appended as the last argument.
    pub command: Vec<String>,
    /// Maximum snippets (stdout lines) kept.
    pub limit: usize,
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            limit: 10,
            timeout_secs: 30,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            provider: "claude-code".to_string(),
            auto_restore_on_failure: false,
            max_checkpoints: 20,
            on_checkpoint_error: CheckpointErrorPolicy::Abort,
            prune_new_files_on_restore: false,
            enforce_vcs_boundary: true,
            session_hint_entries: 3,
            provider_timeout_secs: 300,
            checkpoint_timeout_secs: 120,
            output_limit_bytes: 1_000_000,
            ignore_patterns: [".git", "node_modules", ".venv", "__pycache__", "target"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            providers: BTreeMap::new(),
            search: SearchConfig::default(),
        }
    }
}

/// Fully resolved settings handed to a provider factory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub id: String,
    pub settings: ProviderSettings,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

impl AgentConfig {
    pub fn validate(&self) -> Result<()> {
        if self.provider.trim().is_empty() {
            return Err(anyhow!("provider must be non-empty"));
        }
        if self.max_checkpoints == 0 {
            return Err(anyhow!("max_checkpoints must be > 0"));
        }
        if self.provider_timeout_secs == 0 {
            return Err(anyhow!("provider_timeout_secs must be > 0"));
        }
        if self.checkpoint_timeout_secs == 0 {
            return Err(anyhow!("checkpoint_timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        for pattern in &self.ignore_patterns {
            glob::Pattern::new(pattern)
                .with_context(|| format!("ignore_patterns entry '{pattern}'"))?;
        }
        for (id, settings) in &self.providers {
            if settings.timeout_secs == Some(0) {
                return Err(anyhow!("providers.{id}.timeout_secs must be > 0"));
            }
        }
        if !self.search.command.is_empty() && self.search.command[0].trim().is_empty() {
            return Err(anyhow!("search.command must start with a program"));
        }
        Ok(())
    }

    /// Resolve the settings for `id`, falling back to defaults when unconfigured.
    pub fn provider_config(&self, id: &str) -> ProviderConfig {
        let settings = self.providers.get(id).cloned().unwrap_or_default();
        let timeout_secs = settings.timeout_secs.unwrap_or(self.provider_timeout_secs);
        ProviderConfig {
            id: id.to_string(),
            settings,
            timeout: Duration::from_secs(timeout_secs),
            output_limit_bytes: self.output_limit_bytes,
        }
    }

    pub fn checkpoint_timeout(&self) -> Duration {
        Duration::from_secs(self.checkpoint_timeout_secs)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `AgentConfig::default()`.
pub fn load_config(path: &Path) -> Result<AgentConfig> {
    if !path.exists() {
        let cfg = AgentConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: AgentConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}
