//! Provider that shells out to a coding-assistant CLI.
//!
//! Invocation: `<executable> [args] [--auto-accept] [--continue] --print <prompt>`,
//! run in the project directory. With `prompt_via_stdin` the prompt is written
//! to stdin instead of following `--print`. Exit 0 is success; anything else is
//! a task failure carrying stderr.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use super::{Provider, TaskContext, TransportError};
use crate::core::types::{Capability, ErrorKind, TaskError, TaskResult};
use crate::io::config::ProviderConfig;
use crate::io::process::{SpawnError, run_command_with_timeout};

#[derive(Debug, Clone)]
pub struct CliProvider {
    id: String,
    executable: PathBuf,
    args: Vec<String>,
    prompt_via_stdin: bool,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl CliProvider {
    /// Build from settings, using `default_executable` when none is configured.
    pub fn from_config(config: &ProviderConfig, default_executable: &str) -> Self {
        let executable = config
            .settings
            .executable
            .clone()
            .unwrap_or_else(|| default_executable.to_string());
        Self {
            id: config.id.clone(),
            executable: PathBuf::from(executable),
            args: config.settings.args.clone(),
            prompt_via_stdin: config.settings.prompt_via_stdin,
            timeout: config.timeout,
            output_limit_bytes: config.output_limit_bytes,
        }
    }

    fn command(&self, prompt: &str, ctx: &TaskContext) -> Command {
        let mut cmd = Command::new(&self.executable);
        cmd.args(&self.args);
        if ctx.auto_accept {
            cmd.arg("--auto-accept");
        }
        if ctx.continue_session {
            cmd.arg("--continue");
        }
        cmd.arg("--print");
        if !self.prompt_via_stdin {
            cmd.arg(prompt);
        }
        cmd.current_dir(&ctx.workdir);
        cmd
    }
}

impl Provider for CliProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn capabilities(&self) -> BTreeSet<Capability> {
        BTreeSet::from([
            Capability::FileEdit,
            Capability::FileCreate,
            Capability::Terminal,
            Capability::Search,
            Capability::AutoAccept,
        ])
    }

    #[instrument(skip_all, fields(provider = %self.id, timeout_secs = self.timeout.as_secs()))]
    fn execute(&self, prompt: &str, ctx: &TaskContext) -> Result<TaskResult, TransportError> {
        info!(executable = %self.executable.display(), "starting provider cli");
        let stdin = self.prompt_via_stdin.then_some(prompt.as_bytes());
        let output = match run_command_with_timeout(
            self.command(prompt, ctx),
            stdin,
            self.timeout,
            self.output_limit_bytes,
        ) {
            Ok(output) => output,
            Err(err) => {
                return Err(match err.downcast::<SpawnError>() {
                    Ok(spawn) => TransportError::Spawn {
                        program: spawn.program,
                        source: spawn.source,
                    },
                    Err(other) => TransportError::Other(format!("{other:#}")),
                });
            }
        };

        let stdout = output.stdout_lossy();
        if output.timed_out {
            warn!("provider cli timed out");
            return Ok(TaskResult::failed(
                &self.id,
                stdout,
                TaskError::new(
                    ErrorKind::Timeout,
                    format!("{} timed out after {:?}", self.executable.display(), self.timeout),
                ),
            ));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "provider cli failed");
            let stderr = output.stderr_lossy();
            let detail = match stderr.trim() {
                "" => format!("exited with status {:?}", output.status.code()),
                text => text.to_string(),
            };
            return Ok(TaskResult::failed(
                &self.id,
                stdout,
                TaskError::new(ErrorKind::TaskFailure, detail),
            ));
        }

        debug!(output_len = stdout.len(), "provider cli completed");
        Ok(TaskResult::succeeded(&self.id, stdout))
    }
}
