//! Provider that asks an HTTP model API for file operations and applies them.
//!
//! The request carries one prompt string. The response text is scanned for
//! file operations (see [`crate::core::file_ops`]) which are applied in order
//! under the project root. Application stops at the first malformed object or
//! failing operation; stopping after some operations succeeded is a partial
//! application, which the orchestrator always rolls back.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use reqwest::blocking::Client;
use serde_json::{Value, json};
use tracing::{debug, info, instrument, warn};

use super::{Provider, TaskContext, TransportError};
use crate::core::file_ops::{FileAction, FileOperation, check_target_path, scan_operations};
use crate::core::types::{Capability, ErrorKind, TaskError, TaskResult};
use crate::io::config::ProviderConfig;

const DEFAULT_MODEL: &str = "default";

/// Appended to every prompt so the model answers in the operation format.
const OPERATION_INSTRUCTIONS: &str = r#"

## Response format

Describe your plan briefly, then emit one JSON object per file change, in the
order they must be applied:

{"action": "create", "file": "relative/path", "content": "full file contents"}
{"action": "edit", "file": "relative/path", "content": "full new file contents"}
{"action": "delete", "file": "relative/path"}

Paths are relative to the project root. `create` requires that the file does
not exist yet; `edit` and `delete` require that it does."#;

/// Envelope fields some APIs wrap the completion text in.
const TEXT_FIELDS: [&str; 4] = ["output", "completion", "text", "content"];

pub struct HttpProvider {
    id: String,
    endpoint: String,
    model: String,
    api_key_env: Option<String>,
    client: Client,
}

impl HttpProvider {
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        let endpoint = config
            .settings
            .endpoint
            .clone()
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| anyhow!("providers.{}.endpoint is required", config.id))?;
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .context("build http client")?;
        Ok(Self {
            id: config.id.clone(),
            endpoint,
            model: config
                .settings
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            api_key_env: config.settings.api_key_env.clone(),
            client,
        })
    }

    fn failed(&self, output: impl Into<String>, kind: ErrorKind, detail: impl Into<String>) -> TaskResult {
        TaskResult::failed(&self.id, output, TaskError::new(kind, detail))
    }
}

impl Provider for HttpProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn capabilities(&self) -> BTreeSet<Capability> {
        BTreeSet::from([
            Capability::FileEdit,
            Capability::FileCreate,
            Capability::AutoAccept,
        ])
    }

    #[instrument(skip_all, fields(provider = %self.id, endpoint = %self.endpoint))]
    fn execute(&self, prompt: &str, ctx: &TaskContext) -> Result<TaskResult, TransportError> {
        let body = json!({
            "model": self.model,
            "prompt": format!("{prompt}{OPERATION_INSTRUCTIONS}"),
        });
        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(var) = &self.api_key_env {
            match std::env::var(var) {
                Ok(token) if !token.is_empty() => request = request.bearer_auth(token),
                _ => warn!(var, "api key variable is not set, sending without auth"),
            }
        }

        info!("sending completion request");
        let response = match request.send() {
            Ok(response) => response,
            Err(err) if err.is_timeout() => {
                return Ok(self.failed("", ErrorKind::Timeout, format!("request timed out: {err}")));
            }
            Err(err) => return Err(transport_error(&self.endpoint, &err)),
        };
        let status = response.status();
        let text = match response.text() {
            Ok(text) => text,
            Err(err) if err.is_timeout() => {
                return Ok(self.failed("", ErrorKind::Timeout, format!("response timed out: {err}")));
            }
            Err(err) => return Err(transport_error(&self.endpoint, &err)),
        };
        if !status.is_success() {
            warn!(%status, "completion request rejected");
            return Ok(self.failed(
                text.clone(),
                ErrorKind::TaskFailure,
                format!("{} returned {status}: {}", self.endpoint, text.trim()),
            ));
        }

        let completion = completion_text(&text);
        Ok(self.apply_completion(completion, ctx))
    }
}

impl HttpProvider {
    fn apply_completion(&self, completion: String, ctx: &TaskContext) -> TaskResult {
        let scan = match scan_operations(&completion) {
            Ok(scan) => scan,
            Err(err) => {
                return self.failed(completion, ErrorKind::TaskFailure, format!("{err:#}"));
            }
        };
        debug!(
            operations = scan.operations.len(),
            malformed = scan.malformed.is_some(),
            "response scanned"
        );

        if !ctx.auto_accept {
            if let Some(reason) = scan.malformed {
                return self.failed(completion, ErrorKind::TaskFailure, reason);
            }
            let planned: Vec<String> = scan.operations.iter().map(|op| format!("- {op}")).collect();
            let mut output = completion;
            if !planned.is_empty() {
                output.push_str("\n\nPlanned operations (not applied without auto-accept):\n");
                output.push_str(&planned.join("\n"));
            }
            let mut result = TaskResult::succeeded(&self.id, output);
            if !planned.is_empty() {
                info!(planned = planned.len(), "dry run, operations not applied");
                result.diagnostics.dry_run = Some(planned.len());
            }
            return result;
        }

        let total = scan.operations.len();
        let mut applied = Vec::new();
        let mut stopped = None;
        for op in &scan.operations {
            if let Err(reason) = apply_operation(&ctx.workdir, op) {
                warn!(%op, reason = %reason, "file operation failed");
                stopped = Some(format!("{op} failed: {reason}"));
                break;
            }
            debug!(%op, "file operation applied");
            applied.push(op.to_string());
        }
        let stopped = stopped.or(scan.malformed);

        let mut result = match stopped {
            None => TaskResult::succeeded(&self.id, completion),
            Some(reason) if applied.is_empty() => {
                self.failed(completion, ErrorKind::TaskFailure, reason)
            }
            Some(reason) => self.failed(
                completion,
                ErrorKind::PartialApplication,
                format!("applied {} of {total} operations, then {reason}", applied.len()),
            ),
        };
        result.diagnostics.applied_operations = applied;
        result
    }
}

fn transport_error(endpoint: &str, err: &reqwest::Error) -> TransportError {
    TransportError::Unreachable {
        endpoint: endpoint.to_string(),
        message: err.to_string(),
    }
}

/// Unwrap a JSON envelope (`{"output": "..."}` and similar) when present.
fn completion_text(body: &str) -> String {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
        for field in TEXT_FIELDS {
            if let Some(Value::String(text)) = map.get(field) {
                return text.clone();
            }
        }
    }
    body.to_string()
}

fn apply_operation(root: &Path, op: &FileOperation) -> Result<(), String> {
    check_target_path(&op.file)?;
    apply_checked(root, op).map_err(|err| format!("{err:#}"))
}

fn apply_checked(root: &Path, op: &FileOperation) -> Result<()> {
    let path = root.join(&op.file);
    match op.action {
        FileAction::Create => {
            if path.exists() {
                bail!("{} already exists", op.file);
            }
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("create {}", parent.display()))?;
            }
            fs::write(&path, op.content.as_deref().unwrap_or_default())
                .with_context(|| format!("write {}", op.file))?;
        }
        FileAction::Edit => {
            if !path.is_file() {
                bail!("{} does not exist", op.file);
            }
            fs::write(&path, op.content.as_deref().unwrap_or_default())
                .with_context(|| format!("write {}", op.file))?;
        }
        FileAction::Delete => {
            if !path.is_file() {
                bail!("{} does not exist", op.file);
            }
            fs::remove_file(&path).with_context(|| format!("delete {}", op.file))?;
        }
    }
    Ok(())
}
