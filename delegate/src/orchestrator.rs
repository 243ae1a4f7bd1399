//! Single-task orchestration.
//!
//! One task runs through a fixed sequence:
//!
//! 1. Validate the task, template and provider (no side effects yet).
//! 2. Build the prompt from project context, conventions, search snippets and,
//!    when continuing a session, a summary of recent tasks.
//! 3. Snapshot the project (unless disabled or inherited from a batch).
//! 4. Dispatch to the provider exactly once.
//! 5. Undo commits the provider made, if the version-control boundary is on.
//! 6. Roll back on failure when configured, and always on partial application.
//! 7. Append the session log entry.
//!
//! Expected task failures come back as a failed [`TaskResult`]; only
//! configuration and storage problems are raised as [`AgentError`].

use std::path::Path;

use anyhow::Context;
use chrono::{SecondsFormat, Utc};
use tracing::{error, info, instrument, warn};

use crate::checkpoint::{Checkpoint, CheckpointStore, RestoreOutcome};
use crate::core::phase::{PhaseTrace, TaskPhase};
use crate::core::types::{ErrorKind, RollbackRecord, TaskError, TaskOptions, TaskResult};
use crate::error::AgentError;
use crate::io::config::{AgentConfig, CheckpointErrorPolicy, load_config};
use crate::io::context::load_project_context;
use crate::io::git::Git;
use crate::io::paths::ProjectPaths;
use crate::io::prompt::{PromptInputs, PromptRenderer};
use crate::io::search::{CommandSearch, SearchSource};
use crate::io::session_log::{SessionEntry, append_entry, recent_entries, session_hint};
use crate::provider::{Provider, ProviderRegistry, TaskContext};

/// Characters of the task kept in checkpoint descriptions.
const DESCRIPTION_PREVIEW_CHARS: usize = 50;

pub struct Orchestrator {
    paths: ProjectPaths,
    config: AgentConfig,
    registry: ProviderRegistry,
    store: CheckpointStore,
    renderer: PromptRenderer,
    search: Option<Box<dyn SearchSource>>,
    git: Git,
}

impl Orchestrator {
    /// Open a project: load `.delegate/agent.toml` and register built-in providers.
    pub fn open(root: &Path) -> Result<Self, AgentError> {
        let paths = ProjectPaths::new(root);
        let config = load_config(&paths.config_path)
            .map_err(|err| AgentError::configuration(format!("{err:#}")))?;
        Self::new(paths, config, ProviderRegistry::with_builtins())
    }

    pub fn new(
        paths: ProjectPaths,
        config: AgentConfig,
        registry: ProviderRegistry,
    ) -> Result<Self, AgentError> {
        config
            .validate()
            .map_err(|err| AgentError::configuration(format!("{err:#}")))?;
        let store = CheckpointStore::open(paths.clone(), &config)?;
        let renderer = PromptRenderer::new(&paths)
            .map_err(|err| AgentError::configuration(format!("{err:#}")))?;
        let search = CommandSearch::from_config(&config.search, &paths.root)
            .map(|search| Box::new(search) as Box<dyn SearchSource>);
        let git = Git::new(&paths.root).with_timeout(config.checkpoint_timeout());
        Ok(Self {
            paths,
            config,
            registry,
            store,
            renderer,
            search,
            git,
        })
    }

    /// Replace the search source (or remove it with `None`).
    pub fn with_search(mut self, search: Option<Box<dyn SearchSource>>) -> Self {
        self.search = search;
        self
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn paths(&self) -> &ProjectPaths {
        &self.paths
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut CheckpointStore {
        &mut self.store
    }

    /// Check everything that can be checked before a task has side effects,
    /// including that the provider can be built from its configuration.
    pub fn validate(&self, description: &str, options: &TaskOptions) -> Result<(), AgentError> {
        self.prepare(description, options).map(|_| ())
    }

    /// Run one task.
    #[instrument(skip_all, fields(template = %options.prompt_template))]
    pub fn execute_task(
        &self,
        description: &str,
        options: &TaskOptions,
    ) -> Result<TaskResult, AgentError> {
        let provider = self.prepare(description, options)?;
        let description = description.trim();
        let provider_id = self.provider_id(options);

        let mut warnings = Vec::new();
        let mut auto_accept = options.auto_accept;
        if auto_accept && !provider.supports_auto_accept() {
            warn!(provider = provider_id, "provider does not support auto-accept");
            warnings.push(format!(
                "provider '{provider_id}' does not support auto-accept; changes need confirmation"
            ));
            auto_accept = false;
        }

        let prompt = self.build_prompt(description, options, auto_accept, &mut warnings)?;

        let mut trace = PhaseTrace::default();
        let mut checkpoint_id = None;
        if options.create_checkpoint {
            advance(&mut trace, TaskPhase::Checkpointing);
            match self
                .store
                .create_checkpoint(&format!("Before: {}", preview(description)))
            {
                Ok(checkpoint) => checkpoint_id = Some(checkpoint.id),
                Err(err) => match self.config.on_checkpoint_error {
                    CheckpointErrorPolicy::Abort => return Err(err),
                    CheckpointErrorPolicy::Proceed => {
                        warn!(err = %err, "proceeding without a checkpoint");
                        warnings.push(format!(
                            "checkpoint failed, running without a safety net: {err}"
                        ));
                    }
                },
            }
        }
        let checkpoint_id = checkpoint_id.or_else(|| options.boundary_checkpoint.clone());
        let head_before = self.boundary_head();

        advance(&mut trace, TaskPhase::Dispatching);
        let ctx = TaskContext {
            workdir: self.paths.root.clone(),
            auto_accept,
            continue_session: options.continue_session,
        };
        info!(provider = provider_id, "dispatching task");
        advance(&mut trace, TaskPhase::AwaitingResult);
        let mut result = dispatch(provider.as_ref(), &prompt, &ctx);
        result.provider = provider_id.to_string();

        if let Some(head) = head_before {
            result = self.enforce_vcs_boundary(&head, result, &mut warnings);
        }
        result.checkpoint_id = checkpoint_id.clone();

        if result.success {
            advance(&mut trace, TaskPhase::Succeeded);
        } else {
            advance(&mut trace, TaskPhase::Failed);
            let kind = result.error_kind();
            let auto_restore = options
                .auto_restore_on_failure
                .unwrap_or(self.config.auto_restore_on_failure);
            let forced = kind.is_some_and(ErrorKind::forces_rollback);
            if auto_restore || forced {
                match &checkpoint_id {
                    Some(id) => {
                        advance(&mut trace, TaskPhase::RollingBack);
                        result.diagnostics.rollback = Some(self.rollback_to(id));
                    }
                    None => warnings.push(
                        "no checkpoint to roll back to; the project is left as the provider left it"
                            .to_string(),
                    ),
                }
            }
        }
        advance(&mut trace, TaskPhase::Idle);
        result.diagnostics.phases = trace.into_visited();

        if result.success && options.checkpoint_after {
            match self
                .store
                .create_checkpoint(&format!("After: {}", preview(description)))
            {
                Ok(checkpoint) => info!(id = %checkpoint.id, "post-task checkpoint created"),
                Err(err) => {
                    warn!(err = %err, "post-task checkpoint failed");
                    warnings.push(format!("post-task checkpoint failed: {err}"));
                }
            }
        }

        let entry = SessionEntry::from_result(now_rfc3339(), description, &result);
        if let Err(err) = append_entry(&self.paths.session_log_path, &entry) {
            warn!(err = %err, "failed to append session log");
            warnings.push(format!("session log not written: {err:#}"));
        }

        warnings.append(&mut result.diagnostics.warnings);
        result.diagnostics.warnings = warnings;
        info!(success = result.success, error = ?result.error_kind(), "task finished");
        Ok(result)
    }

    /// Restore `checkpoint_id` as part of an automatic rollback (new files pruned).
    pub fn rollback_to(&self, checkpoint_id: &str) -> RollbackRecord {
        match self.store.restore_checkpoint(checkpoint_id, true) {
            Ok(RestoreOutcome { restored, detail }) => RollbackRecord {
                checkpoint_id: checkpoint_id.to_string(),
                restored,
                detail,
            },
            Err(err) => {
                error!(checkpoint_id, err = %err, "rollback failed");
                RollbackRecord {
                    checkpoint_id: checkpoint_id.to_string(),
                    restored: false,
                    detail: vec![err.to_string()],
                }
            }
        }
    }

    pub fn create_checkpoint(&self, description: &str) -> Result<Checkpoint, AgentError> {
        self.store.create_checkpoint(description)
    }

    /// Manual restore. `prune_new_files` falls back to `prune_new_files_on_restore`.
    pub fn restore_checkpoint(
        &self,
        checkpoint_id: &str,
        prune_new_files: Option<bool>,
    ) -> Result<RestoreOutcome, AgentError> {
        let prune = prune_new_files.unwrap_or(self.config.prune_new_files_on_restore);
        self.store.restore_checkpoint(checkpoint_id, prune)
    }

    pub fn list_checkpoints(&self, limit: Option<usize>) -> Result<Vec<Checkpoint>, AgentError> {
        self.store.list_checkpoints(limit)
    }

    fn prepare(
        &self,
        description: &str,
        options: &TaskOptions,
    ) -> Result<Box<dyn Provider>, AgentError> {
        if description.trim().is_empty() {
            return Err(AgentError::configuration("task description must not be empty"));
        }
        if self.renderer.resolve(&options.prompt_template).is_none() {
            return Err(AgentError::configuration(format!(
                "unknown prompt template '{}' (built-in: {})",
                options.prompt_template,
                PromptRenderer::builtin_ids().join(", ")
            )));
        }
        let provider_id = self.provider_id(options);
        self.registry
            .create(provider_id, &self.config.provider_config(provider_id))
    }

    fn provider_id<'a>(&'a self, options: &'a TaskOptions) -> &'a str {
        options
            .provider_override
            .as_deref()
            .unwrap_or(&self.config.provider)
    }

    fn build_prompt(
        &self,
        description: &str,
        options: &TaskOptions,
        auto_accept: bool,
        warnings: &mut Vec<String>,
    ) -> Result<String, AgentError> {
        let project = load_project_context(&self.paths)
            .map_err(|err| AgentError::configuration(format!("{err:#}")))?;

        let snippets = match &self.search {
            Some(search) => match search.search(description) {
                Ok(snippets) => snippets,
                Err(err) => {
                    warn!(err = %err, "search failed, continuing without snippets");
                    warnings.push(format!("search unavailable: {err:#}"));
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        let hint = if options.continue_session {
            match recent_entries(&self.paths.session_log_path, self.config.session_hint_entries) {
                Ok(entries) => Some(session_hint(&entries)),
                Err(err) => {
                    warn!(err = %err, "session log unreadable");
                    None
                }
            }
        } else {
            None
        };

        self.renderer
            .render(
                &options.prompt_template,
                &PromptInputs {
                    task: description,
                    context: &project.context,
                    conventions: &project.conventions,
                    auto_accept,
                    continue_session: options.continue_session,
                    session_hint: hint.as_deref(),
                    snippets: &snippets,
                },
            )
            .map_err(|err| AgentError::configuration(format!("{err:#}")))
    }

    /// HEAD to guard during dispatch, when the boundary applies to this project.
    fn boundary_head(&self) -> Option<String> {
        if !self.config.enforce_vcs_boundary || !self.git.is_work_tree() {
            return None;
        }
        match self.git.head() {
            Ok(head) => head,
            Err(err) => {
                warn!(err = %err, "cannot read HEAD, version-control boundary not enforced");
                None
            }
        }
    }

    /// Soft-reset commits the provider made and fail the task.
    fn enforce_vcs_boundary(
        &self,
        head_before: &str,
        result: TaskResult,
        warnings: &mut Vec<String>,
    ) -> TaskResult {
        let head_after = match self.git.head() {
            Ok(Some(head)) => head,
            Ok(None) => return result,
            Err(err) => {
                warn!(err = %err, "cannot read HEAD after dispatch");
                return result;
            }
        };
        if head_after == head_before {
            return result;
        }

        warn!(%head_before, %head_after, "provider moved HEAD");
        let reset = self
            .git
            .reset_soft(head_before)
            .with_context(|| format!("reset HEAD to {head_before}"));
        let detail = match &reset {
            Ok(()) => format!(
                "provider created commits; HEAD reset from {} to {} with changes kept in the working tree",
                short_sha(&head_after),
                short_sha(head_before)
            ),
            Err(err) => format!("provider created commits and HEAD could not be reset: {err:#}"),
        };
        if result.success {
            result.into_failure(TaskError::new(ErrorKind::TaskFailure, detail))
        } else {
            warnings.push(detail);
            result
        }
    }
}

fn dispatch(provider: &dyn Provider, prompt: &str, ctx: &TaskContext) -> TaskResult {
    match provider.execute(prompt, ctx) {
        Ok(result) => result,
        Err(err) => {
            warn!(err = %err, "provider transport failed");
            TaskResult::failed(
                provider.id(),
                "",
                TaskError::new(ErrorKind::Transport, err.to_string()),
            )
        }
    }
}

fn advance(trace: &mut PhaseTrace, next: TaskPhase) {
    if let Err(err) = trace.advance(next) {
        error!(%err, "task phase machine violated");
    }
}

fn preview(description: &str) -> String {
    let mut chars = description.chars();
    let head: String = chars.by_ref().take(DESCRIPTION_PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

fn short_sha(sha: &str) -> &str {
    sha.get(..12).unwrap_or(sha)
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedProvider, ScriptedStep, TestProject};

    fn orchestrator(
        project: &TestProject,
        config: AgentConfig,
        provider: &ScriptedProvider,
    ) -> Orchestrator {
        let mut registry = ProviderRegistry::new();
        provider.register(&mut registry);
        Orchestrator::new(project.paths(), config, registry).expect("orchestrator")
    }

    fn config() -> AgentConfig {
        AgentConfig {
            provider: "scripted".to_string(),
            ..AgentConfig::default()
        }
    }

    #[test]
    fn preview_truncates_long_descriptions() {
        assert_eq!(preview("short"), "short");
        let long = "x".repeat(60);
        assert_eq!(preview(&long), format!("{}...", "x".repeat(50)));
    }

    #[test]
    fn success_records_checkpoint_phases_and_session() {
        let project = TestProject::new().expect("project");
        project.write("a.txt", "a").expect("write");
        let provider = ScriptedProvider::new(
            "scripted",
            vec![ScriptedStep::ok("done").writing("b.txt", "b")],
        );
        let orch = orchestrator(&project, config(), &provider);

        let result = orch
            .execute_task("add b", &TaskOptions::default())
            .expect("execute");

        assert!(result.success);
        assert_eq!(result.provider, "scripted");
        assert!(result.checkpoint_id.is_some());
        assert_eq!(
            result.diagnostics.phases,
            vec![
                TaskPhase::Idle,
                TaskPhase::Checkpointing,
                TaskPhase::Dispatching,
                TaskPhase::AwaitingResult,
                TaskPhase::Succeeded,
                TaskPhase::Idle,
            ]
        );
        let entries = recent_entries(&project.paths().session_log_path, 10).expect("log");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].task, "add b");
        assert!(entries[0].success);
        assert!(provider.prompts()[0].contains("TASK: add b"));
    }

    #[test]
    fn failure_without_auto_restore_leaves_changes() {
        let project = TestProject::new().expect("project");
        project.write("a.txt", "a").expect("write");
        let provider = ScriptedProvider::new(
            "scripted",
            vec![ScriptedStep::fail(ErrorKind::TaskFailure, "gave up").writing("a.txt", "half")],
        );
        let orch = orchestrator(&project, config(), &provider);
        let result = orch
            .execute_task("edit a", &TaskOptions::default())
            .expect("execute");
        assert!(!result.success);
        assert!(result.diagnostics.rollback.is_none());
        assert_eq!(project.read("a.txt").expect("read"), "half");
    }

    #[test]
    fn failure_with_auto_restore_rolls_back() {
        let project = TestProject::new().expect("project");
        project.write("a.txt", "a").expect("write");
        let before = project.snapshot().expect("snapshot");
        let provider = ScriptedProvider::new(
            "scripted",
            vec![
                ScriptedStep::fail(ErrorKind::Timeout, "slow")
                    .writing("a.txt", "half")
                    .writing("new/b.txt", "b"),
            ],
        );
        let orch = orchestrator(
            &project,
            AgentConfig {
                auto_restore_on_failure: true,
                ..config()
            },
            &provider,
        );
        let result = orch
            .execute_task("edit a", &TaskOptions::default())
            .expect("execute");

        assert_eq!(result.error_kind(), Some(ErrorKind::Timeout));
        assert!(result.rolled_back());
        assert_eq!(
            result.diagnostics.rollback.as_ref().map(|r| r.checkpoint_id.clone()),
            result.checkpoint_id
        );
        assert_eq!(project.snapshot().expect("snapshot"), before);
        assert_eq!(result.diagnostics.phases.last(), Some(&TaskPhase::Idle));
        assert!(result.diagnostics.phases.contains(&TaskPhase::RollingBack));
    }

    #[test]
    fn per_task_override_disables_auto_restore() {
        let project = TestProject::new().expect("project");
        project.write("a.txt", "a").expect("write");
        let provider = ScriptedProvider::new(
            "scripted",
            vec![ScriptedStep::fail(ErrorKind::TaskFailure, "no").writing("a.txt", "half")],
        );
        let orch = orchestrator(
            &project,
            AgentConfig {
                auto_restore_on_failure: true,
                ..config()
            },
            &provider,
        );
        let options = TaskOptions {
            auto_restore_on_failure: Some(false),
            ..TaskOptions::default()
        };
        let result = orch.execute_task("edit a", &options).expect("execute");
        assert!(!result.rolled_back());
        assert_eq!(project.read("a.txt").expect("read"), "half");
    }

    #[test]
    fn partial_application_always_rolls_back() {
        let project = TestProject::new().expect("project");
        project.write("a.txt", "a").expect("write");
        let before = project.snapshot().expect("snapshot");
        let provider = ScriptedProvider::new(
            "scripted",
            vec![ScriptedStep::fail(ErrorKind::PartialApplication, "stopped").writing("b.txt", "b")],
        );
        let orch = orchestrator(&project, config(), &provider);
        let result = orch
            .execute_task("add files", &TaskOptions::default())
            .expect("execute");
        assert!(result.rolled_back());
        assert_eq!(project.snapshot().expect("snapshot"), before);
    }

    #[test]
    fn transport_error_becomes_failed_result() {
        let project = TestProject::new().expect("project");
        let provider =
            ScriptedProvider::new("scripted", vec![ScriptedStep::transport("connection refused")]);
        let orch = orchestrator(&project, config(), &provider);
        let result = orch
            .execute_task("anything", &TaskOptions::default())
            .expect("execute");
        let error = result.error.expect("error");
        assert_eq!(error.kind, ErrorKind::Transport);
        assert!(error.detail.contains("connection refused"));
        assert_eq!(provider.calls(), 1);
    }

    #[test]
    fn validation_errors_have_no_side_effects() {
        let project = TestProject::new().expect("project");
        let provider = ScriptedProvider::new("scripted", vec![ScriptedStep::ok("x")]);
        let orch = orchestrator(&project, config(), &provider);

        let err = orch.execute_task("   ", &TaskOptions::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);

        let err = orch
            .execute_task(
                "task",
                &TaskOptions {
                    provider_override: Some("ghost".to_string()),
                    ..TaskOptions::default()
                },
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);

        let err = orch
            .execute_task(
                "task",
                &TaskOptions {
                    prompt_template: "missing".to_string(),
                    ..TaskOptions::default()
                },
            )
            .unwrap_err();
        assert!(err.to_string().contains("missing"));

        assert!(orch.list_checkpoints(None).expect("list").is_empty());
        assert_eq!(provider.calls(), 0);
    }

    #[test]
    fn unsupported_auto_accept_is_downgraded_with_warning() {
        let project = TestProject::new().expect("project");
        let provider =
            ScriptedProvider::new("scripted", vec![ScriptedStep::ok("ok")]).without_auto_accept();
        let orch = orchestrator(&project, config(), &provider);
        let result = orch
            .execute_task(
                "task",
                &TaskOptions {
                    auto_accept: true,
                    ..TaskOptions::default()
                },
            )
            .expect("execute");
        assert!(result.success);
        assert!(!provider.contexts()[0].auto_accept);
        assert!(result.diagnostics.warnings[0].contains("does not support auto-accept"));
    }

    #[test]
    fn skipped_checkpoint_reports_boundary() {
        let project = TestProject::new().expect("project");
        let provider = ScriptedProvider::new("scripted", vec![ScriptedStep::ok("ok")]);
        let orch = orchestrator(&project, config(), &provider);
        let result = orch
            .execute_task(
                "task",
                &TaskOptions {
                    create_checkpoint: false,
                    boundary_checkpoint: Some("20250101_000000_000000".to_string()),
                    ..TaskOptions::default()
                },
            )
            .expect("execute");
        assert_eq!(result.checkpoint_id.as_deref(), Some("20250101_000000_000000"));
        assert_eq!(result.diagnostics.phases[1], TaskPhase::Dispatching);
        assert!(orch.list_checkpoints(None).expect("list").is_empty());
    }

    #[test]
    fn provider_commit_is_undone_and_fails_task() {
        let project = TestProject::git().expect("project");
        let head = project.head().expect("head");
        let provider = ScriptedProvider::new(
            "scripted",
            vec![
                ScriptedStep::ok("committed it")
                    .writing("tracked.txt", "provider")
                    .committing("provider commit"),
            ],
        );
        let orch = orchestrator(&project, config(), &provider);
        let result = orch
            .execute_task("change tracked", &TaskOptions::default())
            .expect("execute");

        assert_eq!(result.error_kind(), Some(ErrorKind::TaskFailure));
        assert!(result.error.expect("error").detail.contains("created commits"));
        assert_eq!(project.head().expect("head"), head);
        assert_eq!(project.read("tracked.txt").expect("read"), "provider");
    }

    #[test]
    fn provider_commit_with_auto_restore_returns_to_checkpoint() {
        let project = TestProject::git().expect("project");
        let head = project.head().expect("head");
        let provider = ScriptedProvider::new(
            "scripted",
            vec![
                ScriptedStep::ok("committed it")
                    .writing("tracked.txt", "provider")
                    .writing("extra.txt", "extra")
                    .committing("provider commit"),
            ],
        );
        let orch = orchestrator(
            &project,
            AgentConfig {
                auto_restore_on_failure: true,
                ..config()
            },
            &provider,
        );
        let result = orch
            .execute_task("change tracked", &TaskOptions::default())
            .expect("execute");

        assert!(result.rolled_back(), "{:?}", result.diagnostics.rollback);
        assert_eq!(project.head().expect("head"), head);
        assert_eq!(project.read("tracked.txt").expect("read"), "base");
        assert!(!project.root().join("extra.txt").exists());
    }

    #[test]
    fn continue_session_includes_recent_tasks() {
        let project = TestProject::new().expect("project");
        let provider = ScriptedProvider::new(
            "scripted",
            vec![ScriptedStep::ok("one"), ScriptedStep::ok("two")],
        );
        let orch = orchestrator(&project, config(), &provider);
        orch.execute_task("write the parser", &TaskOptions::default())
            .expect("first");
        orch.execute_task(
            "wire the parser into main",
            &TaskOptions {
                continue_session: true,
                ..TaskOptions::default()
            },
        )
        .expect("second");

        let prompts = provider.prompts();
        assert!(!prompts[0].contains("Earlier tasks"));
        assert!(prompts[1].contains("- [ok] write the parser"));
        assert!(provider.contexts()[1].continue_session);
    }

    struct FixedSearch(anyhow::Result<Vec<String>>);

    impl SearchSource for FixedSearch {
        fn search(&self, _query: &str) -> anyhow::Result<Vec<String>> {
            match &self.0 {
                Ok(snippets) => Ok(snippets.clone()),
                Err(err) => Err(anyhow::anyhow!("{err}")),
            }
        }
    }

    #[test]
    fn search_snippets_reach_the_prompt() {
        let project = TestProject::new().expect("project");
        let provider = ScriptedProvider::new("scripted", vec![ScriptedStep::ok("ok")]);
        let orch = orchestrator(&project, config(), &provider).with_search(Some(Box::new(
            FixedSearch(Ok(vec!["src/parser.rs: fn parse".to_string()])),
        )));
        orch.execute_task("fix parse", &TaskOptions::default())
            .expect("execute");
        assert!(provider.prompts()[0].contains("- src/parser.rs: fn parse"));
    }

    #[test]
    fn search_failure_is_a_warning() {
        let project = TestProject::new().expect("project");
        let provider = ScriptedProvider::new("scripted", vec![ScriptedStep::ok("ok")]);
        let orch = orchestrator(&project, config(), &provider).with_search(Some(Box::new(
            FixedSearch(Err(anyhow::anyhow!("index offline"))),
        )));
        let result = orch
            .execute_task("fix parse", &TaskOptions::default())
            .expect("execute");
        assert!(result.success);
        assert!(
            result
                .diagnostics
                .warnings
                .iter()
                .any(|warning| warning.contains("index offline"))
        );
    }

    #[test]
    fn checkpoint_after_creates_second_checkpoint() {
        let project = TestProject::new().expect("project");
        project.write("a.txt", "a").expect("write");
        let provider = ScriptedProvider::new("scripted", vec![ScriptedStep::ok("ok")]);
        let orch = orchestrator(&project, config(), &provider);
        orch.execute_task(
            "tidy",
            &TaskOptions {
                checkpoint_after: true,
                ..TaskOptions::default()
            },
        )
        .expect("execute");
        let descriptions: Vec<String> = orch
            .list_checkpoints(None)
            .expect("list")
            .into_iter()
            .map(|c| c.description)
            .collect();
        assert_eq!(descriptions, vec!["After: tidy", "Before: tidy"]);
    }
}
