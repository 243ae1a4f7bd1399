//! Sequential batch execution under one boundary checkpoint.
//!
//! The batch snapshots the project once, then runs every task without its own
//! checkpoint. In stop mode the first failure ends the batch and the project is
//! returned to the batch start; with `continue_on_failure` every task runs and
//! nothing is rolled back by the batch.

use tracing::{error, info, instrument, warn};

use crate::core::types::{RollbackRecord, TaskOptions, TaskResult};
use crate::error::AgentError;
use crate::orchestrator::Orchestrator;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOptions {
    pub auto_accept: bool,
    pub continue_on_failure: bool,
    /// Take the batch-start checkpoint.
    pub create_checkpoint: bool,
    pub prompt_template: String,
    pub provider_override: Option<String>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            auto_accept: false,
            continue_on_failure: false,
            create_checkpoint: true,
            prompt_template: "default".to_string(),
            provider_override: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    /// One result per executed task, in order.
    pub results: Vec<TaskResult>,
    /// The batch-start checkpoint.
    pub checkpoint_id: Option<String>,
    /// Set when the batch stopped and restored the batch start.
    pub rollback: Option<RollbackRecord>,
}

impl BatchOutcome {
    pub fn success(&self) -> bool {
        self.results.iter().all(|result| result.success)
    }

    pub fn failed_count(&self) -> usize {
        self.results.iter().filter(|result| !result.success).count()
    }
}

/// Run `tasks` in order.
///
/// Every task is validated before anything runs, so a bad template or provider
/// fails the whole batch without side effects.
#[instrument(skip_all, fields(tasks = tasks.len(), continue_on_failure = options.continue_on_failure))]
pub fn batch_execute(
    orchestrator: &mut Orchestrator,
    tasks: &[String],
    options: &BatchOptions,
) -> Result<BatchOutcome, AgentError> {
    if tasks.is_empty() {
        return Err(AgentError::configuration("batch has no tasks"));
    }
    let base = TaskOptions {
        auto_accept: options.auto_accept,
        create_checkpoint: false,
        prompt_template: options.prompt_template.clone(),
        provider_override: options.provider_override.clone(),
        auto_restore_on_failure: Some(false),
        ..TaskOptions::default()
    };
    for task in tasks {
        orchestrator.validate(task, &base)?;
    }

    let checkpoint_id = if options.create_checkpoint {
        let checkpoint =
            orchestrator.create_checkpoint(&format!("Batch start ({} tasks)", tasks.len()))?;
        orchestrator.store_mut().protect(&checkpoint.id);
        Some(checkpoint.id)
    } else {
        None
    };

    let outcome = run_tasks(orchestrator, tasks, options, &base, checkpoint_id.clone());

    if let Some(id) = &checkpoint_id {
        orchestrator.store_mut().unprotect(id);
    }
    outcome
}

fn run_tasks(
    orchestrator: &Orchestrator,
    tasks: &[String],
    options: &BatchOptions,
    base: &TaskOptions,
    checkpoint_id: Option<String>,
) -> Result<BatchOutcome, AgentError> {
    let mut outcome = BatchOutcome {
        results: Vec::with_capacity(tasks.len()),
        checkpoint_id,
        rollback: None,
    };

    for (index, task) in tasks.iter().enumerate() {
        info!(index, total = tasks.len(), "batch task starting");
        let task_options = TaskOptions {
            continue_session: index > 0,
            boundary_checkpoint: outcome.checkpoint_id.clone(),
            ..base.clone()
        };
        let result = match orchestrator.execute_task(task, &task_options) {
            Ok(result) => result,
            Err(err) => {
                return Err(abort(orchestrator, options, &outcome, index, tasks.len(), err));
            }
        };
        let failed = !result.success;
        let task_rollback = result.diagnostics.rollback.clone();
        outcome.results.push(result);

        if !failed || options.continue_on_failure {
            continue;
        }

        warn!(index, "batch task failed, stopping");
        outcome.rollback = match (task_rollback, &outcome.checkpoint_id) {
            // The task already rolled back to the batch boundary.
            (Some(record), _) => Some(record),
            (None, Some(id)) => Some(orchestrator.rollback_to(id)),
            (None, None) => None,
        };
        break;
    }

    info!(
        executed = outcome.results.len(),
        failed = outcome.failed_count(),
        "batch finished"
    );
    Ok(outcome)
}

/// A raised error ends the batch in either mode. Stop mode still returns the
/// project to the batch start before the error propagates.
fn abort(
    orchestrator: &Orchestrator,
    options: &BatchOptions,
    outcome: &BatchOutcome,
    index: usize,
    total: usize,
    err: AgentError,
) -> AgentError {
    error!(index, %err, "batch task raised an error");
    let stopped = format!("batch stopped at task {} of {total}", index + 1);
    match &outcome.checkpoint_id {
        Some(id) if !options.continue_on_failure => {
            let record = orchestrator.rollback_to(id);
            let note = if record.restored {
                format!("rolled back to checkpoint {id}")
            } else {
                format!("rollback to checkpoint {id} FAILED")
            };
            err.prefixed(format!("{stopped}; {note}"))
        }
        _ => err.prefixed(stopped),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ErrorKind;
    use crate::io::config::AgentConfig;
    use crate::provider::ProviderRegistry;
    use crate::test_support::{ScriptedProvider, ScriptedStep, TestProject};

    fn orchestrator(project: &TestProject, provider: &ScriptedProvider) -> Orchestrator {
        let mut registry = ProviderRegistry::new();
        provider.register(&mut registry);
        let config = AgentConfig {
            provider: "scripted".to_string(),
            ..AgentConfig::default()
        };
        Orchestrator::new(project.paths(), config, registry).expect("orchestrator")
    }

    fn tasks(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn stop_mode_restores_batch_start() {
        let project = TestProject::new().expect("project");
        project.write("a.txt", "a").expect("write");
        let before = project.snapshot().expect("snapshot");
        let provider = ScriptedProvider::new(
            "scripted",
            vec![
                ScriptedStep::ok("one").writing("one.txt", "1"),
                ScriptedStep::fail(ErrorKind::TaskFailure, "stuck").writing("a.txt", "broken"),
                ScriptedStep::ok("three"),
            ],
        );
        let mut orch = orchestrator(&project, &provider);

        let outcome = batch_execute(
            &mut orch,
            &tasks(&["one", "two", "three"]),
            &BatchOptions::default(),
        )
        .expect("batch");

        assert_eq!(outcome.results.len(), 2);
        assert!(!outcome.success());
        let rollback = outcome.rollback.expect("rollback");
        assert!(rollback.restored, "{:?}", rollback.detail);
        assert_eq!(Some(rollback.checkpoint_id), outcome.checkpoint_id);
        assert_eq!(project.snapshot().expect("snapshot"), before);
        assert_eq!(provider.calls(), 2);
    }

    #[test]
    fn continue_mode_runs_everything_without_rollback() {
        let project = TestProject::new().expect("project");
        let provider = ScriptedProvider::new(
            "scripted",
            vec![
                ScriptedStep::fail(ErrorKind::TaskFailure, "no").writing("x.txt", "x"),
                ScriptedStep::ok("two"),
                ScriptedStep::ok("three"),
            ],
        );
        let mut orch = orchestrator(&project, &provider);
        let outcome = batch_execute(
            &mut orch,
            &tasks(&["one", "two", "three"]),
            &BatchOptions {
                continue_on_failure: true,
                ..BatchOptions::default()
            },
        )
        .expect("batch");

        assert_eq!(outcome.results.len(), 3);
        assert_eq!(outcome.failed_count(), 1);
        assert!(outcome.rollback.is_none());
        assert_eq!(project.read("x.txt").expect("read"), "x");
    }

    #[test]
    fn tasks_share_the_batch_checkpoint_and_continue_the_session() {
        let project = TestProject::new().expect("project");
        let provider = ScriptedProvider::new(
            "scripted",
            vec![ScriptedStep::ok("1"), ScriptedStep::ok("2")],
        );
        let mut orch = orchestrator(&project, &provider);
        let outcome = batch_execute(&mut orch, &tasks(&["one", "two"]), &BatchOptions::default())
            .expect("batch");

        assert!(outcome.success());
        assert_eq!(orch.list_checkpoints(None).expect("list").len(), 1);
        for result in &outcome.results {
            assert_eq!(result.checkpoint_id, outcome.checkpoint_id);
        }
        let flags: Vec<bool> = provider
            .contexts()
            .iter()
            .map(|ctx| ctx.continue_session)
            .collect();
        assert_eq!(flags, vec![false, true]);
    }

    #[test]
    fn invalid_task_fails_before_anything_runs() {
        let project = TestProject::new().expect("project");
        let provider = ScriptedProvider::new("scripted", vec![ScriptedStep::ok("1")]);
        let mut orch = orchestrator(&project, &provider);
        let err = batch_execute(&mut orch, &tasks(&["fine", "  "]), &BatchOptions::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(provider.calls(), 0);
        assert!(orch.list_checkpoints(None).expect("list").is_empty());
    }

    #[test]
    fn raised_error_mid_batch_restores_batch_start() {
        let project = TestProject::new().expect("project");
        project.write("a.txt", "a").expect("write");
        let provider = ScriptedProvider::new(
            "scripted",
            vec![
                // The malformed conventions file breaks prompt building for task two.
                ScriptedStep::ok("one")
                    .writing("one.txt", "1")
                    .writing(".delegate/conventions.toml", "style = [unclosed"),
                ScriptedStep::ok("two"),
            ],
        );
        let mut orch = orchestrator(&project, &provider);

        let err = batch_execute(&mut orch, &tasks(&["one", "two"]), &BatchOptions::default())
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Configuration);
        let message = err.to_string();
        assert!(message.contains("batch stopped at task 2 of 2"), "{message}");
        assert!(message.contains("rolled back to checkpoint"), "{message}");
        assert!(!project.root().join("one.txt").exists());
        assert_eq!(project.read("a.txt").expect("read"), "a");
        assert_eq!(provider.calls(), 1);
    }

    #[test]
    fn raised_error_in_continue_mode_keeps_changes() {
        let project = TestProject::new().expect("project");
        let provider = ScriptedProvider::new(
            "scripted",
            vec![
                ScriptedStep::ok("one")
                    .writing("one.txt", "1")
                    .writing(".delegate/conventions.toml", "style = [unclosed"),
                ScriptedStep::ok("two"),
            ],
        );
        let mut orch = orchestrator(&project, &provider);

        let err = batch_execute(
            &mut orch,
            &tasks(&["one", "two"]),
            &BatchOptions {
                continue_on_failure: true,
                ..BatchOptions::default()
            },
        )
        .unwrap_err();

        assert!(!err.to_string().contains("rolled back"), "{err}");
        assert_eq!(project.read("one.txt").expect("read"), "1");
    }

    #[test]
    fn partial_application_rollback_is_reported_once() {
        let project = TestProject::new().expect("project");
        project.write("a.txt", "a").expect("write");
        let before = project.snapshot().expect("snapshot");
        let provider = ScriptedProvider::new(
            "scripted",
            vec![
                ScriptedStep::ok("1").writing("one.txt", "1"),
                ScriptedStep::fail(ErrorKind::PartialApplication, "half").writing("two.txt", "2"),
            ],
        );
        let mut orch = orchestrator(&project, &provider);
        let outcome = batch_execute(&mut orch, &tasks(&["one", "two"]), &BatchOptions::default())
            .expect("batch");

        assert!(outcome.results[1].rolled_back());
        assert_eq!(outcome.rollback, outcome.results[1].diagnostics.rollback);
        assert_eq!(project.snapshot().expect("snapshot"), before);
    }
}
