//! End-to-end orchestration scenarios through the public API.
//!
//! Each test builds a throwaway project, drives tasks and batches through the
//! orchestrator with a scripted (or HTTP-mocked) provider, and checks the
//! project tree and checkpoint store afterwards.

use std::collections::BTreeMap;

use delegate::batch::{BatchOptions, batch_execute};
use delegate::core::types::{ErrorKind, TaskOptions};
use delegate::io::config::{AgentConfig, ProviderSettings};
use delegate::orchestrator::Orchestrator;
use delegate::provider::ProviderRegistry;
use delegate::test_support::{ScriptedProvider, ScriptedStep, TestProject};
use httpmock::prelude::*;

fn scripted_config() -> AgentConfig {
    AgentConfig {
        provider: "scripted".to_string(),
        ..AgentConfig::default()
    }
}

fn orchestrator(
    project: &TestProject,
    config: AgentConfig,
    provider: &ScriptedProvider,
) -> Orchestrator {
    let mut registry = ProviderRegistry::with_builtins();
    provider.register(&mut registry);
    Orchestrator::new(project.paths(), config, registry).expect("orchestrator")
}

/// A failed task with auto-restore leaves every file as it was, new files included.
#[test]
fn auto_restore_returns_tree_to_pre_task_state() {
    let project = TestProject::new().expect("project");
    project.write("src/lib.rs", "pub fn a() {}\n").expect("write");
    project.write("README.md", "readme").expect("write");
    let before = project.snapshot().expect("snapshot");

    let provider = ScriptedProvider::new(
        "scripted",
        vec![
            ScriptedStep::fail(ErrorKind::TaskFailure, "tests still fail")
                .writing("src/lib.rs", "pub fn a() { broken }\n")
                .writing("src/new.rs", "// new\n"),
        ],
    );
    let orch = orchestrator(
        &project,
        AgentConfig {
            auto_restore_on_failure: true,
            ..scripted_config()
        },
        &provider,
    );

    let result = orch
        .execute_task("refactor a", &TaskOptions::default())
        .expect("execute");

    assert!(!result.success);
    assert!(result.rolled_back());
    assert_eq!(project.snapshot().expect("snapshot"), before);
}

/// Same guarantee on a git project, where checkpoints are stash snapshots.
#[test]
fn auto_restore_in_git_project_keeps_uncommitted_work() {
    let project = TestProject::git().expect("project");
    project.write("tracked.txt", "operator edit").expect("write");
    project.write("notes.txt", "untracked notes").expect("write");
    let before = project.snapshot().expect("snapshot");

    let provider = ScriptedProvider::new(
        "scripted",
        vec![
            ScriptedStep::fail(ErrorKind::Timeout, "slow")
                .writing("tracked.txt", "provider edit")
                .writing("generated.txt", "junk"),
        ],
    );
    let orch = orchestrator(
        &project,
        AgentConfig {
            auto_restore_on_failure: true,
            ..scripted_config()
        },
        &provider,
    );

    let result = orch
        .execute_task("edit tracked", &TaskOptions::default())
        .expect("execute");

    assert!(result.rolled_back(), "{:?}", result.diagnostics.rollback);
    assert_eq!(project.snapshot().expect("snapshot"), before);
}

#[test]
fn unknown_provider_is_configuration_error_without_checkpoint() {
    let project = TestProject::new().expect("project");
    project.write("a.txt", "a").expect("write");
    let provider = ScriptedProvider::new("scripted", Vec::new());
    let orch = orchestrator(&project, scripted_config(), &provider);

    let err = orch
        .execute_task(
            "anything",
            &TaskOptions {
                provider_override: Some("ghost".to_string()),
                ..TaskOptions::default()
            },
        )
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(err.to_string().contains("ghost"));
    assert!(orch.list_checkpoints(None).expect("list").is_empty());
    assert!(!project.paths().checkpoints_dir.exists());
}

#[test]
fn empty_description_is_configuration_error_before_checkpoint() {
    let project = TestProject::new().expect("project");
    let provider = ScriptedProvider::new("scripted", Vec::new());
    let orch = orchestrator(&project, scripted_config(), &provider);

    let err = orch.execute_task("", &TaskOptions::default()).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(orch.list_checkpoints(None).expect("list").is_empty());
}

#[test]
fn retention_keeps_most_recent_checkpoints() {
    let project = TestProject::new().expect("project");
    project.write("a.txt", "a").expect("write");
    let provider = ScriptedProvider::new("scripted", Vec::new());
    let orch = orchestrator(
        &project,
        AgentConfig {
            max_checkpoints: 3,
            ..scripted_config()
        },
        &provider,
    );

    let ids: Vec<String> = (0..4)
        .map(|n| orch.create_checkpoint(&format!("cp {n}")).expect("create").id)
        .collect();

    let listed: Vec<String> = orch
        .list_checkpoints(None)
        .expect("list")
        .into_iter()
        .map(|checkpoint| checkpoint.id)
        .collect();
    assert_eq!(listed.len(), 3);
    assert!(!listed.contains(&ids[0]));
    assert_eq!(listed[0], ids[3]);
}

#[test]
fn listed_checkpoint_carries_description() {
    let project = TestProject::new().expect("project");
    let provider = ScriptedProvider::new("scripted", Vec::new());
    let orch = orchestrator(&project, scripted_config(), &provider);

    orch.create_checkpoint("x").expect("create");

    let descriptions: Vec<String> = orch
        .list_checkpoints(None)
        .expect("list")
        .into_iter()
        .map(|checkpoint| checkpoint.description)
        .collect();
    assert_eq!(descriptions, vec!["x"]);
}

#[test]
fn manual_restore_keeps_new_files_unless_pruning() {
    let project = TestProject::new().expect("project");
    project.write("a.txt", "a").expect("write");
    let provider = ScriptedProvider::new("scripted", Vec::new());
    let orch = orchestrator(&project, scripted_config(), &provider);
    let checkpoint = orch.create_checkpoint("manual").expect("create");

    project.write("a.txt", "changed").expect("write");
    project.write("later.txt", "later").expect("write");

    let outcome = orch
        .restore_checkpoint(&checkpoint.id, None)
        .expect("restore");
    assert!(outcome.restored, "{:?}", outcome.detail);
    assert_eq!(project.read("a.txt").expect("read"), "a");
    assert!(project.root().join("later.txt").exists());

    let outcome = orch
        .restore_checkpoint(&checkpoint.id, Some(true))
        .expect("restore");
    assert!(outcome.restored);
    assert!(!project.root().join("later.txt").exists());
}

#[test]
fn batch_stops_at_failure_and_restores_batch_start() {
    let project = TestProject::new().expect("project");
    project.write("main.rs", "fn main() {}\n").expect("write");
    let before = project.snapshot().expect("snapshot");

    let provider = ScriptedProvider::new(
        "scripted",
        vec![
            ScriptedStep::ok("step 1").writing("one.rs", "// 1\n"),
            ScriptedStep::ok("step 2").writing("main.rs", "fn main() { two() }\n"),
            ScriptedStep::fail(ErrorKind::TaskFailure, "cannot do 3").writing("three.rs", "// 3\n"),
            ScriptedStep::ok("step 4"),
        ],
    );
    let mut orch = orchestrator(&project, scripted_config(), &provider);
    let tasks: Vec<String> = ["one", "two", "three", "four"]
        .iter()
        .map(|task| task.to_string())
        .collect();

    let outcome = batch_execute(&mut orch, &tasks, &BatchOptions::default()).expect("batch");

    assert_eq!(outcome.results.len(), 3);
    assert!(outcome.results[0].success && outcome.results[1].success);
    assert!(!outcome.results[2].success);
    assert!(outcome.rollback.as_ref().is_some_and(|record| record.restored));
    assert_eq!(project.snapshot().expect("snapshot"), before);
    assert_eq!(provider.calls(), 3);
}

#[test]
fn batch_with_misconfigured_provider_fails_before_checkpoint() {
    let project = TestProject::new().expect("project");
    project.write("a.txt", "a").expect("write");
    let provider = ScriptedProvider::new("scripted", Vec::new());
    let mut orch = orchestrator(&project, scripted_config(), &provider);
    let tasks: Vec<String> = vec!["one".into(), "two".into()];

    // http-api without an endpoint cannot be built.
    let err = batch_execute(
        &mut orch,
        &tasks,
        &BatchOptions {
            provider_override: Some("http-api".to_string()),
            ..BatchOptions::default()
        },
    )
    .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(err.to_string().contains("endpoint"), "{err}");
    assert!(orch.list_checkpoints(None).expect("list").is_empty());
    assert!(!project.paths().checkpoints_dir.exists());
}

#[test]
fn batch_continue_on_failure_runs_all_without_rollback() {
    let project = TestProject::new().expect("project");
    let provider = ScriptedProvider::new(
        "scripted",
        vec![
            ScriptedStep::ok("1").writing("one.txt", "1"),
            ScriptedStep::fail(ErrorKind::TaskFailure, "2").writing("two.txt", "2"),
            ScriptedStep::ok("3").writing("three.txt", "3"),
        ],
    );
    let mut orch = orchestrator(&project, scripted_config(), &provider);
    let tasks: Vec<String> = vec!["one".into(), "two".into(), "three".into()];

    let outcome = batch_execute(
        &mut orch,
        &tasks,
        &BatchOptions {
            continue_on_failure: true,
            ..BatchOptions::default()
        },
    )
    .expect("batch");

    assert_eq!(outcome.results.len(), 3);
    assert!(outcome.rollback.is_none());
    for file in ["one.txt", "two.txt", "three.txt"] {
        assert!(project.root().join(file).exists(), "{file}");
    }
}

/// Two creates followed by a malformed object: both files land, the task is a
/// partial application, and the forced rollback removes them again.
#[test]
fn http_partial_application_is_rolled_back() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/v1/complete");
        then.status(200).body(
            r#"Creating the module.
{"action": "create", "file": "src/parser.rs", "content": "pub fn parse() {}"}
{"action": "create", "file": "src/lexer.rs", "content": "pub fn lex() {}"}
{"action": "edit", "file": "src/lib.rs"}"#,
        );
    });

    let project = TestProject::new().expect("project");
    project.write("src/lib.rs", "mod old;\n").expect("write");
    let before = project.snapshot().expect("snapshot");

    let config = AgentConfig {
        provider: "http-api".to_string(),
        providers: BTreeMap::from([(
            "http-api".to_string(),
            ProviderSettings {
                endpoint: Some(server.url("/v1/complete")),
                ..ProviderSettings::default()
            },
        )]),
        ..AgentConfig::default()
    };
    let orch = Orchestrator::new(project.paths(), config, ProviderRegistry::with_builtins())
        .expect("orchestrator");

    let result = orch
        .execute_task(
            "add a parser",
            &TaskOptions {
                auto_accept: true,
                ..TaskOptions::default()
            },
        )
        .expect("execute");

    assert_eq!(result.error_kind(), Some(ErrorKind::PartialApplication));
    assert_eq!(result.diagnostics.applied_operations.len(), 2);
    assert!(result.rolled_back(), "{:?}", result.diagnostics.rollback);
    assert!(!project.root().join("src/parser.rs").exists());
    assert!(!project.root().join("src/lexer.rs").exists());
    assert_eq!(project.snapshot().expect("snapshot"), before);
}

#[test]
fn provider_commits_are_undone() {
    let project = TestProject::git().expect("project");
    let head = project.head().expect("head");
    let provider = ScriptedProvider::new(
        "scripted",
        vec![
            ScriptedStep::ok("done and committed")
                .writing("feature.txt", "feature")
                .committing("add feature"),
        ],
    );
    let orch = orchestrator(&project, scripted_config(), &provider);

    let result = orch
        .execute_task("add feature", &TaskOptions::default())
        .expect("execute");

    assert_eq!(result.error_kind(), Some(ErrorKind::TaskFailure));
    assert_eq!(project.head().expect("head"), head);
    assert_eq!(project.read("feature.txt").expect("read"), "feature");
}
