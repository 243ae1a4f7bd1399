//! Delegate coding tasks to an external provider behind a checkpoint.
//!
//! Every task snapshots the project first (git stash or file backup), so a
//! failed or half-applied change can be rolled back. State lives in
//! `.delegate/` inside the project.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use delegate::batch::{BatchOptions, batch_execute};
use delegate::core::types::TaskOptions;
use delegate::exit_codes;
use delegate::interactive::run_interactive;
use delegate::logging;
use delegate::orchestrator::Orchestrator;
use delegate::report;

#[derive(Parser)]
#[command(
    name = "delegate",
    version,
    about = "Checkpointed delegation of coding tasks to external providers"
)]
struct Cli {
    /// Project directory (defaults to the current directory).
    #[arg(long, global = true, default_value = ".")]
    project: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one task.
    Task {
        description: String,
        /// Let the provider apply changes without confirmation.
        #[arg(long)]
        auto_accept: bool,
        /// Do not snapshot the project first.
        #[arg(long)]
        no_checkpoint: bool,
        /// Snapshot the project again after a successful task.
        #[arg(long)]
        checkpoint_after: bool,
        /// Prompt template (default, refactor, feature, debug, or a project override).
        #[arg(long, default_value = "default")]
        template: String,
        /// Provider id instead of the configured one.
        #[arg(long)]
        provider: Option<String>,
        /// Continue the provider's previous session.
        #[arg(long = "continue")]
        continue_session: bool,
    },
    /// Run the tasks in a file (one per line, `#` comments) under one checkpoint.
    Batch {
        file: PathBuf,
        #[arg(long)]
        auto_accept: bool,
        /// Run every task even after a failure, without rolling back.
        #[arg(long)]
        continue_on_failure: bool,
        #[arg(long)]
        no_checkpoint: bool,
        #[arg(long, default_value = "default")]
        template: String,
        #[arg(long)]
        provider: Option<String>,
    },
    /// Read commands from stdin until `exit`.
    Interactive {
        #[arg(long)]
        auto_accept: bool,
        #[arg(long, default_value = "default")]
        template: String,
        #[arg(long)]
        provider: Option<String>,
    },
    /// Snapshot the project now.
    Checkpoint {
        #[arg(default_value = "Manual checkpoint")]
        description: String,
    },
    /// Restore a checkpoint.
    Restore {
        id: String,
        /// Delete files created after the checkpoint.
        #[arg(long)]
        prune_new_files: bool,
    },
    /// List checkpoints, newest first.
    List {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// List registered providers and their capabilities.
    Providers,
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::FAILED);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let orchestrator = Orchestrator::open(&cli.project)?;
    match cli.command {
        Command::Task {
            description,
            auto_accept,
            no_checkpoint,
            checkpoint_after,
            template,
            provider,
            continue_session,
        } => {
            let options = TaskOptions {
                auto_accept,
                create_checkpoint: !no_checkpoint,
                checkpoint_after,
                prompt_template: template,
                continue_session,
                provider_override: provider,
                ..TaskOptions::default()
            };
            let result = orchestrator.execute_task(&description, &options)?;
            print!("{}", report::task_summary(&result));
            Ok(status(result.success))
        }
        Command::Batch {
            file,
            auto_accept,
            continue_on_failure,
            no_checkpoint,
            template,
            provider,
        } => {
            let tasks = read_batch_file(&file)?;
            let options = BatchOptions {
                auto_accept,
                continue_on_failure,
                create_checkpoint: !no_checkpoint,
                prompt_template: template,
                provider_override: provider,
            };
            let mut orchestrator = orchestrator;
            let outcome = batch_execute(&mut orchestrator, &tasks, &options)?;
            print!("{}", report::batch_summary(&outcome));
            Ok(status(outcome.success()))
        }
        Command::Interactive {
            auto_accept,
            template,
            provider,
        } => {
            let base = TaskOptions {
                auto_accept,
                prompt_template: template,
                provider_override: provider,
                ..TaskOptions::default()
            };
            run_interactive(&orchestrator, io::stdin().lock(), io::stdout(), &base)?;
            Ok(exit_codes::OK)
        }
        Command::Checkpoint { description } => {
            let checkpoint = orchestrator.create_checkpoint(&description)?;
            println!("{}", checkpoint.id);
            Ok(exit_codes::OK)
        }
        Command::Restore {
            id,
            prune_new_files,
        } => {
            let outcome = orchestrator.restore_checkpoint(&id, prune_new_files.then_some(true))?;
            print!("{}", report::restore_summary(&id, &outcome));
            Ok(status(outcome.restored))
        }
        Command::List { limit } => {
            let checkpoints = orchestrator.list_checkpoints(Some(limit))?;
            print!("{}", report::checkpoint_list(&checkpoints));
            Ok(exit_codes::OK)
        }
        Command::Providers => {
            let mut stdout = io::stdout().lock();
            for id in orchestrator.registry().ids() {
                let config = orchestrator.config().provider_config(&id);
                let capabilities = match orchestrator.registry().create(&id, &config) {
                    Ok(provider) => provider
                        .capabilities()
                        .iter()
                        .map(|capability| capability.as_str())
                        .collect::<Vec<_>>()
                        .join(", "),
                    Err(err) => format!("unavailable: {err}"),
                };
                let marker = if id == orchestrator.config().provider { "*" } else { " " };
                writeln!(stdout, "{marker} {id:<12} {capabilities}").context("write stdout")?;
            }
            Ok(exit_codes::OK)
        }
    }
}

fn status(success: bool) -> i32 {
    if success { exit_codes::OK } else { exit_codes::FAILED }
}

fn read_batch_file(path: &Path) -> Result<Vec<String>> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    Ok(parse_batch(&raw))
}

/// One task per line; blank lines and `#` comments are skipped.
fn parse_batch(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}
