//! Line-oriented command loop for an operator at a terminal.
//!
//! Commands run one at a time; a provider call blocks the loop until it
//! returns. Every `task` gets its own checkpoint.

use std::io::{BufRead, Write};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::core::types::TaskOptions;
use crate::orchestrator::Orchestrator;
use crate::report;

const HELP: &str = "\
commands:
  task <description>        run a task (checkpointed first)
  checkpoint [description]  snapshot the project now
  restore <id>              restore a checkpoint
  list [--limit N]          show recent checkpoints
  help                      show this help
  exit                      leave";

const DEFAULT_LIST_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Task(String),
    Checkpoint(Option<String>),
    Restore(String),
    List(Option<usize>),
    Help,
    Exit,
}

/// Parse one input line. Blank lines yield `Ok(None)`.
pub fn parse_command(line: &str) -> Result<Option<Command>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };
    let command = match word {
        "task" if rest.is_empty() => return Err("usage: task <description>".to_string()),
        "task" => Command::Task(rest.to_string()),
        "checkpoint" => Command::Checkpoint((!rest.is_empty()).then(|| rest.to_string())),
        "restore" => match rest.split_whitespace().collect::<Vec<_>>().as_slice() {
            [id] => Command::Restore((*id).to_string()),
            _ => return Err("usage: restore <id>".to_string()),
        },
        "list" => Command::List(parse_list_limit(rest)?),
        "help" | "?" => Command::Help,
        "exit" | "quit" => Command::Exit,
        other => return Err(format!("unknown command '{other}' (try 'help')")),
    };
    Ok(Some(command))
}

fn parse_list_limit(rest: &str) -> Result<Option<usize>, String> {
    let parts: Vec<&str> = rest.split_whitespace().collect();
    let value = match parts.as_slice() {
        [] => return Ok(None),
        ["--limit", value] | [value] => value,
        _ => return Err("usage: list [--limit N]".to_string()),
    };
    value
        .parse()
        .map(Some)
        .map_err(|_| format!("invalid limit '{value}'"))
}

/// Read commands from `input` until `exit` or end of input.
///
/// Command errors are printed and the loop continues.
pub fn run_interactive<R: BufRead, W: Write>(
    orchestrator: &Orchestrator,
    input: R,
    mut out: W,
    base: &TaskOptions,
) -> Result<()> {
    writeln!(out, "delegate interactive mode; 'help' lists commands").context("write prompt")?;
    let mut lines = input.lines();
    loop {
        write!(out, "> ").context("write prompt")?;
        out.flush().context("flush output")?;
        let Some(line) = lines.next() else {
            writeln!(out).context("write output")?;
            break;
        };
        let line = line.context("read command")?;
        let command = match parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(message) => {
                writeln!(out, "{message}").context("write output")?;
                continue;
            }
        };
        if command == Command::Exit {
            break;
        }
        let text = execute(orchestrator, command, base);
        write!(out, "{text}").context("write output")?;
    }
    info!("interactive session ended");
    Ok(())
}

fn execute(orchestrator: &Orchestrator, command: Command, base: &TaskOptions) -> String {
    let outcome = match command {
        Command::Task(description) => {
            let options = TaskOptions {
                create_checkpoint: true,
                ..base.clone()
            };
            orchestrator
                .execute_task(&description, &options)
                .map(|result| report::task_summary(&result))
        }
        Command::Checkpoint(description) => {
            let description = description.unwrap_or_else(|| "Manual checkpoint".to_string());
            orchestrator
                .create_checkpoint(&description)
                .map(|checkpoint| format!("checkpoint created: {}\n", checkpoint.id))
        }
        Command::Restore(id) => orchestrator
            .restore_checkpoint(&id, None)
            .map(|outcome| report::restore_summary(&id, &outcome)),
        Command::List(limit) => orchestrator
            .list_checkpoints(Some(limit.unwrap_or(DEFAULT_LIST_LIMIT)))
            .map(|checkpoints| report::checkpoint_list(&checkpoints)),
        Command::Help => Ok(format!("{HELP}\n")),
        Command::Exit => Ok(String::new()),
    };
    outcome.unwrap_or_else(|err| {
        warn!(err = %err, "interactive command failed");
        format!("error: {err}\n")
    })
}
