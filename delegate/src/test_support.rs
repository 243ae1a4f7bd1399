//! Test-only helpers: throwaway projects and a scripted provider.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fs;
use std::path::Path;
use std::process::Command;
use std::rc::Rc;

use anyhow::{Context, Result, anyhow};
use tempfile::TempDir;
use walkdir::WalkDir;

use crate::core::types::{Capability, ErrorKind, TaskError, TaskResult};
use crate::io::config::AgentConfig;
use crate::io::paths::{ProjectPaths, STATE_DIR_NAME};
use crate::provider::{Provider, ProviderRegistry, TaskContext, TransportError};

/// A project directory that is deleted on drop.
pub struct TestProject {
    dir: TempDir,
}

impl TestProject {
    /// An empty directory, not under version control.
    pub fn new() -> Result<Self> {
        Ok(Self {
            dir: tempfile::tempdir().context("create tempdir")?,
        })
    }

    /// A git repository with one commit containing `tracked.txt` = `base`.
    pub fn git() -> Result<Self> {
        let project = Self::new()?;
        project.git_cmd(&["init", "-q"])?;
        project.git_cmd(&["config", "user.email", "delegate-tests@example.com"])?;
        project.git_cmd(&["config", "user.name", "delegate tests"])?;
        project.git_cmd(&["config", "commit.gpgsign", "false"])?;
        project.write("tracked.txt", "base")?;
        project.commit_all("initial")?;
        Ok(project)
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn paths(&self) -> ProjectPaths {
        ProjectPaths::new(self.root())
    }

    pub fn write(&self, relative: &str, contents: &str) -> Result<()> {
        let path = self.root().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))
    }

    pub fn read(&self, relative: &str) -> Result<String> {
        let path = self.root().join(relative);
        fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))
    }

    /// Write `.delegate/agent.toml` for this project.
    pub fn write_config(&self, config: &AgentConfig) -> Result<()> {
        config.validate()?;
        let contents = toml::to_string_pretty(config).context("serialize config")?;
        let path = self.paths().config_path;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))
    }

    /// Stage everything (state directory excluded) and commit.
    pub fn commit_all(&self, message: &str) -> Result<()> {
        self.git_cmd(&["add", "-A", "--", ".", &format!(":(exclude){STATE_DIR_NAME}")])?;
        self.git_cmd(&["commit", "-q", "-m", message])
    }

    pub fn stage(&self, relative: &str) -> Result<()> {
        self.git_cmd(&["add", "--", relative])
    }

    /// Paths with staged changes, sorted.
    pub fn staged(&self) -> Result<Vec<String>> {
        let out = Command::new("git")
            .args(["diff", "--cached", "--name-only"])
            .current_dir(self.root())
            .output()
            .context("run git diff --cached")?;
        let mut paths: Vec<String> = String::from_utf8_lossy(&out.stdout)
            .lines()
            .map(str::to_string)
            .collect();
        paths.sort();
        Ok(paths)
    }

    pub fn head(&self) -> Result<String> {
        let out = Command::new("git")
            .args(["rev-parse", "HEAD"])
            .current_dir(self.root())
            .output()
            .context("run git rev-parse")?;
        Ok(String::from_utf8_lossy(&out.stdout).trim().to_string())
    }

    /// Every project file (outside `.git` and `.delegate`) with its contents.
    pub fn snapshot(&self) -> Result<BTreeMap<String, String>> {
        let mut files = BTreeMap::new();
        let walker = WalkDir::new(self.root()).into_iter().filter_entry(|entry| {
            let name = entry.file_name().to_string_lossy();
            entry.depth() == 0 || (name != ".git" && name != STATE_DIR_NAME)
        });
        for entry in walker {
            let entry = entry.context("walk project")?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(self.root())
                .context("relativize")?
                .to_string_lossy()
                .replace('\\', "/");
            let contents = fs::read_to_string(entry.path())
                .with_context(|| format!("read {}", entry.path().display()))?;
            files.insert(relative, contents);
        }
        Ok(files)
    }

    fn git_cmd(&self, args: &[&str]) -> Result<()> {
        let out = Command::new("git")
            .args(args)
            .current_dir(self.root())
            .output()
            .with_context(|| format!("run git {}", args.join(" ")))?;
        if !out.status.success() {
            return Err(anyhow!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&out.stderr).trim()
            ));
        }
        Ok(())
    }
}

/// What a scripted dispatch reports back.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Succeed(String),
    Fail(ErrorKind, String),
    Transport(String),
}

/// One scripted dispatch: file writes to perform, then the reply.
#[derive(Debug, Clone)]
pub struct ScriptedStep {
    pub writes: Vec<(String, String)>,
    pub commit: Option<String>,
    pub reply: ScriptedReply,
}

impl ScriptedStep {
    pub fn ok(output: &str) -> Self {
        Self {
            writes: Vec::new(),
            commit: None,
            reply: ScriptedReply::Succeed(output.to_string()),
        }
    }

    pub fn fail(kind: ErrorKind, detail: &str) -> Self {
        Self {
            writes: Vec::new(),
            commit: None,
            reply: ScriptedReply::Fail(kind, detail.to_string()),
        }
    }

    pub fn transport(message: &str) -> Self {
        Self {
            writes: Vec::new(),
            commit: None,
            reply: ScriptedReply::Transport(message.to_string()),
        }
    }

    /// Write `contents` to `relative` before replying.
    pub fn writing(mut self, relative: &str, contents: &str) -> Self {
        self.writes.push((relative.to_string(), contents.to_string()));
        self
    }

    /// Commit everything with `message` after writing.
    pub fn committing(mut self, message: &str) -> Self {
        self.commit = Some(message.to_string());
        self
    }
}

#[derive(Debug, Default)]
struct ScriptState {
    steps: VecDeque<ScriptedStep>,
    prompts: Vec<String>,
    contexts: Vec<TaskContext>,
}

/// Provider that replays [`ScriptedStep`]s and records what it was sent.
///
/// Clones share the same script, so a test keeps one handle while the
/// registry builds fresh providers from another.
#[derive(Debug, Clone)]
pub struct ScriptedProvider {
    id: String,
    capabilities: BTreeSet<Capability>,
    state: Rc<RefCell<ScriptState>>,
}

impl ScriptedProvider {
    pub fn new(id: &str, steps: Vec<ScriptedStep>) -> Self {
        Self {
            id: id.to_string(),
            capabilities: BTreeSet::from([
                Capability::FileEdit,
                Capability::FileCreate,
                Capability::AutoAccept,
            ]),
            state: Rc::new(RefCell::new(ScriptState {
                steps: steps.into(),
                ..ScriptState::default()
            })),
        }
    }

    pub fn without_auto_accept(mut self) -> Self {
        self.capabilities.remove(&Capability::AutoAccept);
        self
    }

    /// Register under this provider's id; every created instance shares the script.
    pub fn register(&self, registry: &mut ProviderRegistry) {
        let shared = self.clone();
        registry.register(self.id.clone(), move |_| Ok(Box::new(shared.clone())));
    }

    pub fn prompts(&self) -> Vec<String> {
        self.state.borrow().prompts.clone()
    }

    pub fn contexts(&self) -> Vec<TaskContext> {
        self.state.borrow().contexts.clone()
    }

    pub fn calls(&self) -> usize {
        self.state.borrow().prompts.len()
    }
}

impl Provider for ScriptedProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn capabilities(&self) -> BTreeSet<Capability> {
        self.capabilities.clone()
    }

    fn execute(&self, prompt: &str, ctx: &TaskContext) -> Result<TaskResult, TransportError> {
        let step = {
            let mut state = self.state.borrow_mut();
            state.prompts.push(prompt.to_string());
            state.contexts.push(ctx.clone());
            state.steps.pop_front()
        };
        let Some(step) = step else {
            return Ok(TaskResult::failed(
                &self.id,
                "",
                TaskError::new(ErrorKind::TaskFailure, "script exhausted"),
            ));
        };

        for (relative, contents) in &step.writes {
            let path = ctx.workdir.join(relative);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(|err| TransportError::Other(err.to_string()))?;
            }
            fs::write(&path, contents).map_err(|err| TransportError::Other(err.to_string()))?;
        }
        if let Some(message) = &step.commit {
            let status = Command::new("sh")
                .args(["-c", "git add -A -- . ':(exclude).delegate' && git commit -q -m \"$0\"", message])
                .current_dir(&ctx.workdir)
                .status()
                .map_err(|err| TransportError::Other(err.to_string()))?;
            if !status.success() {
                return Err(TransportError::Other(format!("scripted commit failed: {status}")));
            }
        }

        match step.reply {
            ScriptedReply::Succeed(output) => Ok(TaskResult::succeeded(&self.id, output)),
            ScriptedReply::Fail(kind, detail) => Ok(TaskResult::failed(
                &self.id,
                "",
                TaskError::new(kind, detail),
            )),
            ScriptedReply::Transport(message) => Err(TransportError::Other(message)),
        }
    }
}
