//! Canonical locations inside `.delegate/`.

use std::path::{Path, PathBuf};

/// Name of the directory delegate keeps its own state in.
pub const STATE_DIR_NAME: &str = ".delegate";

/// All canonical paths within `.delegate/` for a project root.
#[derive(Debug, Clone)]
pub struct ProjectPaths {
    pub root: PathBuf,
    pub state_dir: PathBuf,
    pub config_path: PathBuf,
    pub context_path: PathBuf,
    pub conventions_path: PathBuf,
    pub prompts_dir: PathBuf,
    pub session_log_path: PathBuf,
    pub checkpoints_dir: PathBuf,
}

impl ProjectPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let state_dir = root.join(STATE_DIR_NAME);
        Self {
            root: root.clone(),
            state_dir: state_dir.clone(),
            config_path: state_dir.join("agent.toml"),
            context_path: state_dir.join("context.md"),
            conventions_path: state_dir.join("conventions.toml"),
            prompts_dir: state_dir.join("prompts"),
            session_log_path: state_dir.join("sessions.jsonl"),
            checkpoints_dir: state_dir.join("checkpoints"),
        }
    }

    /// Metadata file for one checkpoint.
    pub fn checkpoint_meta(&self, id: &str) -> PathBuf {
        self.checkpoints_dir.join(format!("{id}.json"))
    }

    /// Storage directory for one file-backup checkpoint.
    pub fn checkpoint_dir(&self, id: &str) -> PathBuf {
        self.checkpoints_dir.join(id)
    }

    pub fn template_override(&self, template_id: &str) -> PathBuf {
        self.prompts_dir.join(format!("{template_id}.md"))
    }

    /// True if `path` (relative to the root) lives inside the state directory.
    pub fn is_state_path(relative: &Path) -> bool {
        relative
            .components()
            .next()
            .is_some_and(|first| first.as_os_str() == STATE_DIR_NAME)
    }
}
