//! Read-only project context: `.delegate/context.md` and `conventions.toml`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use crate::io::paths::ProjectPaths;

/// Project context handed to prompt templates. Empty strings when absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectContext {
    /// Free-form description of the project.
    pub context: String,
    /// Conventions rendered as pretty JSON.
    pub conventions: String,
}

/// Load the project context for one task.
pub fn load_project_context(paths: &ProjectPaths) -> Result<ProjectContext> {
    let context = read_optional(&paths.context_path)?.unwrap_or_default();
    let conventions = match read_optional(&paths.conventions_path)? {
        Some(raw) => render_conventions(&raw)
            .with_context(|| format!("parse {}", paths.conventions_path.display()))?,
        None => String::new(),
    };
    debug!(
        context_len = context.len(),
        conventions_len = conventions.len(),
        "project context loaded"
    );
    Ok(ProjectContext {
        context,
        conventions,
    })
}

/// Convert a conventions TOML document into pretty JSON for the prompt.
fn render_conventions(raw: &str) -> Result<String> {
    if raw.trim().is_empty() {
        return Ok(String::new());
    }
    let table: toml::Table = toml::from_str(raw)?;
    let value = serde_json::to_value(&table).context("convert conventions to json")?;
    serde_json::to_string_pretty(&value).context("serialize conventions")
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }
    fs::read_to_string(path)
        .map(Some)
        .with_context(|| format!("read {}", path.display()))
}
