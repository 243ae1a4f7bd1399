//! Prompt rendering for provider input.
//!
//! Built-in templates ship with the binary. A project can override any of them,
//! or add new ones, with `.delegate/prompts/<id>.md`.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use minijinja::{Environment, context};
use tracing::debug;

use crate::io::paths::ProjectPaths;

const CONTEXT_PARTIAL: &str = include_str!("prompts/_context.md");
const RULES_PARTIAL: &str = include_str!("prompts/_rules.md");

const BUILTIN_TEMPLATES: [(&str, &str); 4] = [
    ("default", include_str!("prompts/default.md")),
    ("refactor", include_str!("prompts/refactor.md")),
    ("feature", include_str!("prompts/feature.md")),
    ("debug", include_str!("prompts/debug.md")),
];

/// Values available to every template.
#[derive(Debug, Clone, Default)]
pub struct PromptInputs<'a> {
    pub task: &'a str,
    pub context: &'a str,
    pub conventions: &'a str,
    pub auto_accept: bool,
    pub continue_session: bool,
    pub session_hint: Option<&'a str>,
    pub snippets: &'a [String],
}

/// Where a template id resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateSource {
    Builtin,
    Override(PathBuf),
}

/// Template engine wrapper around minijinja.
pub struct PromptRenderer {
    env: Environment<'static>,
    prompts_dir: PathBuf,
}

impl PromptRenderer {
    pub fn new(paths: &ProjectPaths) -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("_context.md", CONTEXT_PARTIAL)
            .context("load context partial")?;
        env.add_template("_rules.md", RULES_PARTIAL)
            .context("load rules partial")?;
        for (id, source) in BUILTIN_TEMPLATES {
            env.add_template(id, source)
                .with_context(|| format!("load built-in template {id}"))?;
        }
        Ok(Self {
            env,
            prompts_dir: paths.prompts_dir.clone(),
        })
    }

    /// Built-in template ids, sorted.
    pub fn builtin_ids() -> Vec<&'static str> {
        let mut ids: Vec<&str> = BUILTIN_TEMPLATES.iter().map(|(id, _)| *id).collect();
        ids.sort_unstable();
        ids
    }

    /// Resolve `template_id`, preferring a project override. `None` if unknown.
    pub fn resolve(&self, template_id: &str) -> Option<TemplateSource> {
        if !is_valid_template_id(template_id) {
            return None;
        }
        let override_path = self.prompts_dir.join(format!("{template_id}.md"));
        if override_path.is_file() {
            return Some(TemplateSource::Override(override_path));
        }
        BUILTIN_TEMPLATES
            .iter()
            .any(|(id, _)| *id == template_id)
            .then_some(TemplateSource::Builtin)
    }

    pub fn render(&self, template_id: &str, inputs: &PromptInputs<'_>) -> Result<String> {
        let source = self
            .resolve(template_id)
            .ok_or_else(|| anyhow!("unknown prompt template '{template_id}'"))?;
        let ctx = context! {
            task => inputs.task.trim(),
            context => Some(inputs.context.trim()).filter(|s| !s.is_empty()),
            conventions => Some(inputs.conventions.trim()).filter(|s| !s.is_empty()),
            auto_accept => inputs.auto_accept,
            continue_session => inputs.continue_session,
            session_hint => inputs.session_hint.map(str::trim).filter(|s| !s.is_empty()),
            snippets => inputs.snippets,
        };
        let rendered = match source {
            TemplateSource::Builtin => self
                .env
                .get_template(template_id)?
                .render(ctx)
                .with_context(|| format!("render template {template_id}"))?,
            TemplateSource::Override(path) => {
                debug!(path = %path.display(), "using template override");
                let raw = fs::read_to_string(&path)
                    .with_context(|| format!("read {}", path.display()))?;
                self.env
                    .render_str(&raw, ctx)
                    .with_context(|| format!("render {}", path.display()))?
            }
        };
        Ok(rendered)
    }
}

/// Template ids name files, so they are restricted to a safe alphabet.
fn is_valid_template_id(id: &str) -> bool {
    !id.is_empty()
        && !id.starts_with('_')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
