//! Provider registry: an explicit map from provider id to factory.

use std::collections::BTreeMap;

use anyhow::Result;
use tracing::debug;

use super::Provider;
use super::cli::CliProvider;
use super::http::HttpProvider;
use super::placeholder::PlaceholderProvider;
use crate::error::AgentError;
use crate::io::config::ProviderConfig;

/// Builds a provider from its resolved settings.
pub type ProviderFactory = Box<dyn Fn(&ProviderConfig) -> Result<Box<dyn Provider>>>;

#[derive(Default)]
pub struct ProviderRegistry {
    factories: BTreeMap<String, ProviderFactory>,
}

impl ProviderRegistry {
    /// A registry with no providers.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with `claude-code`, `http-api` and `openai`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("claude-code", |config| {
            Ok(Box::new(CliProvider::from_config(config, "claude")))
        });
        registry.register("http-api", |config| {
            Ok(Box::new(HttpProvider::from_config(config)?))
        });
        registry.register("openai", |config| {
            Ok(Box::new(PlaceholderProvider::new(&config.id)))
        });
        registry
    }

    /// Register `factory` under `id`. A later registration replaces an earlier one.
    pub fn register<F>(&mut self, id: impl Into<String>, factory: F)
    where
        F: Fn(&ProviderConfig) -> Result<Box<dyn Provider>> + 'static,
    {
        let id = id.into();
        if self.factories.insert(id.clone(), Box::new(factory)).is_some() {
            debug!(id, "provider registration replaced");
        }
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    pub fn create(&self, id: &str, config: &ProviderConfig) -> Result<Box<dyn Provider>, AgentError> {
        let factory = self.factories.get(id).ok_or_else(|| {
            AgentError::configuration(format!(
                "unknown provider '{id}' (registered: {})",
                self.ids().join(", ")
            ))
        })?;
        factory(config).map_err(|err| {
            AgentError::configuration(format!("cannot configure provider '{id}': {err:#}"))
        })
    }
}
