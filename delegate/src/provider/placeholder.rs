//! Stand-in for backends that are registered but not implemented yet.

use std::collections::BTreeSet;

use super::{Provider, TaskContext, TransportError};
use crate::core::types::{Capability, ErrorKind, TaskError, TaskResult};

#[derive(Debug, Clone)]
pub struct PlaceholderProvider {
    id: String,
}

impl PlaceholderProvider {
    pub fn new(id: &str) -> Self {
        Self { id: id.to_string() }
    }
}

impl Provider for PlaceholderProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn capabilities(&self) -> BTreeSet<Capability> {
        BTreeSet::new()
    }

    fn execute(&self, _prompt: &str, _ctx: &TaskContext) -> Result<TaskResult, TransportError> {
        Ok(TaskResult::failed(
            &self.id,
            "",
            TaskError::new(
                ErrorKind::TaskFailure,
                format!("provider '{}' is not yet implemented", self.id),
            ),
        ))
    }
}
