//! Per-task phase machine.
//!
//! `Idle → Checkpointing → Dispatching → AwaitingResult → {Succeeded | Failed}
//! → [RollingBack] → Idle`. Checkpointing may be skipped (Idle → Dispatching).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPhase {
    Idle,
    Checkpointing,
    Dispatching,
    AwaitingResult,
    Succeeded,
    Failed,
    RollingBack,
}

impl TaskPhase {
    pub fn can_transition_to(self, next: TaskPhase) -> bool {
        use TaskPhase::{
            AwaitingResult, Checkpointing, Dispatching, Failed, Idle, RollingBack, Succeeded,
        };
        matches!(
            (self, next),
            (Idle, Checkpointing)
                | (Idle, Dispatching)
                | (Checkpointing, Dispatching)
                | (Dispatching, AwaitingResult)
                | (AwaitingResult, Succeeded)
                | (AwaitingResult, Failed)
                | (Failed, RollingBack)
                | (Succeeded, Idle)
                | (Failed, Idle)
                | (RollingBack, Idle)
        )
    }
}

/// Records the phases one task visits, rejecting illegal transitions.
#[derive(Debug, Clone)]
pub struct PhaseTrace {
    current: TaskPhase,
    visited: Vec<TaskPhase>,
}

impl Default for PhaseTrace {
    fn default() -> Self {
        Self {
            current: TaskPhase::Idle,
            visited: vec![TaskPhase::Idle],
        }
    }
}

impl PhaseTrace {
    pub fn current(&self) -> TaskPhase {
        self.current
    }

    /// Move to `next`. Returns an error string naming both phases when illegal.
    pub fn advance(&mut self, next: TaskPhase) -> Result<(), String> {
        if !self.current.can_transition_to(next) {
            return Err(format!(
                "illegal task phase transition {:?} -> {:?}",
                self.current, next
            ));
        }
        self.current = next;
        self.visited.push(next);
        Ok(())
    }

    pub fn into_visited(self) -> Vec<TaskPhase> {
        self.visited
    }
}
