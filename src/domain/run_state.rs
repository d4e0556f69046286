//! Build run state owned by the Ralph loop.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TelosError};

/// Why a run ended in `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FailureReason {
    /// Iteration budget used up with items still open
    BudgetExhausted,
    /// State corruption or another unrecoverable error
    FatalError(String),
    /// Escalation policy handed the build to a human
    HumanInterventionRequired(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::BudgetExhausted => f.write_str("budget_exhausted"),
            FailureReason::FatalError(msg) => write!(f, "fatal_error: {}", msg),
            FailureReason::HumanInterventionRequired(msg) => {
                write!(f, "human_intervention_required: {}", msg)
            }
        }
    }
}

/// Status of a build run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed(FailureReason),
}

impl RunStatus {
    /// Returns true if the run is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed(_))
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Running => f.write_str("running"),
            RunStatus::Completed => f.write_str("completed"),
            RunStatus::Failed(reason) => write!(f, "failed ({})", reason),
        }
    }
}

/// Iteration counter and status of one build.
///
/// Only the Ralph loop mutates this; `status` can leave `Running` once and
/// never comes back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRunState {
    pub iteration: u32,
    pub max_iterations: u32,
    pub status: RunStatus,
    pub denial_streak: u32,
}

impl BuildRunState {
    pub fn new(max_iterations: u32) -> Self {
        Self {
            iteration: 0,
            max_iterations,
            status: RunStatus::Running,
            denial_streak: 0,
        }
    }

    /// Start the next iteration. Refused once the run is terminal or the
    /// budget is spent.
    pub fn begin_iteration(&mut self) -> Result<u32> {
        if self.status.is_terminal() {
            return Err(TelosError::InvalidState(format!("run already {}", self.status)));
        }
        if self.iteration >= self.max_iterations {
            return Err(TelosError::InvalidState(format!(
                "iteration budget of {} already spent",
                self.max_iterations
            )));
        }
        self.iteration += 1;
        Ok(self.iteration)
    }

    /// Move to a terminal status. Terminal states are sticky.
    pub fn finish(&mut self, status: RunStatus) -> Result<()> {
        if self.status.is_terminal() {
            return Err(TelosError::InvalidState(format!(
                "cannot move from {} to {}",
                self.status, status
            )));
        }
        self.status = status;
        Ok(())
    }

    pub fn budget_spent(&self) -> bool {
        self.iteration >= self.max_iterations
    }
}
