use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle states of an agent execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Seeded by the plan, waiting for prerequisites
    Pending,
    /// Submitted to the agent type's queue
    Queued,
    /// Claimed by a worker
    Running,
    /// Worker reported success
    Completed,
    /// Worker reported an error (retryable only through an explicit retry)
    Failed,
    /// Cancelled before a worker started it
    Cancelled,
}

impl ExecutionStatus {
    /// No worker activity follows this state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// The state can never be left again
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Pending, queued or running
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Work has not started yet, so cancellation is still possible
    pub fn is_cancellable(&self) -> bool {
        matches!(self, Self::Pending | Self::Queued)
    }

    /// Check if this execution satisfies dependencies of other agent types
    pub fn satisfies_dependencies(&self) -> bool {
        matches!(self, Self::Completed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl Default for ExecutionStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "queued" => Ok(Self::Queued),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Invalid execution status: {s}")),
        }
    }
}
