use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::queue::JobId;

/// Events that can trigger agent execution state transitions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ExecutionEvent {
    /// Dependencies satisfied, job submitted to the agent type's queue
    Enqueue(JobId),
    /// A worker claimed the job
    Start,
    /// Worker finished with output
    Complete(Value),
    /// Worker failed with an error message
    Fail(String),
    /// Explicit cancellation before work started
    Cancel,
    /// Explicit retry of a failed execution
    Retry,
}

impl ExecutionEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Enqueue(_) => "enqueue",
            Self::Start => "start",
            Self::Complete(_) => "complete",
            Self::Fail(_) => "fail",
            Self::Cancel => "cancel",
            Self::Retry => "retry",
        }
    }

    pub fn fail_with_error(error: impl Into<String>) -> Self {
        Self::Fail(error.into())
    }
}
