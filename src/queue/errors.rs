use thiserror::Error;

use super::types::JobId;
use crate::models::AgentType;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueueError {
    #[error("Queue backend unavailable: {0}")]
    Unavailable(String),

    #[error("Job {job_id} not found in {agent_type} queue")]
    JobNotFound { agent_type: AgentType, job_id: JobId },

    #[error("Job {0} already submitted")]
    DuplicateJob(JobId),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl QueueError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    /// Failures that may succeed when the same call is made again
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

impl From<serde_json::Error> for QueueError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

pub type QueueResult<T> = Result<T, QueueError>;
