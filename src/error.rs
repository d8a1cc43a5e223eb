//! Error types for the diligence orchestration core.
//!
//! Each layer owns a narrow error enum (configuration, state machine, repository,
//! queue, worker); everything converges on [`OrchestratorError`] at the public
//! orchestration boundary.

use thiserror::Error;
use uuid::Uuid;

use crate::config::ConfigurationError;
use crate::queue::QueueError;
use crate::repository::RepositoryError;
use crate::state_machine::{ExecutionStatus, StateMachineError};

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("State machine error: {0}")]
    StateMachine(#[from] StateMachineError),

    /// A compare-and-swap on the execution record lost a race. The caller should
    /// re-read the record and retry the intended transition.
    #[error(
        "Concurrent modification of execution {execution_id}: expected status {expected}, found {actual}"
    )]
    ConcurrentModification {
        execution_id: Uuid,
        expected: ExecutionStatus,
        actual: ExecutionStatus,
    },

    #[error("Repository error: {0}")]
    Repository(RepositoryError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Unknown job {0}")]
    UnknownJob(String),
}

impl OrchestratorError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// True for conflicts another actor caused; the operation can be re-attempted
    /// after re-reading state.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::ConcurrentModification { .. }
                | Self::StateMachine(StateMachineError::InvalidTransition { .. })
        )
    }
}

impl From<RepositoryError> for OrchestratorError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } => Self::NotFound { entity, id },
            RepositoryError::ConcurrentModification {
                execution_id,
                expected,
                actual,
            } => Self::ConcurrentModification {
                execution_id,
                expected,
                actual,
            },
            other => Self::Repository(other),
        }
    }
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;
