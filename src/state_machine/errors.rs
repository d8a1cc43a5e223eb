use thiserror::Error;
use uuid::Uuid;

use super::states::ExecutionStatus;

/// Error types for agent execution state machine operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StateMachineError {
    #[error("Invalid state transition for execution {execution_id}: {event} is not allowed from {from}")]
    InvalidTransition {
        execution_id: Uuid,
        from: ExecutionStatus,
        event: &'static str,
    },

    #[error("Progress can only be reported while running, execution {execution_id} is {status}")]
    ProgressNotAllowed {
        execution_id: Uuid,
        status: ExecutionStatus,
    },
}

pub type StateMachineResult<T> = Result<T, StateMachineError>;
