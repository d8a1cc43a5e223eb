use thiserror::Error;
use uuid::Uuid;

use crate::models::AgentType;
use crate::state_machine::ExecutionStatus;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RepositoryError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error(
        "Execution for deal {deal_id}, agent type {agent_type}, recursion level {recursion_level} already exists"
    )]
    Duplicate {
        deal_id: Uuid,
        agent_type: AgentType,
        recursion_level: u32,
    },

    #[error(
        "Concurrent modification of execution {execution_id}: expected status {expected}, found {actual}"
    )]
    ConcurrentModification {
        execution_id: Uuid,
        expected: ExecutionStatus,
        actual: ExecutionStatus,
    },

    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl RepositoryError {
    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        Self::NotFound { entity, id }
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        Self::Backend(err.to_string())
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;
