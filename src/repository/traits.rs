use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use super::errors::RepositoryResult;
use crate::models::{
    AgentExecution, AgentType, Company, Deal, DealStatus, NewAgentExecution, TimelineEvent,
};
use crate::state_machine::ExecutionStatus;

/// Durable store of agent executions.
///
/// Every write is a compare-and-swap: `update` only succeeds while the stored record
/// still has `expected_status`, and fails with
/// [`RepositoryError::ConcurrentModification`](super::RepositoryError::ConcurrentModification)
/// otherwise.
#[async_trait]
pub trait ExecutionRepository: Send + Sync + 'static {
    async fn get(&self, execution_id: Uuid) -> RepositoryResult<AgentExecution>;

    /// All executions of a deal ordered by agent type, then recursion level
    async fn list_by_deal(&self, deal_id: Uuid) -> RepositoryResult<Vec<AgentExecution>>;

    /// Executions of one agent type ordered by recursion level
    async fn find_by_deal_and_type(
        &self,
        deal_id: Uuid,
        agent_type: AgentType,
    ) -> RepositoryResult<Vec<AgentExecution>>;

    /// Insert a pending execution. `(deal_id, agent_type, recursion_level)` is unique.
    async fn create(&self, new_execution: NewAgentExecution) -> RepositoryResult<AgentExecution>;

    /// Replace the stored record with `execution` if its status is still `expected_status`
    async fn update(
        &self,
        execution: &AgentExecution,
        expected_status: ExecutionStatus,
    ) -> RepositoryResult<AgentExecution>;

    /// Latest recursion level of one agent type, if any execution exists
    async fn latest_by_deal_and_type(
        &self,
        deal_id: Uuid,
        agent_type: AgentType,
    ) -> RepositoryResult<Option<AgentExecution>> {
        Ok(self
            .find_by_deal_and_type(deal_id, agent_type)
            .await?
            .into_iter()
            .max_by_key(|execution| execution.recursion_level))
    }
}

#[async_trait]
pub trait DealRepository: Send + Sync + 'static {
    async fn get(&self, deal_id: Uuid) -> RepositoryResult<Deal>;

    async fn update_status(&self, deal_id: Uuid, status: DealStatus) -> RepositoryResult<Deal>;
}

#[async_trait]
pub trait CompanyRepository: Send + Sync + 'static {
    async fn get(&self, company_id: Uuid) -> RepositoryResult<Company>;
}

/// Read side of the findings produced by workers
#[async_trait]
pub trait FindingsRepository: Send + Sync + 'static {
    /// Whether the deal's findings ask for another round of analysis
    async fn requires_recursion(&self, deal_id: Uuid) -> RepositoryResult<bool>;
}

#[async_trait]
pub trait TimelineRepository: Send + Sync + 'static {
    async fn append(&self, event: TimelineEvent) -> RepositoryResult<()>;

    /// Events of a deal in append order
    async fn list_by_deal(&self, deal_id: Uuid) -> RepositoryResult<Vec<TimelineEvent>>;
}

/// The stores the orchestration core depends on, shared across components
#[derive(Clone)]
pub struct RepositorySet {
    pub executions: Arc<dyn ExecutionRepository>,
    pub deals: Arc<dyn DealRepository>,
    pub companies: Arc<dyn CompanyRepository>,
    pub findings: Arc<dyn FindingsRepository>,
    pub timeline: Arc<dyn TimelineRepository>,
}

impl std::fmt::Debug for RepositorySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositorySet").finish_non_exhaustive()
    }
}
