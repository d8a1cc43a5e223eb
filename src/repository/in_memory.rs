//! Process-local repositories backed by `dashmap`, used by tests and by
//! single-process deployments without a database.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use uuid::Uuid;

use super::errors::{RepositoryError, RepositoryResult};
use super::traits::{
    CompanyRepository, DealRepository, ExecutionRepository, FindingsRepository, RepositorySet,
    TimelineRepository,
};
use crate::models::{
    AgentExecution, AgentType, Company, Deal, DealStatus, NewAgentExecution, TimelineEvent,
};
use crate::state_machine::ExecutionStatus;

type ExecutionKey = (Uuid, AgentType, u32);

#[derive(Debug, Default)]
pub struct InMemoryExecutionRepository {
    executions: DashMap<Uuid, AgentExecution>,
    keys: DashMap<ExecutionKey, Uuid>,
}

impl InMemoryExecutionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a record as-is, bypassing the state machine (for fixtures)
    pub fn insert(&self, execution: AgentExecution) {
        self.keys.insert(
            (
                execution.deal_id,
                execution.agent_type,
                execution.recursion_level,
            ),
            execution.execution_id,
        );
        self.executions.insert(execution.execution_id, execution);
    }

    pub fn len(&self) -> usize {
        self.executions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executions.is_empty()
    }

    fn sorted(mut executions: Vec<AgentExecution>) -> Vec<AgentExecution> {
        executions.sort_by_key(|execution| (execution.agent_type, execution.recursion_level));
        executions
    }
}

#[async_trait]
impl ExecutionRepository for InMemoryExecutionRepository {
    async fn get(&self, execution_id: Uuid) -> RepositoryResult<AgentExecution> {
        self.executions
            .get(&execution_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| RepositoryError::not_found("AgentExecution", execution_id))
    }

    async fn list_by_deal(&self, deal_id: Uuid) -> RepositoryResult<Vec<AgentExecution>> {
        let executions = self
            .executions
            .iter()
            .filter(|entry| entry.deal_id == deal_id)
            .map(|entry| entry.value().clone())
            .collect();
        Ok(Self::sorted(executions))
    }

    async fn find_by_deal_and_type(
        &self,
        deal_id: Uuid,
        agent_type: AgentType,
    ) -> RepositoryResult<Vec<AgentExecution>> {
        let executions = self
            .executions
            .iter()
            .filter(|entry| entry.deal_id == deal_id && entry.agent_type == agent_type)
            .map(|entry| entry.value().clone())
            .collect();
        Ok(Self::sorted(executions))
    }

    async fn create(&self, new_execution: NewAgentExecution) -> RepositoryResult<AgentExecution> {
        let key = (
            new_execution.deal_id,
            new_execution.agent_type,
            new_execution.recursion_level,
        );

        match self.keys.entry(key) {
            Entry::Occupied(_) => Err(RepositoryError::Duplicate {
                deal_id: key.0,
                agent_type: key.1,
                recursion_level: key.2,
            }),
            Entry::Vacant(slot) => {
                let execution = new_execution.into_execution(Utc::now());
                slot.insert(execution.execution_id);
                self.executions
                    .insert(execution.execution_id, execution.clone());
                Ok(execution)
            }
        }
    }

    async fn update(
        &self,
        execution: &AgentExecution,
        expected_status: ExecutionStatus,
    ) -> RepositoryResult<AgentExecution> {
        let mut stored = self
            .executions
            .get_mut(&execution.execution_id)
            .ok_or_else(|| RepositoryError::not_found("AgentExecution", execution.execution_id))?;

        if stored.status != expected_status {
            return Err(RepositoryError::ConcurrentModification {
                execution_id: execution.execution_id,
                expected: expected_status,
                actual: stored.status,
            });
        }

        *stored = execution.clone();
        Ok(stored.clone())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryDealRepository {
    deals: DashMap<Uuid, Deal>,
}

impl InMemoryDealRepository {
    pub fn insert(&self, deal: Deal) {
        self.deals.insert(deal.deal_id, deal);
    }
}

#[async_trait]
impl DealRepository for InMemoryDealRepository {
    async fn get(&self, deal_id: Uuid) -> RepositoryResult<Deal> {
        self.deals
            .get(&deal_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| RepositoryError::not_found("Deal", deal_id))
    }

    async fn update_status(&self, deal_id: Uuid, status: DealStatus) -> RepositoryResult<Deal> {
        let mut deal = self
            .deals
            .get_mut(&deal_id)
            .ok_or_else(|| RepositoryError::not_found("Deal", deal_id))?;
        deal.status = status;
        deal.updated_at = Utc::now();
        Ok(deal.clone())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryCompanyRepository {
    companies: DashMap<Uuid, Company>,
}

impl InMemoryCompanyRepository {
    pub fn insert(&self, company: Company) {
        self.companies.insert(company.company_id, company);
    }
}

#[async_trait]
impl CompanyRepository for InMemoryCompanyRepository {
    async fn get(&self, company_id: Uuid) -> RepositoryResult<Company> {
        self.companies
            .get(&company_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| RepositoryError::not_found("Company", company_id))
    }
}

#[derive(Debug, Default)]
pub struct InMemoryFindingsRepository {
    recursion_flags: DashMap<Uuid, bool>,
}

impl InMemoryFindingsRepository {
    pub fn set_requires_recursion(&self, deal_id: Uuid, required: bool) {
        self.recursion_flags.insert(deal_id, required);
    }
}

#[async_trait]
impl FindingsRepository for InMemoryFindingsRepository {
    async fn requires_recursion(&self, deal_id: Uuid) -> RepositoryResult<bool> {
        Ok(self
            .recursion_flags
            .get(&deal_id)
            .map(|flag| *flag)
            .unwrap_or(false))
    }
}

/// Append-only log shared by every deal; insertion order is the sequence
#[derive(Debug, Default)]
pub struct InMemoryTimelineRepository {
    events: RwLock<Vec<TimelineEvent>>,
}

impl InMemoryTimelineRepository {
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}

#[async_trait]
impl TimelineRepository for InMemoryTimelineRepository {
    async fn append(&self, event: TimelineEvent) -> RepositoryResult<()> {
        self.events.write().push(event);
        Ok(())
    }

    async fn list_by_deal(&self, deal_id: Uuid) -> RepositoryResult<Vec<TimelineEvent>> {
        Ok(self
            .events
            .read()
            .iter()
            .filter(|event| event.deal_id == deal_id)
            .cloned()
            .collect())
    }
}

/// Concrete in-memory stores, kept typed so tests can seed and inspect them
#[derive(Debug, Clone, Default)]
pub struct InMemoryStores {
    pub executions: Arc<InMemoryExecutionRepository>,
    pub deals: Arc<InMemoryDealRepository>,
    pub companies: Arc<InMemoryCompanyRepository>,
    pub findings: Arc<InMemoryFindingsRepository>,
    pub timeline: Arc<InMemoryTimelineRepository>,
}

impl InMemoryStores {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a company and a draft deal for it
    pub fn seed_deal(&self, name: &str) -> Deal {
        let company = Company::new(format!("{name} Holdings"));
        let deal = Deal::new(company.company_id, name);
        self.companies.insert(company);
        self.deals.insert(deal.clone());
        deal
    }

    pub fn repository_set(&self) -> RepositorySet {
        RepositorySet {
            executions: self.executions.clone(),
            deals: self.deals.clone(),
            companies: self.companies.clone(),
            findings: self.findings.clone(),
            timeline: self.timeline.clone(),
        }
    }
}
