//! Result types returned by the orchestration operations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{AgentExecution, AgentType, DealStatus};
use crate::state_machine::ExecutionStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BottleneckKind {
    FailedAgents,
    LongRunning,
    DependencyBlock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bottleneck {
    #[serde(rename = "type")]
    pub kind: BottleneckKind,
    pub severity: Severity,
    pub agents: Vec<AgentType>,
    /// Unfinished prerequisites, only for `dependency_block`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocked_by: Vec<AgentType>,
    pub execution_ids: Vec<Uuid>,
}

/// Suggested follow-up for a deal, derived from its executions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum NextAction {
    RetryFailedAgents { agents: Vec<AgentType> },
    /// Pending work whose prerequisites are done; signals resolver lag
    StartReadyAgents { agents: Vec<AgentType> },
    GenerateFinalReport,
    TriggerRecursiveAnalysis,
}

/// Output of the progress analyzer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressAnalysis {
    pub overall_percentage: u8,
    pub bottlenecks: Vec<Bottleneck>,
    pub next_actions: Vec<NextAction>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentStatusEntry {
    pub execution_id: Uuid,
    pub agent_type: AgentType,
    pub recursion_level: u32,
    pub status: ExecutionStatus,
    pub progress_percentage: u8,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub error_message: Option<String>,
    pub retry_count: u32,
}

impl From<&AgentExecution> for AgentStatusEntry {
    fn from(execution: &AgentExecution) -> Self {
        Self {
            execution_id: execution.execution_id,
            agent_type: execution.agent_type,
            recursion_level: execution.recursion_level,
            status: execution.status,
            progress_percentage: execution.progress_percentage,
            start_time: execution.start_time,
            end_time: execution.end_time,
            duration_ms: execution.duration_ms,
            error_message: execution.error_message.clone(),
            retry_count: execution.retry_count,
        }
    }
}

/// Live view of one deal's orchestration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DealStatusReport {
    pub deal_id: Uuid,
    pub deal_status: DealStatus,
    pub overall_percentage: u8,
    pub agents: Vec<AgentStatusEntry>,
    pub bottlenecks: Vec<Bottleneck>,
    pub next_actions: Vec<NextAction>,
    pub recursive_analysis_needed: bool,
    pub generated_at: DateTime<Utc>,
}

impl DealStatusReport {
    pub fn agent(&self, agent_type: AgentType) -> Option<&AgentStatusEntry> {
        self.agents
            .iter()
            .filter(|entry| entry.agent_type == agent_type)
            .max_by_key(|entry| entry.recursion_level)
    }

    pub fn bottleneck(&self, kind: BottleneckKind) -> Option<&Bottleneck> {
        self.bottlenecks.iter().find(|bottleneck| bottleneck.kind == kind)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancellationSummary {
    pub deal_id: Uuid,
    pub cancelled_count: usize,
    /// Not-yet-started jobs removed from the queues
    pub jobs_removed: usize,
    /// Executions left running to finish on their own
    pub still_running: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySummary {
    pub deal_id: Uuid,
    /// Executions reset to `pending`
    pub retried: usize,
    pub execution_ids: Vec<Uuid>,
    /// Reset executions whose job could not be submitted; they stay `pending`
    /// for the resolver to pick up
    pub enqueue_failures: Vec<EnqueueFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnqueueFailure {
    pub execution_id: Uuid,
    pub agent_type: AgentType,
    pub error: String,
}

/// Outcome of one dependency-resolution pass over a deal
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionSummary {
    pub promoted: Vec<Uuid>,
    pub pending_remaining: usize,
    pub finalized: bool,
}
