use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::agent_type::AgentType;
use crate::queue::JobId;
use crate::state_machine::ExecutionStatus;

/// One run of one analysis task for one deal.
///
/// Records are only ever appended and moved forward through the execution state
/// machine; re-analysis creates a new record with a higher `recursion_level` that
/// points back at its parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentExecution {
    pub execution_id: Uuid,
    pub deal_id: Uuid,
    pub agent_type: AgentType,
    pub recursion_level: u32,
    pub parent_execution_id: Option<Uuid>,
    pub status: ExecutionStatus,
    pub progress_percentage: u8,
    pub input_data: Option<Value>,
    pub output_data: Option<Value>,
    pub error_message: Option<String>,
    pub queued_at: Option<DateTime<Utc>>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub retry_count: u32,
    pub job_id: Option<JobId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Values needed to seed a new execution record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAgentExecution {
    pub deal_id: Uuid,
    pub agent_type: AgentType,
    pub recursion_level: u32,
    pub parent_execution_id: Option<Uuid>,
    pub input_data: Option<Value>,
}

impl NewAgentExecution {
    pub fn root(deal_id: Uuid, agent_type: AgentType, input_data: Option<Value>) -> Self {
        Self {
            deal_id,
            agent_type,
            recursion_level: 0,
            parent_execution_id: None,
            input_data,
        }
    }

    /// Child of `parent` one recursion level deeper
    pub fn recursive(parent: &AgentExecution, input_data: Option<Value>) -> Self {
        Self {
            deal_id: parent.deal_id,
            agent_type: parent.agent_type,
            recursion_level: parent.recursion_level + 1,
            parent_execution_id: Some(parent.execution_id),
            input_data,
        }
    }

    pub fn into_execution(self, now: DateTime<Utc>) -> AgentExecution {
        AgentExecution {
            execution_id: Uuid::new_v4(),
            deal_id: self.deal_id,
            agent_type: self.agent_type,
            recursion_level: self.recursion_level,
            parent_execution_id: self.parent_execution_id,
            status: ExecutionStatus::Pending,
            progress_percentage: 0,
            input_data: self.input_data,
            output_data: None,
            error_message: None,
            queued_at: None,
            start_time: None,
            end_time: None,
            duration_ms: None,
            retry_count: 0,
            job_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}

impl AgentExecution {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Elapsed running time at `now`, if the execution has started
    pub fn running_for(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        match (self.status, self.start_time) {
            (ExecutionStatus::Running, Some(start)) => Some(now - start),
            _ => None,
        }
    }
}

/// Keep only the most recent recursion level of each agent type.
///
/// Dependency checks and "current status" questions are answered against the
/// latest execution of an agent type, not against superseded history.
pub fn latest_per_agent_type(
    executions: &[AgentExecution],
) -> std::collections::BTreeMap<AgentType, &AgentExecution> {
    let mut latest: std::collections::BTreeMap<AgentType, &AgentExecution> =
        std::collections::BTreeMap::new();
    for execution in executions {
        latest
            .entry(execution.agent_type)
            .and_modify(|current| {
                if execution.recursion_level > current.recursion_level {
                    *current = execution;
                }
            })
            .or_insert(execution);
    }
    latest
}
