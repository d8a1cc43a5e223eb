use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use crate::models::{AgentExecution, AgentType};

/// Queue-level identity of a submitted job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for JobId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unit of work handed to the worker of one agent type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub job_id: JobId,
    pub execution_id: Uuid,
    pub deal_id: Uuid,
    pub agent_type: AgentType,
    pub recursion_level: u32,
    pub input_data: Option<Value>,
    /// Lower values are claimed first
    pub priority: u32,
    pub max_attempts: u32,
    /// Claims made so far, including the one currently in flight
    pub attempts_made: u32,
    pub enqueued_at: DateTime<Utc>,
}

impl Job {
    pub fn for_execution(execution: &AgentExecution, priority: u32, max_attempts: u32) -> Self {
        Self {
            job_id: JobId::new(),
            execution_id: execution.execution_id,
            deal_id: execution.deal_id,
            agent_type: execution.agent_type,
            recursion_level: execution.recursion_level,
            input_data: execution.input_data.clone(),
            priority,
            max_attempts,
            attempts_made: 0,
            enqueued_at: Utc::now(),
        }
    }
}

/// Acknowledgement returned by a successful submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    pub job_id: JobId,
    pub agent_type: AgentType,
    pub priority: u32,
}

/// Point-in-time counters of one agent type's queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub waiting: u64,
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
    pub delayed: u64,
}

impl QueueStats {
    /// Jobs that still need a worker
    pub fn backlog(&self) -> u64 {
        self.waiting + self.delayed
    }
}

/// What the queue did with a job reported as failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// The job was moved to the delayed set and will be claimable again
    Retrying { attempt: u32, delay: Duration },
    /// The job was dropped and counted as failed
    Exhausted { attempts: u32 },
}
