use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Kinds of entries written to a deal's append-only timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelineEventType {
    PlanCreated,
    AgentQueued,
    AgentStarted,
    AgentCompleted,
    AgentFailed,
    AgentRetryScheduled,
    AgentCancelled,
    AgentReset,
    OrchestrationCancelled,
    OrchestrationCompleted,
    RecursiveAnalysisStarted,
}

impl TimelineEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PlanCreated => "plan_created",
            Self::AgentQueued => "agent_queued",
            Self::AgentStarted => "agent_started",
            Self::AgentCompleted => "agent_completed",
            Self::AgentFailed => "agent_failed",
            Self::AgentRetryScheduled => "agent_retry_scheduled",
            Self::AgentCancelled => "agent_cancelled",
            Self::AgentReset => "agent_reset",
            Self::OrchestrationCancelled => "orchestration_cancelled",
            Self::OrchestrationCompleted => "orchestration_completed",
            Self::RecursiveAnalysisStarted => "recursive_analysis_started",
        }
    }
}

impl fmt::Display for TimelineEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TimelineEventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plan_created" => Ok(Self::PlanCreated),
            "agent_queued" => Ok(Self::AgentQueued),
            "agent_started" => Ok(Self::AgentStarted),
            "agent_completed" => Ok(Self::AgentCompleted),
            "agent_failed" => Ok(Self::AgentFailed),
            "agent_retry_scheduled" => Ok(Self::AgentRetryScheduled),
            "agent_cancelled" => Ok(Self::AgentCancelled),
            "agent_reset" => Ok(Self::AgentReset),
            "orchestration_cancelled" => Ok(Self::OrchestrationCancelled),
            "orchestration_completed" => Ok(Self::OrchestrationCompleted),
            "recursive_analysis_started" => Ok(Self::RecursiveAnalysisStarted),
            _ => Err(format!("Invalid timeline event type: {s}")),
        }
    }
}

/// Append-only log entry for a deal; never mutated after it is written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub event_id: Uuid,
    pub deal_id: Uuid,
    pub event_type: TimelineEventType,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

impl TimelineEvent {
    pub fn new(deal_id: Uuid, event_type: TimelineEventType, payload: Value) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            deal_id,
            event_type,
            payload,
            timestamp: Utc::now(),
        }
    }
}
