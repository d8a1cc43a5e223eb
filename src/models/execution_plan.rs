use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::agent_type::AgentType;

/// How the members of a phase are expected to run when estimating duration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseExecutionMode {
    /// Members run side by side; the phase takes as long as its slowest member
    Parallel,
    /// Members are accounted one after another; durations add up
    Sequential,
}

/// A set of agent types schedulable together once every earlier phase completed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    /// 1-based position in the plan
    pub number: usize,
    pub agent_types: Vec<AgentType>,
    pub mode: PhaseExecutionMode,
    pub estimated_duration_hours: f64,
}

/// Ordered phases for one deal plus the duration estimate derived from them.
///
/// The estimate sums per-phase estimates; it is an approximation and not a
/// critical-path computation over the dependency graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub deal_id: Uuid,
    pub phases: Vec<Phase>,
    pub estimated_duration_hours: f64,
    /// Phase number each agent type was placed in
    pub task_distribution: BTreeMap<AgentType, usize>,
    pub created_at: DateTime<Utc>,
}

impl ExecutionPlan {
    pub fn phase_of(&self, agent_type: AgentType) -> Option<usize> {
        self.task_distribution.get(&agent_type).copied()
    }

    /// Agent types that can be dispatched as soon as the plan is seeded
    pub fn initial_agents(&self) -> &[AgentType] {
        self.phases
            .first()
            .map(|phase| phase.agent_types.as_slice())
            .unwrap_or(&[])
    }

    pub fn agent_count(&self) -> usize {
        self.task_distribution.len()
    }
}
