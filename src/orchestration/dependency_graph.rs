//! # Dependency Graph & Phase Builder
//!
//! Turns the static agent-type dependency map into ordered phases by iterative
//! layering: each round takes every unprocessed agent type whose prerequisites are
//! all in earlier phases. A round that makes no progress means a cycle, which is
//! reported as [`ConfigurationError::DependencyCycle`] naming the remaining types.
//!
//! Duration estimates are an approximation, not a critical-path computation: the
//! root phase runs in parallel (slowest member), later phases follow
//! `planning.dependent_phase_mode`, and the plan total is the sum of its phases.

use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

use crate::config::{ConfigResult, ConfigurationError, OrchestratorConfig};
use crate::models::{AgentType, ExecutionPlan, Phase, PhaseExecutionMode};

/// Validated prerequisite map over the configured agent types
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyGraph {
    dependencies: BTreeMap<AgentType, BTreeSet<AgentType>>,
}

impl DependencyGraph {
    /// Build a graph, rejecting empty maps, self-dependencies and prerequisites
    /// outside the configured set. Cycles are reported by [`Self::build_phases`].
    pub fn new(dependencies: BTreeMap<AgentType, BTreeSet<AgentType>>) -> ConfigResult<Self> {
        if dependencies.is_empty() {
            return Err(ConfigurationError::NoAgentTypes);
        }

        for (agent_type, prerequisites) in &dependencies {
            for dependency in prerequisites {
                if dependency == agent_type {
                    return Err(ConfigurationError::SelfDependency {
                        agent_type: *agent_type,
                    });
                }
                if !dependencies.contains_key(dependency) {
                    return Err(ConfigurationError::UnknownDependency {
                        agent_type: *agent_type,
                        dependency: *dependency,
                    });
                }
            }
        }

        Ok(Self { dependencies })
    }

    pub fn from_config(config: &OrchestratorConfig) -> ConfigResult<Self> {
        Self::new(config.dependency_map())
    }

    /// Configured agent types in declaration order
    pub fn agent_types(&self) -> impl Iterator<Item = AgentType> + '_ {
        self.dependencies.keys().copied()
    }

    pub fn contains(&self, agent_type: AgentType) -> bool {
        self.dependencies.contains_key(&agent_type)
    }

    pub fn len(&self) -> usize {
        self.dependencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }

    /// Prerequisites of `agent_type`; empty for unknown types
    pub fn dependencies_of(&self, agent_type: AgentType) -> impl Iterator<Item = AgentType> + '_ {
        self.dependencies
            .get(&agent_type)
            .into_iter()
            .flat_map(|prerequisites| prerequisites.iter().copied())
    }

    /// Layer the graph into phases; every agent type appears exactly once
    pub fn build_phases(&self) -> ConfigResult<Vec<Vec<AgentType>>> {
        let mut processed: BTreeSet<AgentType> = BTreeSet::new();
        let mut phases = Vec::new();

        while processed.len() < self.dependencies.len() {
            let phase: Vec<AgentType> = self
                .dependencies
                .iter()
                .filter(|(agent_type, prerequisites)| {
                    !processed.contains(agent_type) && prerequisites.is_subset(&processed)
                })
                .map(|(agent_type, _)| *agent_type)
                .collect();

            if phase.is_empty() {
                let remaining = self
                    .agent_types()
                    .filter(|agent_type| !processed.contains(agent_type))
                    .collect();
                return Err(ConfigurationError::DependencyCycle { remaining });
            }

            processed.extend(phase.iter().copied());
            phases.push(phase);
        }

        Ok(phases)
    }

    /// Build the phased plan for `deal_id` with duration estimates from `config`
    pub fn execution_plan(
        &self,
        deal_id: Uuid,
        config: &OrchestratorConfig,
    ) -> ConfigResult<ExecutionPlan> {
        let layers = self.build_phases()?;
        let mut phases = Vec::with_capacity(layers.len());
        let mut task_distribution = BTreeMap::new();

        for (index, agent_types) in layers.into_iter().enumerate() {
            let number = index + 1;
            let mode = if index == 0 {
                PhaseExecutionMode::Parallel
            } else {
                config.planning.dependent_phase_mode
            };

            let durations = agent_types
                .iter()
                .map(|agent_type| {
                    config.expected_duration_hours(*agent_type).ok_or_else(|| {
                        ConfigurationError::invalid_value(
                            format!("agents.{agent_type}.expected_duration_hours"),
                            "missing",
                            "every planned agent type needs an expected duration",
                        )
                    })
                })
                .collect::<ConfigResult<Vec<f64>>>()?;

            for agent_type in &agent_types {
                task_distribution.insert(*agent_type, number);
            }
            phases.push(Phase {
                number,
                agent_types,
                mode,
                estimated_duration_hours: phase_duration(mode, &durations),
            });
        }

        let estimated_duration_hours = phases
            .iter()
            .map(|phase| phase.estimated_duration_hours)
            .sum();

        Ok(ExecutionPlan {
            deal_id,
            phases,
            estimated_duration_hours,
            task_distribution,
            created_at: Utc::now(),
        })
    }
}

fn phase_duration(mode: PhaseExecutionMode, durations: &[f64]) -> f64 {
    match mode {
        PhaseExecutionMode::Parallel => durations.iter().copied().fold(0.0, f64::max),
        PhaseExecutionMode::Sequential => durations.iter().sum(),
    }
}
