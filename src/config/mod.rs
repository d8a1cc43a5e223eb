//! # Orchestration Configuration
//!
//! Immutable configuration injected into every orchestration component: the
//! per-agent-type tables (expected duration, dispatch priority, prerequisites),
//! retry/backoff policy, resolver timing, bottleneck thresholds and worker pool
//! sizing.
//!
//! Values come from built-in defaults, an optional TOML file and `DILIGENCE__*`
//! environment overrides (see [`ConfigManager`]).
//!
//! ```toml
//! [agents.finance]
//! expected_duration_hours = 2.5
//! priority = 1
//!
//! [agents.synergy]
//! expected_duration_hours = 1.5
//! priority = 3
//! depends_on = ["finance"]
//!
//! [resolver]
//! poll_interval_ms = 2000
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

use crate::models::{AgentType, PhaseExecutionMode};
use crate::orchestration::dependency_graph::DependencyGraph;

/// Root configuration structure mirroring `config/diligence.toml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Participating agent types and their static tables
    pub agents: BTreeMap<AgentType, AgentSettings>,
    pub planning: PlanningConfig,
    pub dispatch: DispatchConfig,
    pub resolver: ResolverConfig,
    pub analysis: AnalysisConfig,
    pub workers: WorkerConfig,
}

/// Static settings of one agent type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSettings {
    pub expected_duration_hours: f64,
    /// Lower values are dispatched first within the agent type's queue
    pub priority: u32,
    #[serde(default)]
    pub depends_on: Vec<AgentType>,
}

impl AgentSettings {
    pub fn new(expected_duration_hours: f64, priority: u32, depends_on: &[AgentType]) -> Self {
        Self {
            expected_duration_hours,
            priority,
            depends_on: depends_on.to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanningConfig {
    /// Duration accounting for phases after the first
    pub dependent_phase_mode: PhaseExecutionMode,
}

impl Default for PlanningConfig {
    fn default() -> Self {
        Self {
            dependent_phase_mode: PhaseExecutionMode::Sequential,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Attempts a job gets before a transient failure becomes a recorded failure
    pub max_attempts: u32,
    /// Attempts at handing a job to the queue backend
    pub submit_attempts: u32,
    pub backoff: BackoffConfig,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            submit_attempts: 3,
            backoff: BackoffConfig::default(),
        }
    }
}

/// Exponential backoff: `base_delay_ms * multiplier^(attempt - 1)`, capped
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub base_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
    pub jitter_enabled: bool,
    /// Maximum jitter as a fraction of the delay (0.0 to 1.0)
    pub max_jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            multiplier: 2.0,
            max_delay_ms: 60_000,
            jitter_enabled: true,
            max_jitter: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Re-check dependents as soon as a prerequisite completes
    pub push_enabled: bool,
    /// Run the per-deal safety-net poller
    pub poll_enabled: bool,
    pub poll_interval_ms: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            push_enabled: true,
            poll_enabled: true,
            poll_interval_ms: 5_000,
        }
    }
}

impl ResolverConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Multiple of the expected duration after which a running agent is a bottleneck
    pub long_running_factor: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            long_running_factor: 1.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub concurrency_per_type: usize,
    pub idle_poll_interval_ms: u64,
    /// Delay before a job whose execution is not yet `queued` becomes claimable again
    pub claim_retry_delay_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency_per_type: 2,
            idle_poll_interval_ms: 250,
            claim_retry_delay_ms: 100,
        }
    }
}

impl WorkerConfig {
    pub fn idle_poll_interval(&self) -> Duration {
        Duration::from_millis(self.idle_poll_interval_ms)
    }

    pub fn claim_retry_delay(&self) -> Duration {
        Duration::from_millis(self.claim_retry_delay_ms)
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        let agents = BTreeMap::from([
            (AgentType::Finance, AgentSettings::new(2.5, 1, &[])),
            (AgentType::Legal, AgentSettings::new(3.0, 2, &[])),
            (AgentType::Reputation, AgentSettings::new(1.0, 3, &[])),
            (
                AgentType::Synergy,
                AgentSettings::new(1.5, 4, &[AgentType::Finance]),
            ),
            (
                AgentType::Operations,
                AgentSettings::new(2.0, 5, &[AgentType::Finance, AgentType::Legal]),
            ),
        ]);

        Self {
            agents,
            planning: PlanningConfig::default(),
            dispatch: DispatchConfig::default(),
            resolver: ResolverConfig::default(),
            analysis: AnalysisConfig::default(),
            workers: WorkerConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Configured agent types in canonical order
    pub fn agent_types(&self) -> Vec<AgentType> {
        self.agents.keys().copied().collect()
    }

    pub fn dependency_map(&self) -> BTreeMap<AgentType, BTreeSet<AgentType>> {
        self.agents
            .iter()
            .map(|(agent_type, settings)| {
                (*agent_type, settings.depends_on.iter().copied().collect())
            })
            .collect()
    }

    pub fn expected_duration_hours(&self, agent_type: AgentType) -> Option<f64> {
        self.agents
            .get(&agent_type)
            .map(|settings| settings.expected_duration_hours)
    }

    /// Dispatch priority; unconfigured agent types sort last
    pub fn priority(&self, agent_type: AgentType) -> u32 {
        self.agents
            .get(&agent_type)
            .map(|settings| settings.priority)
            .unwrap_or(u32::MAX)
    }

    /// Reject values no component can work with, including dependency maps that do
    /// not form a DAG
    pub fn validate(&self) -> ConfigResult<()> {
        for (agent_type, settings) in &self.agents {
            if !(settings.expected_duration_hours.is_finite()
                && settings.expected_duration_hours > 0.0)
            {
                return Err(ConfigurationError::invalid_value(
                    format!("agents.{agent_type}.expected_duration_hours"),
                    settings.expected_duration_hours,
                    "must be a positive number of hours",
                ));
            }
        }

        if self.dispatch.max_attempts == 0 {
            return Err(ConfigurationError::invalid_value(
                "dispatch.max_attempts",
                0,
                "at least one attempt is required",
            ));
        }
        if self.dispatch.submit_attempts == 0 {
            return Err(ConfigurationError::invalid_value(
                "dispatch.submit_attempts",
                0,
                "at least one attempt is required",
            ));
        }
        let backoff = &self.dispatch.backoff;
        if backoff.multiplier < 1.0 {
            return Err(ConfigurationError::invalid_value(
                "dispatch.backoff.multiplier",
                backoff.multiplier,
                "must be >= 1.0",
            ));
        }
        if !(0.0..=1.0).contains(&backoff.max_jitter) {
            return Err(ConfigurationError::invalid_value(
                "dispatch.backoff.max_jitter",
                backoff.max_jitter,
                "must be between 0.0 and 1.0",
            ));
        }
        if self.resolver.poll_interval_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "resolver.poll_interval_ms",
                0,
                "must be greater than zero",
            ));
        }
        if self.analysis.long_running_factor <= 0.0 {
            return Err(ConfigurationError::invalid_value(
                "analysis.long_running_factor",
                self.analysis.long_running_factor,
                "must be greater than zero",
            ));
        }
        if self.workers.idle_poll_interval_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "workers.idle_poll_interval_ms",
                0,
                "must be greater than zero",
            ));
        }

        DependencyGraph::from_config(self)?.build_phases()?;
        Ok(())
    }
}
