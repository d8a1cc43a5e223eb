use thiserror::Error;

use crate::models::AgentType;

/// Configuration failures; all of them are fatal to the operation that hit them
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    #[error("Dependency cycle detected among agent types {remaining:?}")]
    DependencyCycle { remaining: Vec<AgentType> },

    #[error("Agent type {agent_type} depends on itself")]
    SelfDependency { agent_type: AgentType },

    #[error("Agent type {agent_type} depends on {dependency}, which is not configured")]
    UnknownDependency {
        agent_type: AgentType,
        dependency: AgentType,
    },

    #[error("No agent types configured")]
    NoAgentTypes,

    #[error("Invalid value for {field}: {value} ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to load configuration: {0}")]
    Load(String),
}

impl ConfigurationError {
    pub fn invalid_value(
        field: impl Into<String>,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<config::ConfigError> for ConfigurationError {
    fn from(err: config::ConfigError) -> Self {
        Self::Load(err.to_string())
    }
}

pub type ConfigResult<T> = Result<T, ConfigurationError>;
