use serde::{Deserialize, Serialize};
use std::fmt;

/// The analysis tasks every deal runs through.
///
/// Declaration order is the canonical ordering used whenever agent types are
/// listed (phases, bottleneck agent lists, status reports).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    /// Financial statement and ratio analysis
    Finance,
    /// Contract, litigation and regulatory review
    Legal,
    /// Revenue and cost synergy modelling
    Synergy,
    /// Media and market reputation screening
    Reputation,
    /// Operational capability assessment
    Operations,
}

impl AgentType {
    pub const ALL: [AgentType; 5] = [
        Self::Finance,
        Self::Legal,
        Self::Synergy,
        Self::Reputation,
        Self::Operations,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Finance => "finance",
            Self::Legal => "legal",
            Self::Synergy => "synergy",
            Self::Reputation => "reputation",
            Self::Operations => "operations",
        }
    }

    /// Name of the work queue carrying jobs for this agent type
    pub fn queue_name(&self) -> String {
        format!("{}_agent_queue", self.as_str())
    }
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AgentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "finance" => Ok(Self::Finance),
            "legal" => Ok(Self::Legal),
            "synergy" => Ok(Self::Synergy),
            "reputation" => Ok(Self::Reputation),
            "operations" => Ok(Self::Operations),
            _ => Err(format!("Invalid agent type: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_type_string_conversion() {
        for agent_type in AgentType::ALL {
            assert_eq!(
                agent_type.as_str().parse::<AgentType>().unwrap(),
                agent_type
            );
        }
        assert!("marketing".parse::<AgentType>().is_err());
    }

    #[test]
    fn test_agent_type_serde_uses_snake_case() {
        let json = serde_json::to_string(&AgentType::Operations).unwrap();
        assert_eq!(json, "\"operations\"");
    }

    #[test]
    fn test_queue_name() {
        assert_eq!(AgentType::Legal.queue_name(), "legal_agent_queue");
    }
}
