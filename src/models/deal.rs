use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Coarse status of a deal as tracked by the external deal store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DealStatus {
    Draft,
    Analyzing,
    Completed,
    Cancelled,
}

impl fmt::Display for DealStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::Analyzing => write!(f, "analyzing"),
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Record shape the orchestrator reads from the deal store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deal {
    pub deal_id: Uuid,
    pub company_id: Uuid,
    pub name: String,
    pub status: DealStatus,
    pub updated_at: DateTime<Utc>,
}

impl Deal {
    pub fn new(company_id: Uuid, name: impl Into<String>) -> Self {
        Self {
            deal_id: Uuid::new_v4(),
            company_id,
            name: name.into(),
            status: DealStatus::Draft,
            updated_at: Utc::now(),
        }
    }
}

/// Target company of a deal; only its existence matters to orchestration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    pub company_id: Uuid,
    pub name: String,
}

impl Company {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            company_id: Uuid::new_v4(),
            name: name.into(),
        }
    }
}
