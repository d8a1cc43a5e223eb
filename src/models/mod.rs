//! # Models
//!
//! Record shapes the orchestration core reads and writes. Persistence lives behind
//! the traits in [`crate::repository`].

pub mod agent_execution;
pub mod agent_type;
pub mod deal;
pub mod execution_plan;
pub mod timeline_event;

pub use agent_execution::{latest_per_agent_type, AgentExecution, NewAgentExecution};
pub use agent_type::AgentType;
pub use deal::{Company, Deal, DealStatus};
pub use execution_plan::{ExecutionPlan, Phase, PhaseExecutionMode};
pub use timeline_event::{TimelineEvent, TimelineEventType};
