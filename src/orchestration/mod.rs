//! # Orchestration Engine
//!
//! Coordinates the analysis agents of a deal from plan to completion.
//!
//! ## Core Components
//!
//! - **DependencyGraph**: validated agent dependencies and phase layering
//! - **DealOrchestrator**: public entry point for planning, status, cancel, retry and re-analysis
//! - **TaskDispatcher**: bridges execution records and the job queue, applies worker lifecycle events
//! - **DependencyResolver**: push-driven promotion of ready executions with a per-deal fallback poller
//! - **ProgressAnalyzer**: pure progress, bottleneck and next-action derivation
//! - **OrchestrationSystem**: wires all of the above together

pub mod bootstrap;
pub mod dependency_graph;
pub mod dependency_resolver;
pub mod dispatcher;
pub mod orchestrator;
pub mod progress_analyzer;
pub mod types;

pub use bootstrap::{OrchestrationSystem, OrchestrationSystemBuilder};
pub use dependency_graph::DependencyGraph;
pub use dependency_resolver::DependencyResolver;
pub use dispatcher::{ClaimedJob, FailureDisposition, ResolutionTrigger, TaskDispatcher};
pub use orchestrator::DealOrchestrator;
pub use progress_analyzer::ProgressAnalyzer;
pub use types::{
    AgentStatusEntry, Bottleneck, BottleneckKind, CancellationSummary, DealStatusReport, EnqueueFailure,
    NextAction, ProgressAnalysis, ResolutionSummary, RetrySummary, Severity,
};
