#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Diligence Core
//!
//! Orchestration core for multi-agent due-diligence analysis.
//!
//! ## Overview
//!
//! A deal is analysed by a fixed set of agents (finance, legal, synergy,
//! reputation, operations), some of which depend on the output of others. This
//! crate turns the configured dependencies into a phased execution plan, tracks
//! one execution record per agent and recursion level, dispatches ready work to
//! per-agent job queues, promotes dependents as prerequisites complete and
//! reports progress, bottlenecks and recommended next actions.
//!
//! ## Module Organization
//!
//! - [`config`] - Layered configuration (defaults, TOML files, environment)
//! - [`models`] - Deals, agent executions, plans and timeline events
//! - [`state_machine`] - Execution lifecycle transitions
//! - [`repository`] - Persistence traits with in-memory and PostgreSQL backends
//! - [`queue`] - Per-agent job queues with retry backoff
//! - [`orchestration`] - Planning, dispatch, dependency resolution, progress analysis
//! - [`worker`] - Agent worker contract and the pool that runs them
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use diligence_core::orchestration::OrchestrationSystem;
//! use diligence_core::repository::InMemoryStores;
//!
//! # async fn example() -> diligence_core::OrchestratorResult<()> {
//! let stores = InMemoryStores::new();
//! let deal = stores.seed_deal("Project Atlas");
//!
//! let system = OrchestrationSystem::builder()
//!     .repositories(stores.repository_set())
//!     .build()?;
//!
//! let plan = system.orchestrator().create_orchestration_plan(deal.deal_id).await?;
//! println!("{} phases, ~{}h", plan.phases.len(), plan.estimated_duration_hours);
//!
//! let status = system.orchestrator().get_deal_status(deal.deal_id).await?;
//! println!("{}% complete", status.overall_percentage);
//! system.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod queue;
pub mod repository;
pub mod state_machine;
pub mod worker;

pub use config::{ConfigManager, ConfigurationError, OrchestratorConfig};
pub use error::{OrchestratorError, OrchestratorResult};
pub use models::{AgentExecution, AgentType, Deal, DealStatus, ExecutionPlan};
pub use orchestration::{DealOrchestrator, DealStatusReport, OrchestrationSystem};
pub use state_machine::ExecutionStatus;
pub use worker::{AgentWorker, WorkerError, WorkerJob};
