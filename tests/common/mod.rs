//! Shared fixtures for integration tests: configurations, a harness around the
//! in-memory system, scripted agent workers and proptest strategies.

#![allow(dead_code)]

pub mod strategies;
pub mod workers;

pub use strategies::*;
pub use workers::*;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use diligence_core::config::{AgentSettings, OrchestratorConfig};
use diligence_core::models::{AgentType, Deal};
use diligence_core::orchestration::OrchestrationSystem;
use diligence_core::queue::{BackoffCalculator, InMemoryJobQueue, JobQueue};
use diligence_core::repository::{
    ExecutionRepository, InMemoryExecutionRepository, InMemoryStores, RepositorySet,
};
use diligence_core::worker::AgentWorker;
use std::collections::BTreeMap;

/// finance, legal, synergy(finance), operations(finance, legal)
pub fn four_agent_config() -> OrchestratorConfig {
    let mut config = OrchestratorConfig::default();
    config.agents = BTreeMap::from([
        (AgentType::Finance, AgentSettings::new(2.5, 1, &[])),
        (AgentType::Legal, AgentSettings::new(3.0, 2, &[])),
        (
            AgentType::Synergy,
            AgentSettings::new(1.5, 3, &[AgentType::Finance]),
        ),
        (
            AgentType::Operations,
            AgentSettings::new(2.0, 4, &[AgentType::Finance, AgentType::Legal]),
        ),
    ]);
    config
}

/// Millisecond-scale timings so retry and polling paths finish quickly
pub fn fast(mut config: OrchestratorConfig) -> OrchestratorConfig {
    config.dispatch.backoff.base_delay_ms = 5;
    config.dispatch.backoff.max_delay_ms = 20;
    config.dispatch.backoff.jitter_enabled = false;
    config.resolver.poll_interval_ms = 20;
    config.workers.concurrency_per_type = 1;
    config.workers.idle_poll_interval_ms = 5;
    config.workers.claim_retry_delay_ms = 5;
    config
}

/// Push and poll off: dependency resolution only runs when a test asks for it
pub fn manual_resolution(mut config: OrchestratorConfig) -> OrchestratorConfig {
    config.resolver.push_enabled = false;
    config.resolver.poll_enabled = false;
    config
}

/// In-memory system plus typed access to its stores and queue
pub struct TestHarness {
    pub stores: InMemoryStores,
    pub queue: Arc<InMemoryJobQueue>,
    pub system: OrchestrationSystem,
}

impl TestHarness {
    pub fn new(config: OrchestratorConfig) -> Self {
        Self::with_workers(config, Vec::new())
    }

    pub fn with_workers(config: OrchestratorConfig, workers: Vec<Arc<dyn AgentWorker>>) -> Self {
        Self::build(config, workers, |stores| stores.repository_set())
    }

    /// Like `new`, but the system sees `executions` in front of the in-memory store
    pub fn with_executions(
        config: OrchestratorConfig,
        executions: impl FnOnce(Arc<InMemoryExecutionRepository>) -> Arc<dyn ExecutionRepository>,
    ) -> Self {
        Self::build(config, Vec::new(), |stores| {
            let mut repositories = stores.repository_set();
            repositories.executions = executions(stores.executions.clone());
            repositories
        })
    }

    fn build(
        config: OrchestratorConfig,
        workers: Vec<Arc<dyn AgentWorker>>,
        repositories: impl FnOnce(&InMemoryStores) -> RepositorySet,
    ) -> Self {
        let stores = InMemoryStores::new();
        let queue = Arc::new(InMemoryJobQueue::new(BackoffCalculator::new(
            config.dispatch.backoff.clone(),
        )));

        let mut builder = OrchestrationSystem::builder()
            .config(config)
            .repositories(repositories(&stores))
            .queue(queue.clone() as Arc<dyn JobQueue>);
        for worker in workers {
            builder = builder.worker(worker);
        }
        let system = builder.build().expect("test system should build");

        Self {
            stores,
            queue,
            system,
        }
    }

    pub fn seed_deal(&self) -> Deal {
        self.stores.seed_deal("Project Atlas")
    }

    pub async fn shutdown(self) {
        self.system.shutdown().await;
    }
}

/// Poll `check` until it returns true or `timeout` elapses
pub async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
