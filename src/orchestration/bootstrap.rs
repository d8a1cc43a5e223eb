//! # Orchestration Bootstrap
//!
//! Wires configuration, repositories, the job queue, dispatcher, resolver,
//! orchestrator and an optional worker pool into one running system, and tears
//! it down again.
//!
//! ```no_run
//! use diligence_core::orchestration::OrchestrationSystem;
//!
//! # async fn example() -> diligence_core::OrchestratorResult<()> {
//! let system = OrchestrationSystem::builder().build()?;
//! let stats = system.orchestrator().get_queue_stats().await?;
//! assert!(stats.values().all(|queue| queue.waiting == 0));
//! system.shutdown().await;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::dependency_graph::DependencyGraph;
use super::dependency_resolver::DependencyResolver;
use super::dispatcher::TaskDispatcher;
use super::orchestrator::DealOrchestrator;
use crate::config::OrchestratorConfig;
use crate::error::OrchestratorResult;
use crate::queue::{BackoffCalculator, InMemoryJobQueue, JobQueue};
use crate::repository::{InMemoryStores, RepositorySet};
use crate::worker::{AgentWorker, WorkerPool};

#[derive(Default)]
pub struct OrchestrationSystemBuilder {
    config: Option<OrchestratorConfig>,
    repositories: Option<RepositorySet>,
    queue: Option<Arc<dyn JobQueue>>,
    workers: Vec<Arc<dyn AgentWorker>>,
}

impl OrchestrationSystemBuilder {
    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn repositories(mut self, repositories: RepositorySet) -> Self {
        self.repositories = Some(repositories);
        self
    }

    pub fn queue(mut self, queue: Arc<dyn JobQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Register a worker; the pool only starts when at least one is registered
    pub fn worker(mut self, worker: Arc<dyn AgentWorker>) -> Self {
        self.workers.push(worker);
        self
    }

    /// Validate configuration and start the system. Must run inside a tokio runtime.
    pub fn build(self) -> OrchestratorResult<OrchestrationSystem> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let config = Arc::new(config);
        let graph = Arc::new(DependencyGraph::from_config(&config)?);

        let repositories = self
            .repositories
            .unwrap_or_else(|| InMemoryStores::new().repository_set());
        let queue = self.queue.unwrap_or_else(|| {
            Arc::new(InMemoryJobQueue::new(BackoffCalculator::new(
                config.dispatch.backoff.clone(),
            )))
        });

        let (resolution_tx, resolution_rx) = mpsc::unbounded_channel();
        let dispatcher = Arc::new(TaskDispatcher::new(
            config.clone(),
            repositories.executions.clone(),
            repositories.timeline.clone(),
            queue.clone(),
            config.resolver.push_enabled.then_some(resolution_tx),
        ));
        let resolver = Arc::new(DependencyResolver::new(
            config.clone(),
            graph.clone(),
            repositories.executions.clone(),
            repositories.deals.clone(),
            dispatcher.clone(),
        ));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let listener = config
            .resolver
            .push_enabled
            .then(|| resolver.spawn_push_listener(resolution_rx, shutdown_rx));

        let orchestrator = Arc::new(DealOrchestrator::new(
            config.clone(),
            graph,
            repositories,
            dispatcher.clone(),
            resolver.clone(),
        ));

        let worker_pool = (!self.workers.is_empty())
            .then(|| WorkerPool::start(dispatcher.clone(), self.workers, &config.workers));

        info!(
            queue_provider = queue.provider_name(),
            agent_types = config.agents.len(),
            push_resolution = config.resolver.push_enabled,
            fallback_polling = config.resolver.poll_enabled,
            worker_loops = worker_pool.as_ref().map(WorkerPool::loop_count).unwrap_or(0),
            "Orchestration system started"
        );

        Ok(OrchestrationSystem {
            config,
            orchestrator,
            dispatcher,
            resolver,
            queue,
            shutdown_tx,
            listener,
            worker_pool,
        })
    }
}

/// Handle on a running orchestration system
pub struct OrchestrationSystem {
    config: Arc<OrchestratorConfig>,
    orchestrator: Arc<DealOrchestrator>,
    dispatcher: Arc<TaskDispatcher>,
    resolver: Arc<DependencyResolver>,
    queue: Arc<dyn JobQueue>,
    shutdown_tx: watch::Sender<bool>,
    listener: Option<JoinHandle<()>>,
    worker_pool: Option<WorkerPool>,
}

impl std::fmt::Debug for OrchestrationSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrchestrationSystem")
            .field("queue_provider", &self.queue.provider_name())
            .field("listener_running", &self.listener.is_some())
            .field("worker_pool", &self.worker_pool)
            .finish()
    }
}

impl OrchestrationSystem {
    pub fn builder() -> OrchestrationSystemBuilder {
        OrchestrationSystemBuilder::default()
    }

    pub fn config(&self) -> &Arc<OrchestratorConfig> {
        &self.config
    }

    pub fn orchestrator(&self) -> &Arc<DealOrchestrator> {
        &self.orchestrator
    }

    pub fn dispatcher(&self) -> &Arc<TaskDispatcher> {
        &self.dispatcher
    }

    pub fn resolver(&self) -> &Arc<DependencyResolver> {
        &self.resolver
    }

    pub fn queue(&self) -> &Arc<dyn JobQueue> {
        &self.queue
    }

    /// Stop workers, the resolution listener and every fallback poller
    pub async fn shutdown(self) {
        info!("Shutting down orchestration system");
        let _ = self.shutdown_tx.send(true);

        if let Some(pool) = self.worker_pool {
            pool.shutdown().await;
        }
        if let Some(listener) = self.listener {
            if let Err(err) = listener.await {
                warn!(error = %err, "Resolution listener ended abnormally");
            }
        }
        self.resolver.shutdown();
        info!("Orchestration system stopped");
    }
}
