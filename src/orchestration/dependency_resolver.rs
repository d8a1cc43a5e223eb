//! # Dependency Resolver
//!
//! Promotes pending executions whose prerequisites have completed.
//!
//! Resolution is push-first: the dispatcher sends a [`ResolutionTrigger`] on
//! every completion and the listener re-checks that deal right away. A per-deal
//! fallback poller re-checks on a fixed interval to catch anything the push path
//! missed, and tears itself down once the deal has nothing left pending.

use dashmap::{DashMap, DashSet};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::dependency_graph::DependencyGraph;
use super::dispatcher::{ResolutionTrigger, TaskDispatcher};
use super::types::ResolutionSummary;
use crate::config::OrchestratorConfig;
use crate::error::OrchestratorResult;
use crate::models::{latest_per_agent_type, DealStatus, TimelineEventType};
use crate::repository::{DealRepository, ExecutionRepository};
use crate::state_machine::ExecutionStatus;

pub struct DependencyResolver {
    config: Arc<OrchestratorConfig>,
    graph: Arc<DependencyGraph>,
    executions: Arc<dyn ExecutionRepository>,
    deals: Arc<dyn DealRepository>,
    dispatcher: Arc<TaskDispatcher>,
    pollers: DashMap<Uuid, JoinHandle<()>>,
    finalized: DashSet<Uuid>,
}

impl std::fmt::Debug for DependencyResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyResolver")
            .field("watched_deals", &self.pollers.len())
            .field("poll_interval_ms", &self.config.resolver.poll_interval_ms)
            .finish()
    }
}

impl DependencyResolver {
    pub fn new(
        config: Arc<OrchestratorConfig>,
        graph: Arc<DependencyGraph>,
        executions: Arc<dyn ExecutionRepository>,
        deals: Arc<dyn DealRepository>,
        dispatcher: Arc<TaskDispatcher>,
    ) -> Self {
        Self {
            config,
            graph,
            executions,
            deals,
            dispatcher,
            pollers: DashMap::new(),
            finalized: DashSet::new(),
        }
    }

    /// Enqueue every pending execution of the deal whose prerequisites' latest
    /// executions are completed, and finalize the deal once everything completed
    pub async fn resolve_deal(&self, deal_id: Uuid) -> OrchestratorResult<ResolutionSummary> {
        let executions = self.executions.list_by_deal(deal_id).await?;
        let latest = latest_per_agent_type(&executions);
        let mut summary = ResolutionSummary::default();

        for execution in latest.values() {
            if execution.status != ExecutionStatus::Pending {
                continue;
            }

            let ready = self.graph.dependencies_of(execution.agent_type).all(|dependency| {
                latest
                    .get(&dependency)
                    .is_some_and(|prerequisite| prerequisite.status.satisfies_dependencies())
            });
            if !ready {
                summary.pending_remaining += 1;
                continue;
            }

            match self.dispatcher.enqueue(execution).await {
                Ok(handle) => {
                    debug!(
                        deal_id = %deal_id,
                        execution_id = %execution.execution_id,
                        agent_type = %execution.agent_type,
                        job_id = %handle.job_id,
                        "Dependent execution promoted"
                    );
                    summary.promoted.push(execution.execution_id);
                }
                Err(err) if err.is_conflict() => {
                    debug!(
                        execution_id = %execution.execution_id,
                        error = %err,
                        "Execution already promoted elsewhere"
                    );
                }
                Err(err) => {
                    warn!(
                        execution_id = %execution.execution_id,
                        error = %err,
                        "Failed to promote execution, will retry on next pass"
                    );
                    summary.pending_remaining += 1;
                }
            }
        }

        let all_completed = !latest.is_empty()
            && latest
                .values()
                .all(|execution| execution.status == ExecutionStatus::Completed);
        if all_completed {
            summary.finalized = self.finalize(deal_id, executions.len()).await?;
        }

        Ok(summary)
    }

    async fn finalize(&self, deal_id: Uuid, execution_count: usize) -> OrchestratorResult<bool> {
        let deal = self.deals.get(deal_id).await?;
        if matches!(deal.status, DealStatus::Completed | DealStatus::Cancelled) {
            return Ok(deal.status == DealStatus::Completed);
        }
        if !self.finalized.insert(deal_id) {
            return Ok(true);
        }

        self.deals
            .update_status(deal_id, DealStatus::Completed)
            .await?;
        info!(deal_id = %deal_id, executions = execution_count, "Deal orchestration completed");
        self.dispatcher
            .record_event(
                deal_id,
                TimelineEventType::OrchestrationCompleted,
                json!({ "executions": execution_count }),
            )
            .await;
        self.unwatch(deal_id);
        Ok(true)
    }

    /// Allow a deal to be finalized again after new work was appended to it
    pub fn rearm(&self, deal_id: Uuid) {
        self.finalized.remove(&deal_id);
    }

    /// Start the fallback poller for a deal; no-op when polling is disabled or the
    /// deal is already watched
    pub fn watch(self: &Arc<Self>, deal_id: Uuid) {
        if !self.config.resolver.poll_enabled {
            return;
        }
        // A finished poller may still sit in the map; replace it
        if let Some(existing) = self.pollers.get(&deal_id) {
            if !existing.is_finished() {
                return;
            }
        }

        let resolver = Arc::clone(self);
        let poll_interval = self.config.resolver.poll_interval();
        let handle = tokio::spawn(async move {
            let mut ticker = interval(poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                debug!(deal_id = %deal_id, "Running fallback resolution cycle");

                match resolver.resolve_deal(deal_id).await {
                    Ok(summary) => {
                        if !summary.promoted.is_empty() {
                            info!(
                                deal_id = %deal_id,
                                promoted = summary.promoted.len(),
                                "Fallback poller promoted ready executions"
                            );
                        }
                        if summary.pending_remaining == 0 {
                            debug!(deal_id = %deal_id, "Nothing left pending, stopping poller");
                            break;
                        }
                    }
                    Err(err) => {
                        error!(deal_id = %deal_id, error = %err, "Fallback resolution cycle failed");
                    }
                }
            }
        });

        info!(
            deal_id = %deal_id,
            interval_ms = poll_interval.as_millis() as u64,
            "Watching deal for ready executions"
        );
        if let Some(previous) = self.pollers.insert(deal_id, handle) {
            previous.abort();
        }
    }

    /// Stop the fallback poller of a deal
    pub fn unwatch(&self, deal_id: Uuid) {
        if let Some((_, handle)) = self.pollers.remove(&deal_id) {
            debug!(deal_id = %deal_id, "Stopping fallback poller");
            handle.abort();
        }
    }

    pub fn is_watching(&self, deal_id: Uuid) -> bool {
        self.pollers
            .get(&deal_id)
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Consume completion triggers until shutdown is signalled or every sender is
    /// dropped
    pub fn spawn_push_listener(
        self: &Arc<Self>,
        mut triggers: mpsc::UnboundedReceiver<ResolutionTrigger>,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let resolver = Arc::clone(self);
        tokio::spawn(async move {
            info!("Dependency resolution listener started");
            loop {
                tokio::select! {
                    trigger = triggers.recv() => {
                        let Some(trigger) = trigger else { break };
                        debug!(
                            deal_id = %trigger.deal_id,
                            execution_id = %trigger.execution_id,
                            agent_type = %trigger.agent_type,
                            "Completion received, resolving dependents"
                        );
                        if let Err(err) = resolver.resolve_deal(trigger.deal_id).await {
                            error!(deal_id = %trigger.deal_id, error = %err, "Push resolution failed");
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("Dependency resolution listener stopped");
        })
    }

    /// Abort every fallback poller
    pub fn shutdown(&self) {
        let deals: Vec<Uuid> = self.pollers.iter().map(|entry| *entry.key()).collect();
        for deal_id in deals {
            self.unwatch(deal_id);
        }
    }
}

impl Drop for DependencyResolver {
    fn drop(&mut self) {
        for entry in self.pollers.iter() {
            entry.value().abort();
        }
    }
}
