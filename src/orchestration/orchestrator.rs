//! # Deal Orchestrator
//!
//! Public entry point of the orchestration core. Builds the phased plan for a
//! deal, seeds its executions, hands phase-1 work to the dispatcher and leaves
//! the rest to the dependency resolver. Also answers status, cancellation,
//! retry, queue and re-analysis requests.

use chrono::Utc;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::dependency_graph::DependencyGraph;
use super::dependency_resolver::DependencyResolver;
use super::dispatcher::TaskDispatcher;
use super::progress_analyzer::ProgressAnalyzer;
use super::types::{AgentStatusEntry, CancellationSummary, DealStatusReport, RetrySummary};
use crate::config::OrchestratorConfig;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::models::{
    latest_per_agent_type, AgentExecution, AgentType, Deal, DealStatus, ExecutionPlan,
    NewAgentExecution, TimelineEventType,
};
use crate::queue::QueueStats;
use crate::repository::{RepositoryError, RepositorySet};
use crate::state_machine::ExecutionStatus;

pub struct DealOrchestrator {
    config: Arc<OrchestratorConfig>,
    graph: Arc<DependencyGraph>,
    repositories: RepositorySet,
    dispatcher: Arc<TaskDispatcher>,
    resolver: Arc<DependencyResolver>,
    analyzer: ProgressAnalyzer,
}

impl std::fmt::Debug for DealOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DealOrchestrator")
            .field("agent_types", &self.graph.len())
            .field("dispatcher", &self.dispatcher)
            .field("resolver", &self.resolver)
            .finish()
    }
}

impl DealOrchestrator {
    pub fn new(
        config: Arc<OrchestratorConfig>,
        graph: Arc<DependencyGraph>,
        repositories: RepositorySet,
        dispatcher: Arc<TaskDispatcher>,
        resolver: Arc<DependencyResolver>,
    ) -> Self {
        let analyzer = ProgressAnalyzer::new(graph.clone(), config.clone());
        Self {
            config,
            graph,
            repositories,
            dispatcher,
            resolver,
            analyzer,
        }
    }

    pub fn dispatcher(&self) -> &Arc<TaskDispatcher> {
        &self.dispatcher
    }

    pub fn resolver(&self) -> &Arc<DependencyResolver> {
        &self.resolver
    }

    /// Build the plan, seed executions and start dispatching.
    ///
    /// Agent types that already have an execution keep it; only types with no
    /// execution, or whose latest execution was cancelled, get a new one. Calling
    /// this again for a deal is therefore safe.
    #[instrument(skip(self), fields(deal_id = %deal_id))]
    pub async fn create_orchestration_plan(&self, deal_id: Uuid) -> OrchestratorResult<ExecutionPlan> {
        let deal = self.load_deal(deal_id).await?;
        self.repositories.companies.get(deal.company_id).await.map_err(|err| match err {
            RepositoryError::NotFound { .. } => OrchestratorError::validation(format!(
                "deal {deal_id} references unknown company {}",
                deal.company_id
            )),
            other => other.into(),
        })?;

        let plan = self.graph.execution_plan(deal_id, &self.config)?;
        let seeded = self.seed_executions(deal_id, &plan).await?;

        self.resolver.rearm(deal_id);
        self.repositories
            .deals
            .update_status(deal_id, DealStatus::Analyzing)
            .await?;
        self.dispatcher
            .record_event(
                deal_id,
                TimelineEventType::PlanCreated,
                json!({
                    "phases": plan.phases.iter().map(|phase| &phase.agent_types).collect::<Vec<_>>(),
                    "estimated_duration_hours": plan.estimated_duration_hours,
                    "seeded": seeded.iter().map(|execution| execution.agent_type).collect::<Vec<_>>(),
                }),
            )
            .await;

        let mut queued = 0;
        for execution in seeded
            .iter()
            .filter(|execution| plan.phase_of(execution.agent_type) == Some(1))
        {
            self.dispatcher.enqueue(execution).await?;
            queued += 1;
        }

        // Re-planned deals may also have ready work outside phase 1
        let summary = self.resolver.resolve_deal(deal_id).await?;
        if summary.pending_remaining > 0 {
            self.resolver.watch(deal_id);
        }

        info!(
            deal_id = %deal_id,
            phases = plan.phases.len(),
            seeded = seeded.len(),
            queued = queued + summary.promoted.len(),
            estimated_duration_hours = plan.estimated_duration_hours,
            "Orchestration plan created"
        );
        Ok(plan)
    }

    async fn seed_executions(
        &self,
        deal_id: Uuid,
        plan: &ExecutionPlan,
    ) -> OrchestratorResult<Vec<AgentExecution>> {
        let existing = self.repositories.executions.list_by_deal(deal_id).await?;
        let latest = latest_per_agent_type(&existing);
        let mut seeded = Vec::new();

        for phase in &plan.phases {
            for agent_type in &phase.agent_types {
                let new_execution = match latest.get(agent_type) {
                    None => NewAgentExecution::root(deal_id, *agent_type, None),
                    Some(previous) if previous.status == ExecutionStatus::Cancelled => {
                        NewAgentExecution::recursive(previous, previous.input_data.clone())
                    }
                    Some(previous) => {
                        debug!(
                            agent_type = %agent_type,
                            status = %previous.status,
                            "Keeping existing execution"
                        );
                        continue;
                    }
                };

                match self.repositories.executions.create(new_execution).await {
                    Ok(execution) => seeded.push(execution),
                    Err(RepositoryError::Duplicate { .. }) => {
                        debug!(agent_type = %agent_type, "Execution seeded concurrently");
                    }
                    Err(err) => return Err(err.into()),
                }
            }
        }

        Ok(seeded)
    }

    #[instrument(skip(self), fields(deal_id = %deal_id))]
    pub async fn get_deal_status(&self, deal_id: Uuid) -> OrchestratorResult<DealStatusReport> {
        let deal = self.load_deal(deal_id).await?;
        let executions = self.repositories.executions.list_by_deal(deal_id).await?;
        let recursive_analysis_needed = self
            .repositories
            .findings
            .requires_recursion(deal_id)
            .await?;

        let now = Utc::now();
        let analysis = self
            .analyzer
            .analyze(&executions, recursive_analysis_needed, now);

        Ok(DealStatusReport {
            deal_id,
            deal_status: deal.status,
            overall_percentage: analysis.overall_percentage,
            agents: executions.iter().map(AgentStatusEntry::from).collect(),
            bottlenecks: analysis.bottlenecks,
            next_actions: analysis.next_actions,
            recursive_analysis_needed,
            generated_at: now,
        })
    }

    /// Cancel everything of the deal that has not started; running work finishes
    #[instrument(skip(self), fields(deal_id = %deal_id))]
    pub async fn cancel_deal_orchestration(
        &self,
        deal_id: Uuid,
    ) -> OrchestratorResult<CancellationSummary> {
        self.load_deal(deal_id).await?;
        self.resolver.unwatch(deal_id);

        let summary = self.dispatcher.cancel_all(deal_id).await?;
        self.repositories
            .deals
            .update_status(deal_id, DealStatus::Cancelled)
            .await?;
        self.dispatcher
            .record_event(
                deal_id,
                TimelineEventType::OrchestrationCancelled,
                json!({
                    "cancelled_count": summary.cancelled_count,
                    "jobs_removed": summary.jobs_removed,
                    "still_running": summary.still_running,
                }),
            )
            .await;

        info!(
            deal_id = %deal_id,
            cancelled_count = summary.cancelled_count,
            still_running = summary.still_running,
            "Deal orchestration cancelled"
        );
        Ok(summary)
    }

    #[instrument(skip(self), fields(deal_id = %deal_id))]
    pub async fn retry_failed_jobs(&self, deal_id: Uuid) -> OrchestratorResult<RetrySummary> {
        let deal = self.load_deal(deal_id).await?;
        let summary = self.dispatcher.retry_failed(deal_id).await?;

        if summary.retried > 0 {
            if deal.status != DealStatus::Analyzing {
                self.repositories
                    .deals
                    .update_status(deal_id, DealStatus::Analyzing)
                    .await?;
            }
            self.resolver.rearm(deal_id);
            self.resolver.watch(deal_id);
        }

        Ok(summary)
    }

    #[instrument(skip(self))]
    pub async fn get_queue_stats(&self) -> OrchestratorResult<BTreeMap<AgentType, QueueStats>> {
        self.dispatcher.queue_stats().await
    }

    /// Append a new execution of `agent_type` one recursion level below its latest
    /// terminal execution, carrying the parent's output as input
    #[instrument(skip(self), fields(deal_id = %deal_id, agent_type = %agent_type))]
    pub async fn trigger_recursive_analysis(
        &self,
        deal_id: Uuid,
        agent_type: AgentType,
    ) -> OrchestratorResult<AgentExecution> {
        let deal = self.load_deal(deal_id).await?;
        if !self.graph.contains(agent_type) {
            return Err(OrchestratorError::validation(format!(
                "agent type {agent_type} is not configured"
            )));
        }

        let parent = self
            .repositories
            .executions
            .latest_by_deal_and_type(deal_id, agent_type)
            .await?
            .ok_or_else(|| {
                OrchestratorError::validation(format!(
                    "deal {deal_id} has no {agent_type} execution to re-analyse"
                ))
            })?;
        if parent.is_active() {
            return Err(OrchestratorError::validation(format!(
                "{agent_type} execution {} is still {}",
                parent.execution_id, parent.status
            )));
        }

        let input = json!({
            "parent_execution_id": parent.execution_id,
            "parent_output": parent.output_data,
            "parent_input": parent.input_data,
        });
        let child = self
            .repositories
            .executions
            .create(NewAgentExecution::recursive(&parent, Some(input)))
            .await?;

        self.resolver.rearm(deal_id);
        if deal.status != DealStatus::Analyzing {
            self.repositories
                .deals
                .update_status(deal_id, DealStatus::Analyzing)
                .await?;
        }
        self.dispatcher
            .record_event(
                deal_id,
                TimelineEventType::RecursiveAnalysisStarted,
                json!({
                    "execution_id": child.execution_id,
                    "parent_execution_id": parent.execution_id,
                    "agent_type": agent_type,
                    "recursion_level": child.recursion_level,
                }),
            )
            .await;

        let summary = self.resolver.resolve_deal(deal_id).await?;
        if summary.pending_remaining > 0 {
            self.resolver.watch(deal_id);
        }

        info!(
            deal_id = %deal_id,
            execution_id = %child.execution_id,
            recursion_level = child.recursion_level,
            "Recursive analysis started"
        );
        Ok(self.repositories.executions.get(child.execution_id).await?)
    }

    async fn load_deal(&self, deal_id: Uuid) -> OrchestratorResult<Deal> {
        self.repositories.deals.get(deal_id).await.map_err(|err| {
            if !matches!(err, RepositoryError::NotFound { .. }) {
                warn!(deal_id = %deal_id, error = %err, "Deal lookup failed");
            }
            err.into()
        })
    }
}
