//! # Task Dispatcher
//!
//! Moves executions between the record store and the per-agent-type queues.
//!
//! Every record write goes through the execution state machine and is persisted
//! with a compare-and-swap on the status the transition started from. Jobs are
//! submitted before the `pending -> queued` write lands, so a worker can claim a
//! job whose record still reads `pending`; such claims are released back to the
//! queue without consuming an attempt.

use chrono::Utc;
use dashmap::DashMap;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::OrchestratorConfig;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::models::{latest_per_agent_type, AgentExecution, AgentType, TimelineEvent, TimelineEventType};
use crate::queue::{
    BackoffCalculator, FailureOutcome, Job, JobHandle, JobId, JobQueue, QueueError, QueueStats,
};
use crate::repository::{ExecutionRepository, RepositoryError, TimelineRepository};
use crate::state_machine::{ExecutionEvent, ExecutionStateMachine, ExecutionStatus};
use crate::worker::WorkerError;

use super::types::{CancellationSummary, EnqueueFailure, RetrySummary};

/// Sent to the dependency resolver whenever an execution completes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolutionTrigger {
    pub deal_id: Uuid,
    pub execution_id: Uuid,
    pub agent_type: AgentType,
}

/// A job claimed by a worker together with its now-running execution
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    pub job: Job,
    pub execution: AgentExecution,
}

/// What happened to a worker failure
#[derive(Debug, Clone, PartialEq)]
pub enum FailureDisposition {
    /// The job returns to the queue after `delay`; the execution stays running
    RetryScheduled {
        attempt: u32,
        delay: std::time::Duration,
    },
    /// The execution was moved to `failed`
    Recorded(AgentExecution),
}

#[derive(Debug, Clone, Copy)]
struct JobRef {
    execution_id: Uuid,
    deal_id: Uuid,
    agent_type: AgentType,
}

pub struct TaskDispatcher {
    config: Arc<OrchestratorConfig>,
    executions: Arc<dyn ExecutionRepository>,
    timeline: Arc<dyn TimelineRepository>,
    queue: Arc<dyn JobQueue>,
    submit_backoff: BackoffCalculator,
    resolution_tx: Option<mpsc::UnboundedSender<ResolutionTrigger>>,
    jobs: DashMap<JobId, JobRef>,
}

impl std::fmt::Debug for TaskDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskDispatcher")
            .field("queue_provider", &self.queue.provider_name())
            .field("tracked_jobs", &self.jobs.len())
            .field("push_resolution", &self.resolution_tx.is_some())
            .finish()
    }
}

impl TaskDispatcher {
    pub fn new(
        config: Arc<OrchestratorConfig>,
        executions: Arc<dyn ExecutionRepository>,
        timeline: Arc<dyn TimelineRepository>,
        queue: Arc<dyn JobQueue>,
        resolution_tx: Option<mpsc::UnboundedSender<ResolutionTrigger>>,
    ) -> Self {
        let submit_backoff = BackoffCalculator::new(config.dispatch.backoff.clone());
        Self {
            config,
            executions,
            timeline,
            queue,
            submit_backoff,
            resolution_tx,
            jobs: DashMap::new(),
        }
    }

    pub fn queue(&self) -> &Arc<dyn JobQueue> {
        &self.queue
    }

    /// Submit a job for a pending execution and move it to `queued`
    pub async fn enqueue(&self, execution: &AgentExecution) -> OrchestratorResult<JobHandle> {
        let job = Job::for_execution(
            execution,
            self.config.priority(execution.agent_type),
            self.config.dispatch.max_attempts,
        );
        let transition = ExecutionStateMachine::transition(
            execution,
            ExecutionEvent::Enqueue(job.job_id),
            Utc::now(),
        )?;

        self.jobs.insert(
            job.job_id,
            JobRef {
                execution_id: execution.execution_id,
                deal_id: execution.deal_id,
                agent_type: execution.agent_type,
            },
        );
        let job_id = job.job_id;
        let handle = match self.submit_with_retry(job).await {
            Ok(handle) => handle,
            Err(err) => {
                self.jobs.remove(&job_id);
                return Err(err);
            }
        };

        if let Err(err) = self
            .executions
            .update(&transition.execution, transition.from)
            .await
        {
            self.jobs.remove(&handle.job_id);
            if let Err(discard_err) = self.queue.discard(handle.agent_type, handle.job_id).await {
                warn!(job_id = %handle.job_id, error = %discard_err, "Failed to discard orphaned job");
            }
            return Err(err.into());
        }

        info!(
            deal_id = %execution.deal_id,
            execution_id = %execution.execution_id,
            agent_type = %execution.agent_type,
            job_id = %handle.job_id,
            priority = handle.priority,
            "Execution queued"
        );
        self.record_event(
            execution.deal_id,
            TimelineEventType::AgentQueued,
            json!({
                "execution_id": execution.execution_id,
                "agent_type": execution.agent_type,
                "job_id": handle.job_id,
                "queue": execution.agent_type.queue_name(),
            }),
        )
        .await;

        Ok(handle)
    }

    async fn submit_with_retry(&self, job: Job) -> OrchestratorResult<JobHandle> {
        let attempts = self.config.dispatch.submit_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.queue.add(job.clone()).await {
                Ok(handle) => return Ok(handle),
                Err(err) if err.is_transient() && attempt < attempts => {
                    let delay = self.submit_backoff.delay_for_attempt(attempt);
                    warn!(
                        job_id = %job.job_id,
                        agent_type = %job.agent_type,
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Job submission failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Claim the next runnable job of `agent_type` and move its execution to
    /// `running`. Jobs whose execution cannot run are released or discarded.
    pub async fn claim_next(&self, agent_type: AgentType) -> OrchestratorResult<Option<ClaimedJob>> {
        while let Some(job) = self.queue.claim(agent_type).await? {
            let execution = match self.executions.get(job.execution_id).await {
                Ok(execution) => execution,
                Err(RepositoryError::NotFound { .. }) => {
                    warn!(job_id = %job.job_id, execution_id = %job.execution_id, "Discarding job for unknown execution");
                    self.queue.discard(agent_type, job.job_id).await?;
                    continue;
                }
                Err(err) => return Err(err.into()),
            };

            let carries_job = execution.job_id == Some(job.job_id);
            match execution.status {
                ExecutionStatus::Queued if carries_job => {
                    match self.start(&job, &execution).await {
                        Ok(claimed) => return Ok(Some(claimed)),
                        Err(err) if err.is_conflict() => {
                            debug!(job_id = %job.job_id, error = %err, "Lost claim race, discarding job");
                            self.forget_job(agent_type, job.job_id).await?;
                        }
                        Err(err) => return Err(err),
                    }
                }
                ExecutionStatus::Running if carries_job => {
                    // Re-attempt after a transient failure
                    self.track(&job);
                    debug!(
                        job_id = %job.job_id,
                        execution_id = %execution.execution_id,
                        attempt = job.attempts_made,
                        "Re-attempting running execution"
                    );
                    return Ok(Some(ClaimedJob { job, execution }));
                }
                ExecutionStatus::Pending if execution.job_id.is_none() => {
                    debug!(
                        job_id = %job.job_id,
                        execution_id = %execution.execution_id,
                        "Execution not yet queued, releasing job"
                    );
                    self.queue
                        .release(agent_type, job.job_id, self.config.workers.claim_retry_delay())
                        .await?;
                }
                status => {
                    debug!(
                        job_id = %job.job_id,
                        execution_id = %execution.execution_id,
                        status = %status,
                        "Discarding stale job"
                    );
                    self.forget_job(agent_type, job.job_id).await?;
                }
            }
        }

        Ok(None)
    }

    async fn start(&self, job: &Job, execution: &AgentExecution) -> OrchestratorResult<ClaimedJob> {
        let transition =
            ExecutionStateMachine::transition(execution, ExecutionEvent::Start, Utc::now())?;
        let running = self
            .executions
            .update(&transition.execution, transition.from)
            .await?;
        self.track(job);

        info!(
            deal_id = %running.deal_id,
            execution_id = %running.execution_id,
            agent_type = %running.agent_type,
            job_id = %job.job_id,
            "Execution started"
        );
        self.record_event(
            running.deal_id,
            TimelineEventType::AgentStarted,
            json!({
                "execution_id": running.execution_id,
                "agent_type": running.agent_type,
                "attempt": job.attempts_made,
            }),
        )
        .await;

        Ok(ClaimedJob {
            job: job.clone(),
            execution: running,
        })
    }

    /// Record worker progress, clamped to 0..=100
    pub async fn on_progress(&self, job_id: JobId, percent: i32) -> OrchestratorResult<()> {
        let job_ref = self.job_ref(job_id)?;
        let execution = self.executions.get(job_ref.execution_id).await?;
        let percent = percent.clamp(0, 100) as u8;
        let updated = ExecutionStateMachine::record_progress(&execution, percent, Utc::now())?;
        self.executions
            .update(&updated, ExecutionStatus::Running)
            .await?;
        debug!(job_id = %job_id, execution_id = %job_ref.execution_id, percent = percent, "Progress recorded");
        Ok(())
    }

    pub async fn on_completed(&self, job_id: JobId, output: Value) -> OrchestratorResult<AgentExecution> {
        let job_ref = self.job_ref(job_id)?;
        let execution = self.executions.get(job_ref.execution_id).await?;
        let transition = ExecutionStateMachine::transition(
            &execution,
            ExecutionEvent::Complete(output),
            Utc::now(),
        )?;
        let completed = self
            .executions
            .update(&transition.execution, transition.from)
            .await?;

        self.jobs.remove(&job_id);
        self.acknowledge(job_ref.agent_type, job_id).await;

        info!(
            deal_id = %completed.deal_id,
            execution_id = %completed.execution_id,
            agent_type = %completed.agent_type,
            duration_ms = completed.duration_ms.unwrap_or_default(),
            "Execution completed"
        );
        self.record_event(
            completed.deal_id,
            TimelineEventType::AgentCompleted,
            json!({
                "execution_id": completed.execution_id,
                "agent_type": completed.agent_type,
                "duration_ms": completed.duration_ms,
            }),
        )
        .await;

        self.notify_resolver(&completed);
        Ok(completed)
    }

    /// Record a permanent failure; sibling executions are left untouched
    pub async fn on_failed(&self, job_id: JobId, error: &str) -> OrchestratorResult<AgentExecution> {
        let job_ref = self.job_ref(job_id)?;
        let failed = self.record_failure(job_ref, error).await?;
        self.jobs.remove(&job_id);
        match self.queue.fail(job_ref.agent_type, job_id, false).await {
            Ok(_) | Err(QueueError::JobNotFound { .. }) => {}
            Err(err) => warn!(job_id = %job_id, error = %err, "Failed to report job failure to queue"),
        }
        Ok(failed)
    }

    /// Route a worker error: transient errors go back to the queue with backoff
    /// while attempts remain, everything else fails the execution
    pub async fn handle_worker_error(
        &self,
        job_id: JobId,
        error: &WorkerError,
    ) -> OrchestratorResult<FailureDisposition> {
        if !error.is_retryable() {
            return Ok(FailureDisposition::Recorded(
                self.on_failed(job_id, &error.to_string()).await?,
            ));
        }

        let job_ref = self.job_ref(job_id)?;
        match self.queue.fail(job_ref.agent_type, job_id, true).await? {
            FailureOutcome::Retrying { attempt, delay } => {
                self.reset_progress(job_ref).await;
                warn!(
                    deal_id = %job_ref.deal_id,
                    execution_id = %job_ref.execution_id,
                    agent_type = %job_ref.agent_type,
                    attempt = attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Transient worker failure, retry scheduled"
                );
                self.record_event(
                    job_ref.deal_id,
                    TimelineEventType::AgentRetryScheduled,
                    json!({
                        "execution_id": job_ref.execution_id,
                        "agent_type": job_ref.agent_type,
                        "attempt": attempt,
                        "delay_ms": delay.as_millis() as u64,
                        "error": error.to_string(),
                    }),
                )
                .await;
                Ok(FailureDisposition::RetryScheduled { attempt, delay })
            }
            FailureOutcome::Exhausted { attempts } => {
                let message = format!("{error} (gave up after {attempts} attempts)");
                let failed = self.record_failure(job_ref, &message).await?;
                self.jobs.remove(&job_id);
                Ok(FailureDisposition::Recorded(failed))
            }
        }
    }

    /// Reset every failed execution of the deal to `pending` and queue it again.
    ///
    /// Only the latest recursion level of each agent type is considered, so a
    /// superseded failure is never revived next to its successor.
    pub async fn retry_failed(&self, deal_id: Uuid) -> OrchestratorResult<RetrySummary> {
        let executions = self.executions.list_by_deal(deal_id).await?;
        let failed: Vec<AgentExecution> = latest_per_agent_type(&executions)
            .into_values()
            .filter(|execution| execution.status == ExecutionStatus::Failed)
            .cloned()
            .collect();

        let mut execution_ids = Vec::with_capacity(failed.len());
        let mut enqueue_failures = Vec::new();
        for execution in failed {
            let transition =
                ExecutionStateMachine::transition(&execution, ExecutionEvent::Retry, Utc::now())?;
            let reset = match self
                .executions
                .update(&transition.execution, transition.from)
                .await
            {
                Ok(reset) => reset,
                Err(RepositoryError::ConcurrentModification { .. }) => {
                    debug!(execution_id = %execution.execution_id, "Execution changed during retry, skipping");
                    continue;
                }
                Err(err) => return Err(err.into()),
            };

            self.record_event(
                deal_id,
                TimelineEventType::AgentReset,
                json!({
                    "execution_id": reset.execution_id,
                    "agent_type": reset.agent_type,
                    "retry_count": reset.retry_count,
                }),
            )
            .await;

            execution_ids.push(reset.execution_id);
            if let Err(err) = self.enqueue(&reset).await {
                warn!(
                    deal_id = %deal_id,
                    execution_id = %reset.execution_id,
                    agent_type = %reset.agent_type,
                    error = %err,
                    "Reset execution could not be queued, left pending"
                );
                enqueue_failures.push(EnqueueFailure {
                    execution_id: reset.execution_id,
                    agent_type: reset.agent_type,
                    error: err.to_string(),
                });
            }
        }

        info!(
            deal_id = %deal_id,
            retried = execution_ids.len(),
            enqueue_failures = enqueue_failures.len(),
            "Failed executions retried"
        );
        Ok(RetrySummary {
            deal_id,
            retried: execution_ids.len(),
            execution_ids,
            enqueue_failures,
        })
    }

    /// Drop not-yet-started jobs of the deal and cancel its pending and queued
    /// executions. Running executions finish on their own, including those
    /// waiting out a retry backoff.
    pub async fn cancel_all(&self, deal_id: Uuid) -> OrchestratorResult<CancellationSummary> {
        let executions = self.executions.list_by_deal(deal_id).await?;
        let running_jobs: HashSet<JobId> = executions
            .iter()
            .filter(|execution| execution.status == ExecutionStatus::Running)
            .filter_map(|execution| execution.job_id)
            .collect();
        let jobs_removed = self.queue.remove_deal_jobs(deal_id, &running_jobs).await?;

        let mut cancelled_count = 0;
        let mut still_running = 0;
        for execution in executions {
            match execution.status {
                ExecutionStatus::Running => still_running += 1,
                status if status.is_cancellable() => {
                    if self.cancel_execution(execution).await? {
                        cancelled_count += 1;
                    } else {
                        still_running += 1;
                    }
                }
                _ => {}
            }
        }

        info!(
            deal_id = %deal_id,
            cancelled_count = cancelled_count,
            jobs_removed = jobs_removed,
            still_running = still_running,
            "Deal executions cancelled"
        );
        Ok(CancellationSummary {
            deal_id,
            cancelled_count,
            jobs_removed,
            still_running,
        })
    }

    /// Cancel one pending or queued execution. Returns false when a worker moved it
    /// to `running` first.
    async fn cancel_execution(&self, mut execution: AgentExecution) -> OrchestratorResult<bool> {
        loop {
            let job_id = execution.job_id;
            let transition =
                ExecutionStateMachine::transition(&execution, ExecutionEvent::Cancel, Utc::now())?;
            match self
                .executions
                .update(&transition.execution, transition.from)
                .await
            {
                Ok(cancelled) => {
                    if let Some(job_id) = job_id {
                        self.jobs.remove(&job_id);
                    }
                    self.record_event(
                        cancelled.deal_id,
                        TimelineEventType::AgentCancelled,
                        json!({
                            "execution_id": cancelled.execution_id,
                            "agent_type": cancelled.agent_type,
                            "previous_status": transition.from,
                        }),
                    )
                    .await;
                    return Ok(true);
                }
                Err(RepositoryError::ConcurrentModification { actual, .. }) if actual.is_cancellable() => {
                    // pending -> queued raced us; try again against the fresh record
                    execution = self.executions.get(execution.execution_id).await?;
                }
                Err(RepositoryError::ConcurrentModification { .. }) => return Ok(false),
                Err(err) => return Err(err.into()),
            }
        }
    }

    pub async fn queue_stats(&self) -> OrchestratorResult<BTreeMap<AgentType, QueueStats>> {
        let mut stats = BTreeMap::new();
        for agent_type in self.config.agent_types() {
            stats.insert(agent_type, self.queue.stats(agent_type).await?);
        }
        Ok(stats)
    }

    async fn record_failure(&self, job_ref: JobRef, message: &str) -> OrchestratorResult<AgentExecution> {
        let execution = self.executions.get(job_ref.execution_id).await?;
        let transition = ExecutionStateMachine::transition(
            &execution,
            ExecutionEvent::fail_with_error(message),
            Utc::now(),
        )?;
        let failed = self
            .executions
            .update(&transition.execution, transition.from)
            .await?;

        warn!(
            deal_id = %failed.deal_id,
            execution_id = %failed.execution_id,
            agent_type = %failed.agent_type,
            error = message,
            "Execution failed"
        );
        self.record_event(
            failed.deal_id,
            TimelineEventType::AgentFailed,
            json!({
                "execution_id": failed.execution_id,
                "agent_type": failed.agent_type,
                "error": message,
            }),
        )
        .await;

        Ok(failed)
    }

    async fn reset_progress(&self, job_ref: JobRef) {
        let result = async {
            let execution = self.executions.get(job_ref.execution_id).await?;
            let reset = ExecutionStateMachine::record_progress(&execution, 0, Utc::now())?;
            self.executions
                .update(&reset, ExecutionStatus::Running)
                .await?;
            Ok::<(), OrchestratorError>(())
        }
        .await;

        if let Err(err) = result {
            debug!(execution_id = %job_ref.execution_id, error = %err, "Could not reset progress");
        }
    }

    async fn acknowledge(&self, agent_type: AgentType, job_id: JobId) {
        if let Err(err) = self.queue.complete(agent_type, job_id).await {
            warn!(job_id = %job_id, error = %err, "Failed to acknowledge job");
        }
    }

    async fn forget_job(&self, agent_type: AgentType, job_id: JobId) -> OrchestratorResult<()> {
        self.jobs.remove(&job_id);
        self.queue.discard(agent_type, job_id).await?;
        Ok(())
    }

    fn track(&self, job: &Job) {
        self.jobs.insert(
            job.job_id,
            JobRef {
                execution_id: job.execution_id,
                deal_id: job.deal_id,
                agent_type: job.agent_type,
            },
        );
    }

    fn job_ref(&self, job_id: JobId) -> OrchestratorResult<JobRef> {
        self.jobs
            .get(&job_id)
            .map(|entry| *entry.value())
            .ok_or_else(|| OrchestratorError::UnknownJob(job_id.to_string()))
    }

    fn notify_resolver(&self, completed: &AgentExecution) {
        if !self.config.resolver.push_enabled {
            return;
        }
        let Some(tx) = &self.resolution_tx else {
            return;
        };

        let trigger = ResolutionTrigger {
            deal_id: completed.deal_id,
            execution_id: completed.execution_id,
            agent_type: completed.agent_type,
        };
        if tx.send(trigger).is_err() {
            debug!(deal_id = %completed.deal_id, "Resolution listener gone, relying on poller");
        }
    }

    pub(crate) async fn record_event(&self, deal_id: Uuid, event_type: TimelineEventType, payload: Value) {
        if let Err(err) = self
            .timeline
            .append(TimelineEvent::new(deal_id, event_type, payload))
            .await
        {
            warn!(deal_id = %deal_id, event_type = %event_type, error = %err, "Failed to append timeline event");
        }
    }
}
