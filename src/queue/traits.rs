use async_trait::async_trait;
use std::collections::HashSet;
use std::time::Duration;
use uuid::Uuid;

use super::errors::QueueResult;
use super::types::{FailureOutcome, Job, JobHandle, JobId, QueueStats};
use crate::models::AgentType;

/// Per-agent-type job queue backend.
///
/// One logical queue exists per [`AgentType`] (`{agent}_agent_queue`). A job moves
/// waiting -> active on claim, and leaves active through `complete`, `fail`,
/// `release` or `discard`. Backends decide retry delays for retryable failures.
#[async_trait]
pub trait JobQueue: Send + Sync + 'static {
    /// Submit a job to the queue of `job.agent_type`
    async fn add(&self, job: Job) -> QueueResult<JobHandle>;

    /// Take the next claimable job of `agent_type`, counting one attempt
    async fn claim(&self, agent_type: AgentType) -> QueueResult<Option<Job>>;

    async fn complete(&self, agent_type: AgentType, job_id: JobId) -> QueueResult<()>;

    /// Report a failed attempt. Retryable failures with attempts left are delayed
    /// by backoff; everything else is dropped as failed.
    async fn fail(
        &self,
        agent_type: AgentType,
        job_id: JobId,
        retryable: bool,
    ) -> QueueResult<FailureOutcome>;

    /// Return an active job to the queue after `delay` without consuming an attempt
    async fn release(&self, agent_type: AgentType, job_id: JobId, delay: Duration)
        -> QueueResult<()>;

    /// Drop a job in any state. Returns whether the job was present.
    async fn discard(&self, agent_type: AgentType, job_id: JobId) -> QueueResult<bool>;

    /// Drop every waiting or delayed job of `deal_id` across all queues, except
    /// the jobs in `keep`. Active jobs are never touched.
    async fn remove_deal_jobs(&self, deal_id: Uuid, keep: &HashSet<JobId>) -> QueueResult<usize>;

    async fn stats(&self, agent_type: AgentType) -> QueueResult<QueueStats>;

    fn provider_name(&self) -> &'static str;
}
