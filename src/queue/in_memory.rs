//! # In-Memory Job Queue
//!
//! Process-local [`JobQueue`] used by tests and single-process deployments.
//!
//! - Waiting jobs are ordered by `(priority, submission sequence)`
//! - Retryable failures sit in a delayed set until their backoff elapses
//! - Submission faults can be injected to exercise retry paths

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use super::backoff::BackoffCalculator;
use super::errors::{QueueError, QueueResult};
use super::traits::JobQueue;
use super::types::{FailureOutcome, Job, JobHandle, JobId, QueueStats};
use crate::models::AgentType;

#[derive(Debug)]
struct DelayedJob {
    ready_at: Instant,
    job: Job,
}

#[derive(Debug, Default)]
struct AgentQueue {
    waiting: BTreeMap<(u32, u64), Job>,
    delayed: Vec<DelayedJob>,
    active: HashMap<JobId, Job>,
    total_completed: u64,
    total_failed: u64,
}

impl AgentQueue {
    fn promote_ready(&mut self, now: Instant, sequence: &AtomicU64) {
        let (ready, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.delayed)
            .into_iter()
            .partition(|delayed| delayed.ready_at <= now);
        self.delayed = pending;
        for delayed in ready {
            let seq = sequence.fetch_add(1, Ordering::Relaxed);
            self.waiting
                .insert((delayed.job.priority, seq), delayed.job);
        }
    }

    fn contains(&self, job_id: JobId) -> bool {
        self.active.contains_key(&job_id)
            || self.waiting.values().any(|job| job.job_id == job_id)
            || self.delayed.iter().any(|delayed| delayed.job.job_id == job_id)
    }
}

#[derive(Debug)]
pub struct InMemoryJobQueue {
    queues: RwLock<HashMap<AgentType, AgentQueue>>,
    backoff: BackoffCalculator,
    sequence: AtomicU64,
    failing_submissions: AtomicU32,
}

impl Default for InMemoryJobQueue {
    fn default() -> Self {
        Self::new(BackoffCalculator::default())
    }
}

impl InMemoryJobQueue {
    pub fn new(backoff: BackoffCalculator) -> Self {
        Self {
            queues: RwLock::new(HashMap::new()),
            backoff,
            sequence: AtomicU64::new(0),
            failing_submissions: AtomicU32::new(0),
        }
    }

    /// Make the next `count` submissions fail with a transient error (for testing)
    pub fn fail_next_submissions(&self, count: u32) {
        self.failing_submissions.store(count, Ordering::SeqCst);
    }

    /// Snapshot of the waiting jobs of one queue in claim order (for testing)
    pub async fn waiting_jobs(&self, agent_type: AgentType) -> Vec<Job> {
        let queues = self.queues.read().await;
        queues
            .get(&agent_type)
            .map(|queue| queue.waiting.values().cloned().collect())
            .unwrap_or_default()
    }

    fn take_injected_fault(&self) -> bool {
        self.failing_submissions
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                remaining.checked_sub(1)
            })
            .is_ok()
    }

    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn add(&self, job: Job) -> QueueResult<JobHandle> {
        if self.take_injected_fault() {
            warn!(job_id = %job.job_id, agent_type = %job.agent_type, "Injected submission failure");
            return Err(QueueError::unavailable("injected submission failure"));
        }

        let mut queues = self.queues.write().await;
        let queue = queues.entry(job.agent_type).or_default();
        if queue.contains(job.job_id) {
            return Err(QueueError::DuplicateJob(job.job_id));
        }

        let handle = JobHandle {
            job_id: job.job_id,
            agent_type: job.agent_type,
            priority: job.priority,
        };
        let seq = self.next_sequence();
        queue.waiting.insert((job.priority, seq), job);

        debug!(
            job_id = %handle.job_id,
            queue = %handle.agent_type.queue_name(),
            priority = handle.priority,
            "Job submitted"
        );
        Ok(handle)
    }

    async fn claim(&self, agent_type: AgentType) -> QueueResult<Option<Job>> {
        let mut queues = self.queues.write().await;
        let Some(queue) = queues.get_mut(&agent_type) else {
            return Ok(None);
        };

        queue.promote_ready(Instant::now(), &self.sequence);
        let Some((_, mut job)) = queue.waiting.pop_first() else {
            return Ok(None);
        };

        job.attempts_made += 1;
        queue.active.insert(job.job_id, job.clone());
        Ok(Some(job))
    }

    async fn complete(&self, agent_type: AgentType, job_id: JobId) -> QueueResult<()> {
        let mut queues = self.queues.write().await;
        let queue = queues
            .get_mut(&agent_type)
            .ok_or(QueueError::JobNotFound { agent_type, job_id })?;

        queue
            .active
            .remove(&job_id)
            .ok_or(QueueError::JobNotFound { agent_type, job_id })?;
        queue.total_completed += 1;
        Ok(())
    }

    async fn fail(
        &self,
        agent_type: AgentType,
        job_id: JobId,
        retryable: bool,
    ) -> QueueResult<FailureOutcome> {
        let mut queues = self.queues.write().await;
        let queue = queues
            .get_mut(&agent_type)
            .ok_or(QueueError::JobNotFound { agent_type, job_id })?;
        let job = queue
            .active
            .remove(&job_id)
            .ok_or(QueueError::JobNotFound { agent_type, job_id })?;

        if retryable && job.attempts_made < job.max_attempts {
            let attempt = job.attempts_made;
            let delay = self.backoff.delay_for_attempt(attempt);
            queue.delayed.push(DelayedJob {
                ready_at: Instant::now() + delay,
                job,
            });
            debug!(
                job_id = %job_id,
                attempt = attempt,
                delay_ms = delay.as_millis() as u64,
                "Job scheduled for retry"
            );
            return Ok(FailureOutcome::Retrying { attempt, delay });
        }

        queue.total_failed += 1;
        Ok(FailureOutcome::Exhausted {
            attempts: job.attempts_made,
        })
    }

    async fn release(
        &self,
        agent_type: AgentType,
        job_id: JobId,
        delay: Duration,
    ) -> QueueResult<()> {
        let mut queues = self.queues.write().await;
        let queue = queues
            .get_mut(&agent_type)
            .ok_or(QueueError::JobNotFound { agent_type, job_id })?;
        let mut job = queue
            .active
            .remove(&job_id)
            .ok_or(QueueError::JobNotFound { agent_type, job_id })?;

        job.attempts_made = job.attempts_made.saturating_sub(1);
        queue.delayed.push(DelayedJob {
            ready_at: Instant::now() + delay,
            job,
        });
        Ok(())
    }

    async fn discard(&self, agent_type: AgentType, job_id: JobId) -> QueueResult<bool> {
        let mut queues = self.queues.write().await;
        let Some(queue) = queues.get_mut(&agent_type) else {
            return Ok(false);
        };

        if queue.active.remove(&job_id).is_some() {
            return Ok(true);
        }
        let waiting_before = queue.waiting.len();
        queue.waiting.retain(|_, job| job.job_id != job_id);
        if queue.waiting.len() != waiting_before {
            return Ok(true);
        }
        let delayed_before = queue.delayed.len();
        queue.delayed.retain(|delayed| delayed.job.job_id != job_id);
        Ok(queue.delayed.len() != delayed_before)
    }

    async fn remove_deal_jobs(&self, deal_id: Uuid, keep: &HashSet<JobId>) -> QueueResult<usize> {
        let doomed = |job: &Job| job.deal_id == deal_id && !keep.contains(&job.job_id);
        let mut queues = self.queues.write().await;
        let mut removed = 0;
        for queue in queues.values_mut() {
            let before = queue.waiting.len() + queue.delayed.len();
            queue.waiting.retain(|_, job| !doomed(job));
            queue.delayed.retain(|delayed| !doomed(&delayed.job));
            removed += before - (queue.waiting.len() + queue.delayed.len());
        }
        Ok(removed)
    }

    async fn stats(&self, agent_type: AgentType) -> QueueResult<QueueStats> {
        let queues = self.queues.read().await;
        let stats = queues
            .get(&agent_type)
            .map(|queue| QueueStats {
                waiting: queue.waiting.len() as u64,
                active: queue.active.len() as u64,
                completed: queue.total_completed,
                failed: queue.total_failed,
                delayed: queue.delayed.len() as u64,
            })
            .unwrap_or_default();
        Ok(stats)
    }

    fn provider_name(&self) -> &'static str {
        "in_memory"
    }
}
