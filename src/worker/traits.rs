use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use super::errors::WorkerError;
use crate::models::AgentType;
use crate::orchestration::dispatcher::TaskDispatcher;
use crate::queue::{Job, JobId};

/// What a worker receives for one attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerJob {
    pub job_id: JobId,
    pub execution_id: Uuid,
    pub deal_id: Uuid,
    pub agent_type: AgentType,
    pub recursion_level: u32,
    pub input_data: Option<Value>,
    /// 1-based attempt number
    pub attempt: u32,
}

impl From<&Job> for WorkerJob {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.job_id,
            execution_id: job.execution_id,
            deal_id: job.deal_id,
            agent_type: job.agent_type,
            recursion_level: job.recursion_level,
            input_data: job.input_data.clone(),
            attempt: job.attempts_made,
        }
    }
}

/// Handle a worker uses to report progress of its current job
#[derive(Clone)]
pub struct ProgressReporter {
    dispatcher: Arc<TaskDispatcher>,
    job_id: JobId,
}

impl ProgressReporter {
    pub fn new(dispatcher: Arc<TaskDispatcher>, job_id: JobId) -> Self {
        Self { dispatcher, job_id }
    }

    /// Record progress; values outside 0..=100 are clamped. Failures are logged and
    /// never interrupt the worker.
    pub async fn report(&self, percent: i32) {
        if let Err(err) = self.dispatcher.on_progress(self.job_id, percent).await {
            debug!(job_id = %self.job_id, error = %err, "Progress update dropped");
        }
    }
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("job_id", &self.job_id)
            .finish()
    }
}

/// Executes the analysis of one agent type.
///
/// Each call handles exactly one attempt and returns either the output payload or
/// a [`WorkerError`]. Panics are caught by the worker pool and recorded as
/// failures.
#[async_trait]
pub trait AgentWorker: Send + Sync + 'static {
    fn agent_type(&self) -> AgentType;

    async fn process(&self, job: WorkerJob, progress: ProgressReporter) -> Result<Value, WorkerError>;
}
