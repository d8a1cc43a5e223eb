use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use diligence_core::models::AgentType;
use diligence_core::worker::{AgentWorker, ProgressReporter, WorkerError, WorkerJob};

/// One scripted attempt outcome
#[derive(Debug, Clone)]
pub enum Step {
    Succeed,
    Transient(&'static str),
    Permanent(&'static str),
    Panic(&'static str),
    /// Sleep before succeeding
    Slow(Duration),
}

/// Worker that plays back a script of outcomes, then succeeds forever
pub struct ScriptedWorker {
    agent_type: AgentType,
    script: Mutex<VecDeque<Step>>,
    attempts: AtomicUsize,
    seen: Mutex<Vec<WorkerJob>>,
}

impl ScriptedWorker {
    pub fn new(agent_type: AgentType, script: impl IntoIterator<Item = Step>) -> Self {
        Self {
            agent_type,
            script: Mutex::new(script.into_iter().collect()),
            attempts: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn succeeding(agent_type: AgentType) -> Self {
        Self::new(agent_type, [])
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn seen_jobs(&self) -> Vec<WorkerJob> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl AgentWorker for ScriptedWorker {
    fn agent_type(&self) -> AgentType {
        self.agent_type
    }

    async fn process(
        &self,
        job: WorkerJob,
        progress: ProgressReporter,
    ) -> Result<Value, WorkerError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().push(job.clone());
        let step = self.script.lock().pop_front().unwrap_or(Step::Succeed);

        progress.report(50).await;
        match step {
            Step::Succeed => {}
            Step::Transient(message) => return Err(WorkerError::transient(message)),
            Step::Permanent(message) => return Err(WorkerError::permanent(message)),
            Step::Panic(message) => panic!("{message}"),
            Step::Slow(delay) => tokio::time::sleep(delay).await,
        }

        Ok(json!({
            "agent": self.agent_type,
            "recursion_level": job.recursion_level,
            "attempt": job.attempt,
        }))
    }
}
