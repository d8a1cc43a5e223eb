//! # Worker Pool
//!
//! Runs registered [`AgentWorker`]s against their agent type's queue with a fixed
//! number of claim loops per type. Each attempt runs in its own task so a panic
//! surfaces as a `JoinError` and is recorded as a failure instead of taking the
//! loop down. Shutdown is cooperative: loops stop claiming and finish the job in
//! hand.

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::errors::WorkerError;
use super::traits::{AgentWorker, ProgressReporter, WorkerJob};
use crate::config::WorkerConfig;
use crate::orchestration::dispatcher::{ClaimedJob, FailureDisposition, TaskDispatcher};

/// Counters shared by every loop of the pool
#[derive(Debug, Default)]
pub struct WorkerPoolStats {
    pub jobs_completed: AtomicU64,
    pub jobs_failed: AtomicU64,
    pub retries_scheduled: AtomicU64,
    pub panics: AtomicU64,
}

pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    shutdown_tx: watch::Sender<bool>,
    stats: Arc<WorkerPoolStats>,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("loops", &self.handles.len())
            .field("stats", &self.stats)
            .finish()
    }
}

impl WorkerPool {
    /// Spawn `concurrency_per_type` claim loops for every worker
    pub fn start(
        dispatcher: Arc<TaskDispatcher>,
        workers: Vec<Arc<dyn AgentWorker>>,
        config: &WorkerConfig,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let stats = Arc::new(WorkerPoolStats::default());
        let concurrency = config.concurrency_per_type.max(1);
        let idle = config.idle_poll_interval();

        let mut handles = Vec::with_capacity(workers.len() * concurrency);
        for worker in workers {
            for slot in 0..concurrency {
                handles.push(tokio::spawn(run_loop(
                    Arc::clone(&dispatcher),
                    Arc::clone(&worker),
                    Arc::clone(&stats),
                    shutdown_rx.clone(),
                    idle,
                    slot,
                )));
            }
            info!(
                agent_type = %worker.agent_type(),
                queue = %worker.agent_type().queue_name(),
                concurrency = concurrency,
                "Agent worker started"
            );
        }

        Self {
            handles,
            shutdown_tx,
            stats,
        }
    }

    pub fn loop_count(&self) -> usize {
        self.handles.len()
    }

    pub fn stats(&self) -> &Arc<WorkerPoolStats> {
        &self.stats
    }

    /// Stop claiming new jobs and wait for in-flight attempts to finish
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for result in join_all(self.handles).await {
            if let Err(err) = result {
                warn!(error = %err, "Worker loop ended abnormally");
            }
        }
        info!("Worker pool stopped");
    }
}

async fn run_loop(
    dispatcher: Arc<TaskDispatcher>,
    worker: Arc<dyn AgentWorker>,
    stats: Arc<WorkerPoolStats>,
    mut shutdown: watch::Receiver<bool>,
    idle: Duration,
    slot: usize,
) {
    let agent_type = worker.agent_type();
    debug!(agent_type = %agent_type, slot = slot, "Worker loop running");

    loop {
        if *shutdown.borrow() {
            break;
        }

        match dispatcher.claim_next(agent_type).await {
            Ok(Some(claimed)) => {
                run_attempt(&dispatcher, &worker, &stats, claimed).await;
                continue;
            }
            Ok(None) => {}
            Err(err) => {
                error!(agent_type = %agent_type, error = %err, "Failed to claim job");
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(idle) => {}
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    debug!(agent_type = %agent_type, slot = slot, "Worker loop stopped");
}

async fn run_attempt(
    dispatcher: &Arc<TaskDispatcher>,
    worker: &Arc<dyn AgentWorker>,
    stats: &WorkerPoolStats,
    claimed: ClaimedJob,
) {
    let job_id = claimed.job.job_id;
    let worker_job = WorkerJob::from(&claimed.job);
    let reporter = ProgressReporter::new(Arc::clone(dispatcher), job_id);

    let task_worker = Arc::clone(worker);
    let outcome = tokio::spawn(async move { task_worker.process(worker_job, reporter).await }).await;

    let result = match outcome {
        Ok(Ok(output)) => match dispatcher.on_completed(job_id, output).await {
            Ok(_) => {
                stats.jobs_completed.fetch_add(1, Ordering::Relaxed);
                return;
            }
            Err(err) => {
                error!(job_id = %job_id, error = %err, "Failed to record completion");
                return;
            }
        },
        Ok(Err(worker_error)) => dispatcher.handle_worker_error(job_id, &worker_error).await,
        Err(join_error) => {
            let message = if join_error.is_panic() {
                stats.panics.fetch_add(1, Ordering::Relaxed);
                panic_message(join_error.into_panic())
            } else {
                "worker task cancelled".to_string()
            };
            error!(job_id = %job_id, error = %message, "Worker attempt aborted");
            dispatcher
                .handle_worker_error(job_id, &WorkerError::Panicked(message))
                .await
        }
    };

    match result {
        Ok(FailureDisposition::RetryScheduled { .. }) => {
            stats.retries_scheduled.fetch_add(1, Ordering::Relaxed);
        }
        Ok(FailureDisposition::Recorded(_)) => {
            stats.jobs_failed.fetch_add(1, Ordering::Relaxed);
        }
        Err(err) => {
            error!(job_id = %job_id, error = %err, "Failed to record worker failure");
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send + 'static>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
