use chrono::{DateTime, Utc};
use tracing::debug;

use super::errors::{StateMachineError, StateMachineResult};
use super::events::ExecutionEvent;
use super::states::ExecutionStatus;
use crate::models::AgentExecution;

/// Outcome of applying an event to an execution record
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub from: ExecutionStatus,
    pub to: ExecutionStatus,
    /// The record with the target state and all side effects applied; not yet
    /// persisted
    pub execution: AgentExecution,
}

/// Pure transition logic for agent executions.
///
/// The state machine never persists anything. Callers write
/// [`Transition::execution`] back through the execution repository with
/// `expected_status = transition.from`, so a concurrent writer that moved the
/// record first makes the update fail instead of being overwritten.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutionStateMachine;

impl ExecutionStateMachine {
    /// Determine the target state based on current state and event
    pub fn determine_target_state(
        execution: &AgentExecution,
        event: &ExecutionEvent,
    ) -> StateMachineResult<ExecutionStatus> {
        let target = match (execution.status, event) {
            (ExecutionStatus::Pending, ExecutionEvent::Enqueue(_)) => ExecutionStatus::Queued,
            (ExecutionStatus::Queued, ExecutionEvent::Start) => ExecutionStatus::Running,
            (ExecutionStatus::Running, ExecutionEvent::Complete(_)) => ExecutionStatus::Completed,
            (ExecutionStatus::Running, ExecutionEvent::Fail(_)) => ExecutionStatus::Failed,
            (ExecutionStatus::Pending | ExecutionStatus::Queued, ExecutionEvent::Cancel) => {
                ExecutionStatus::Cancelled
            }
            (ExecutionStatus::Failed, ExecutionEvent::Retry) => ExecutionStatus::Pending,
            (from, _) => {
                return Err(StateMachineError::InvalidTransition {
                    execution_id: execution.execution_id,
                    from,
                    event: event.event_type(),
                })
            }
        };

        Ok(target)
    }

    /// Apply `event` to `execution`, returning the updated record
    pub fn transition(
        execution: &AgentExecution,
        event: ExecutionEvent,
        now: DateTime<Utc>,
    ) -> StateMachineResult<Transition> {
        let from = execution.status;
        let to = Self::determine_target_state(execution, &event)?;
        let mut next = execution.clone();
        next.status = to;
        next.updated_at = now;

        match event {
            ExecutionEvent::Enqueue(job_id) => {
                next.queued_at = Some(now);
                next.job_id = Some(job_id);
            }
            ExecutionEvent::Start => {
                next.start_time = Some(now);
                next.progress_percentage = 0;
            }
            ExecutionEvent::Complete(output) => {
                next.end_time = Some(now);
                next.output_data = Some(output);
                next.progress_percentage = 100;
                next.duration_ms = next
                    .start_time
                    .map(|start| (now - start).num_milliseconds().max(0));
            }
            ExecutionEvent::Fail(error) => {
                next.end_time = Some(now);
                next.error_message = Some(error);
            }
            ExecutionEvent::Cancel => {
                next.end_time = Some(now);
                next.job_id = None;
            }
            ExecutionEvent::Retry => {
                next.error_message = None;
                next.queued_at = None;
                next.start_time = None;
                next.end_time = None;
                next.duration_ms = None;
                next.progress_percentage = 0;
                next.job_id = None;
                next.retry_count += 1;
            }
        }

        debug!(
            execution_id = %execution.execution_id,
            agent_type = %execution.agent_type,
            from = %from,
            to = %to,
            "Execution transition computed"
        );

        Ok(Transition {
            from,
            to,
            execution: next,
        })
    }

    /// Record worker progress; only valid while running
    pub fn record_progress(
        execution: &AgentExecution,
        percent: u8,
        now: DateTime<Utc>,
    ) -> StateMachineResult<AgentExecution> {
        if execution.status != ExecutionStatus::Running {
            return Err(StateMachineError::ProgressNotAllowed {
                execution_id: execution.execution_id,
                status: execution.status,
            });
        }

        let mut next = execution.clone();
        next.progress_percentage = percent.min(100);
        next.updated_at = now;
        Ok(next)
    }
}
