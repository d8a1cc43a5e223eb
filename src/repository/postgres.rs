//! PostgreSQL-backed execution and timeline stores.
//!
//! Maps to the `agent_executions` and `timeline_events` tables in
//! `migrations/0001_create_agent_executions.sql`. Compare-and-swap updates are a
//! single `UPDATE ... WHERE execution_id = $1 AND status = $2`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::errors::{RepositoryError, RepositoryResult};
use super::traits::{ExecutionRepository, TimelineRepository};
use crate::models::{AgentExecution, AgentType, NewAgentExecution, TimelineEvent};
use crate::queue::JobId;
use crate::state_machine::ExecutionStatus;

const EXECUTION_COLUMNS: &str = "execution_id, deal_id, agent_type, recursion_level, \
    parent_execution_id, status, progress_percentage, input_data, output_data, error_message, \
    queued_at, start_time, end_time, duration_ms, retry_count, job_id, created_at, updated_at";

/// Row shape of `agent_executions`
#[derive(Debug, Clone, FromRow)]
struct AgentExecutionRow {
    execution_id: Uuid,
    deal_id: Uuid,
    agent_type: String,
    recursion_level: i32,
    parent_execution_id: Option<Uuid>,
    status: String,
    progress_percentage: i16,
    input_data: Option<Value>,
    output_data: Option<Value>,
    error_message: Option<String>,
    queued_at: Option<DateTime<Utc>>,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    duration_ms: Option<i64>,
    retry_count: i32,
    job_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AgentExecutionRow> for AgentExecution {
    type Error = RepositoryError;

    fn try_from(row: AgentExecutionRow) -> Result<Self, Self::Error> {
        Ok(AgentExecution {
            execution_id: row.execution_id,
            deal_id: row.deal_id,
            agent_type: row
                .agent_type
                .parse::<AgentType>()
                .map_err(RepositoryError::Serialization)?,
            recursion_level: u32::try_from(row.recursion_level)
                .map_err(|e| RepositoryError::Serialization(e.to_string()))?,
            parent_execution_id: row.parent_execution_id,
            status: row
                .status
                .parse::<ExecutionStatus>()
                .map_err(RepositoryError::Serialization)?,
            progress_percentage: row.progress_percentage.clamp(0, 100) as u8,
            input_data: row.input_data,
            output_data: row.output_data,
            error_message: row.error_message,
            queued_at: row.queued_at,
            start_time: row.start_time,
            end_time: row.end_time,
            duration_ms: row.duration_ms,
            retry_count: u32::try_from(row.retry_count)
                .map_err(|e| RepositoryError::Serialization(e.to_string()))?,
            job_id: row.job_id.map(JobId::from),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_executions(rows: Vec<AgentExecutionRow>) -> RepositoryResult<Vec<AgentExecution>> {
    rows.into_iter().map(AgentExecution::try_from).collect()
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[derive(Debug, Clone)]
pub struct PgExecutionRepository {
    pool: PgPool,
}

impl PgExecutionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn current_status(&self, execution_id: Uuid) -> RepositoryResult<ExecutionStatus> {
        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM agent_executions WHERE execution_id = $1")
                .bind(execution_id)
                .fetch_optional(&self.pool)
                .await?;

        status
            .ok_or_else(|| RepositoryError::not_found("AgentExecution", execution_id))?
            .parse::<ExecutionStatus>()
            .map_err(RepositoryError::Serialization)
    }
}

#[async_trait]
impl ExecutionRepository for PgExecutionRepository {
    async fn get(&self, execution_id: Uuid) -> RepositoryResult<AgentExecution> {
        let sql = format!("SELECT {EXECUTION_COLUMNS} FROM agent_executions WHERE execution_id = $1");
        let row = sqlx::query_as::<_, AgentExecutionRow>(&sql)
            .bind(execution_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| RepositoryError::not_found("AgentExecution", execution_id))?;
        row.try_into()
    }

    async fn list_by_deal(&self, deal_id: Uuid) -> RepositoryResult<Vec<AgentExecution>> {
        let sql = format!(
            "SELECT {EXECUTION_COLUMNS} FROM agent_executions WHERE deal_id = $1 \
             ORDER BY agent_type, recursion_level"
        );
        let rows = sqlx::query_as::<_, AgentExecutionRow>(&sql)
            .bind(deal_id)
            .fetch_all(&self.pool)
            .await?;
        let mut executions = into_executions(rows)?;
        // Text ordering of agent_type differs from declaration order
        executions.sort_by_key(|execution| (execution.agent_type, execution.recursion_level));
        Ok(executions)
    }

    async fn find_by_deal_and_type(
        &self,
        deal_id: Uuid,
        agent_type: AgentType,
    ) -> RepositoryResult<Vec<AgentExecution>> {
        let sql = format!(
            "SELECT {EXECUTION_COLUMNS} FROM agent_executions \
             WHERE deal_id = $1 AND agent_type = $2 ORDER BY recursion_level"
        );
        let rows = sqlx::query_as::<_, AgentExecutionRow>(&sql)
            .bind(deal_id)
            .bind(agent_type.as_str())
            .fetch_all(&self.pool)
            .await?;
        into_executions(rows)
    }

    async fn create(&self, new_execution: NewAgentExecution) -> RepositoryResult<AgentExecution> {
        let execution = new_execution.into_execution(Utc::now());
        let sql = format!(
            "INSERT INTO agent_executions \
             (execution_id, deal_id, agent_type, recursion_level, parent_execution_id, status, \
              progress_percentage, input_data, retry_count, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, 0, $7, 0, $8, $8) \
             RETURNING {EXECUTION_COLUMNS}"
        );

        let result = sqlx::query_as::<_, AgentExecutionRow>(&sql)
            .bind(execution.execution_id)
            .bind(execution.deal_id)
            .bind(execution.agent_type.as_str())
            .bind(execution.recursion_level as i32)
            .bind(execution.parent_execution_id)
            .bind(execution.status.as_str())
            .bind(&execution.input_data)
            .bind(execution.created_at)
            .fetch_one(&self.pool)
            .await;

        match result {
            Ok(row) => row.try_into(),
            Err(err) if is_unique_violation(&err) => Err(RepositoryError::Duplicate {
                deal_id: execution.deal_id,
                agent_type: execution.agent_type,
                recursion_level: execution.recursion_level,
            }),
            Err(err) => Err(err.into()),
        }
    }

    async fn update(
        &self,
        execution: &AgentExecution,
        expected_status: ExecutionStatus,
    ) -> RepositoryResult<AgentExecution> {
        let sql = format!(
            "UPDATE agent_executions SET \
               status = $3, progress_percentage = $4, output_data = $5, error_message = $6, \
               queued_at = $7, start_time = $8, end_time = $9, duration_ms = $10, \
               retry_count = $11, job_id = $12, updated_at = $13 \
             WHERE execution_id = $1 AND status = $2 \
             RETURNING {EXECUTION_COLUMNS}"
        );

        let row = sqlx::query_as::<_, AgentExecutionRow>(&sql)
            .bind(execution.execution_id)
            .bind(expected_status.as_str())
            .bind(execution.status.as_str())
            .bind(i16::from(execution.progress_percentage))
            .bind(&execution.output_data)
            .bind(&execution.error_message)
            .bind(execution.queued_at)
            .bind(execution.start_time)
            .bind(execution.end_time)
            .bind(execution.duration_ms)
            .bind(execution.retry_count as i32)
            .bind(execution.job_id.map(|job_id| job_id.as_uuid()))
            .bind(execution.updated_at)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => row.try_into(),
            None => {
                let actual = self.current_status(execution.execution_id).await?;
                Err(RepositoryError::ConcurrentModification {
                    execution_id: execution.execution_id,
                    expected: expected_status,
                    actual,
                })
            }
        }
    }
}

#[derive(Debug, Clone, FromRow)]
struct TimelineEventRow {
    event_id: Uuid,
    deal_id: Uuid,
    event_type: String,
    payload: Value,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct PgTimelineRepository {
    pool: PgPool,
}

impl PgTimelineRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TimelineRepository for PgTimelineRepository {
    async fn append(&self, event: TimelineEvent) -> RepositoryResult<()> {
        sqlx::query(
            "INSERT INTO timeline_events (event_id, deal_id, event_type, payload, timestamp) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(event.event_id)
        .bind(event.deal_id)
        .bind(event.event_type.as_str())
        .bind(&event.payload)
        .bind(event.timestamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_by_deal(&self, deal_id: Uuid) -> RepositoryResult<Vec<TimelineEvent>> {
        let rows = sqlx::query_as::<_, TimelineEventRow>(
            "SELECT event_id, deal_id, event_type, payload, timestamp FROM timeline_events \
             WHERE deal_id = $1 ORDER BY sequence",
        )
        .bind(deal_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(TimelineEvent {
                    event_id: row.event_id,
                    deal_id: row.deal_id,
                    event_type: row
                        .event_type
                        .parse()
                        .map_err(RepositoryError::Serialization)?,
                    payload: row.payload,
                    timestamp: row.timestamp,
                })
            })
            .collect()
    }
}
