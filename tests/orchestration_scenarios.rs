//! End-to-end orchestration scenarios driven through the dispatcher by hand, so
//! every step of a deal's lifecycle is deterministic.

mod common;

use common::{eventually, fast, four_agent_config, manual_resolution, TestHarness};
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

use diligence_core::config::{AgentSettings, OrchestratorConfig};
use diligence_core::models::{AgentType, DealStatus, TimelineEventType};
use diligence_core::orchestration::{
    BottleneckKind, ClaimedJob, FailureDisposition, NextAction, Severity,
};
use diligence_core::queue::JobQueue;
use diligence_core::repository::{ExecutionRepository, TimelineRepository};
use diligence_core::worker::WorkerError;
use diligence_core::{ExecutionStatus, OrchestratorError};

async fn claim(harness: &TestHarness, agent_type: AgentType) -> ClaimedJob {
    harness
        .system
        .dispatcher()
        .claim_next(agent_type)
        .await
        .unwrap()
        .unwrap_or_else(|| panic!("expected a {agent_type} job"))
}

async fn run_to_completion(harness: &TestHarness, agent_type: AgentType) {
    let claimed = claim(harness, agent_type).await;
    harness
        .system
        .dispatcher()
        .on_completed(claimed.job.job_id, json!({ "summary": agent_type.as_str() }))
        .await
        .unwrap();
}

async fn event_count(harness: &TestHarness, deal_id: uuid::Uuid, event_type: TimelineEventType) -> usize {
    harness
        .stores
        .timeline
        .list_by_deal(deal_id)
        .await
        .unwrap()
        .iter()
        .filter(|event| event.event_type == event_type)
        .count()
}

#[tokio::test]
async fn test_plan_creation_queues_first_phase() {
    let harness = TestHarness::new(manual_resolution(fast(four_agent_config())));
    let deal = harness.seed_deal();
    let orchestrator = harness.system.orchestrator();

    let plan = orchestrator.create_orchestration_plan(deal.deal_id).await.unwrap();

    assert_eq!(
        plan.phases
            .iter()
            .map(|phase| phase.agent_types.clone())
            .collect::<Vec<_>>(),
        vec![
            vec![AgentType::Finance, AgentType::Legal],
            vec![AgentType::Synergy, AgentType::Operations],
        ]
    );
    assert!((plan.estimated_duration_hours - 6.5).abs() < 1e-9);

    let status = orchestrator.get_deal_status(deal.deal_id).await.unwrap();
    assert_eq!(status.deal_status, DealStatus::Analyzing);
    assert_eq!(status.agents.len(), 4);
    assert_eq!(status.agent(AgentType::Finance).unwrap().status, ExecutionStatus::Queued);
    assert_eq!(status.agent(AgentType::Legal).unwrap().status, ExecutionStatus::Queued);
    assert_eq!(status.agent(AgentType::Synergy).unwrap().status, ExecutionStatus::Pending);
    assert_eq!(status.agent(AgentType::Operations).unwrap().status, ExecutionStatus::Pending);
    assert_eq!(status.overall_percentage, 0);

    let stats = orchestrator.get_queue_stats().await.unwrap();
    assert_eq!(stats[&AgentType::Finance].waiting, 1);
    assert_eq!(stats[&AgentType::Legal].waiting, 1);
    assert_eq!(stats[&AgentType::Synergy].waiting, 0);
    assert_eq!(event_count(&harness, deal.deal_id, TimelineEventType::PlanCreated).await, 1);

    harness.shutdown().await;
}

#[tokio::test]
async fn test_replanning_keeps_existing_executions() {
    let harness = TestHarness::new(manual_resolution(fast(four_agent_config())));
    let deal = harness.seed_deal();
    let orchestrator = harness.system.orchestrator();

    orchestrator.create_orchestration_plan(deal.deal_id).await.unwrap();
    orchestrator.create_orchestration_plan(deal.deal_id).await.unwrap();

    let executions = harness.stores.executions.list_by_deal(deal.deal_id).await.unwrap();
    assert_eq!(executions.len(), 4);
    assert_eq!(harness.queue.waiting_jobs(AgentType::Finance).await.len(), 1);

    harness.shutdown().await;
}

#[tokio::test]
async fn test_failed_prerequisite_blocks_dependents() {
    let harness = TestHarness::new(manual_resolution(fast(four_agent_config())));
    let deal = harness.seed_deal();
    let orchestrator = harness.system.orchestrator();
    orchestrator.create_orchestration_plan(deal.deal_id).await.unwrap();

    let finance = claim(&harness, AgentType::Finance).await;
    harness
        .system
        .dispatcher()
        .on_failed(finance.job.job_id, "balance sheet unavailable")
        .await
        .unwrap();

    let status = orchestrator.get_deal_status(deal.deal_id).await.unwrap();
    let failed = status.bottleneck(BottleneckKind::FailedAgents).unwrap();
    assert_eq!(failed.severity, Severity::High);
    assert_eq!(failed.agents, vec![AgentType::Finance]);
    assert_eq!(failed.execution_ids, vec![finance.execution.execution_id]);

    let blocked: BTreeMap<AgentType, Vec<AgentType>> = status
        .bottlenecks
        .iter()
        .filter(|bottleneck| bottleneck.kind == BottleneckKind::DependencyBlock)
        .map(|bottleneck| (bottleneck.agents[0], bottleneck.blocked_by.clone()))
        .collect();
    assert_eq!(blocked[&AgentType::Synergy], vec![AgentType::Finance]);
    assert_eq!(
        blocked[&AgentType::Operations],
        vec![AgentType::Finance, AgentType::Legal]
    );
    assert_eq!(status.agent(AgentType::Synergy).unwrap().status, ExecutionStatus::Pending);
    assert_eq!(status.agent(AgentType::Legal).unwrap().status, ExecutionStatus::Queued);
    assert!(status.next_actions.contains(&NextAction::RetryFailedAgents {
        agents: vec![AgentType::Finance]
    }));

    let finance_entry = status.agent(AgentType::Finance).unwrap();
    assert_eq!(finance_entry.status, ExecutionStatus::Failed);
    assert_eq!(
        finance_entry.error_message.as_deref(),
        Some("balance sheet unavailable")
    );

    harness.shutdown().await;
}

#[tokio::test]
async fn test_retry_failed_jobs_requeues_failures() {
    let harness = TestHarness::new(manual_resolution(fast(four_agent_config())));
    let deal = harness.seed_deal();
    let orchestrator = harness.system.orchestrator();
    orchestrator.create_orchestration_plan(deal.deal_id).await.unwrap();

    let finance = claim(&harness, AgentType::Finance).await;
    harness
        .system
        .dispatcher()
        .on_failed(finance.job.job_id, "timeout talking to ledger")
        .await
        .unwrap();

    let summary = orchestrator.retry_failed_jobs(deal.deal_id).await.unwrap();
    assert_eq!(summary.retried, 1);
    assert_eq!(summary.execution_ids, vec![finance.execution.execution_id]);

    let execution = harness
        .stores
        .executions
        .get(finance.execution.execution_id)
        .await
        .unwrap();
    assert_eq!(execution.status, ExecutionStatus::Queued);
    assert_eq!(execution.retry_count, 1);
    assert_eq!(execution.error_message, None);
    assert_eq!(execution.progress_percentage, 0);
    assert_eq!(event_count(&harness, deal.deal_id, TimelineEventType::AgentReset).await, 1);

    // Nothing else was failed, so a second retry is a no-op
    let again = orchestrator.retry_failed_jobs(deal.deal_id).await.unwrap();
    assert_eq!(again.retried, 0);

    // The re-queued finance job runs normally
    run_to_completion(&harness, AgentType::Finance).await;
    let status = orchestrator.get_deal_status(deal.deal_id).await.unwrap();
    assert_eq!(status.agent(AgentType::Finance).unwrap().status, ExecutionStatus::Completed);

    harness.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_retry_keeps_going_when_a_submission_is_exhausted() {
    let mut config = manual_resolution(fast(four_agent_config()));
    config.resolver.poll_enabled = true;
    config.resolver.poll_interval_ms = 60_000;
    let harness = TestHarness::new(config);
    let deal = harness.seed_deal();
    let orchestrator = harness.system.orchestrator();
    let dispatcher = harness.system.dispatcher();
    orchestrator.create_orchestration_plan(deal.deal_id).await.unwrap();

    let finance = claim(&harness, AgentType::Finance).await;
    let legal = claim(&harness, AgentType::Legal).await;
    dispatcher.on_failed(finance.job.job_id, "ledger offline").await.unwrap();
    dispatcher.on_failed(legal.job.job_id, "registry offline").await.unwrap();

    // Every submission attempt for finance fails; legal goes through
    harness.queue.fail_next_submissions(3);
    let summary = orchestrator.retry_failed_jobs(deal.deal_id).await.unwrap();
    assert_eq!(summary.retried, 2);
    assert_eq!(summary.enqueue_failures.len(), 1);
    assert_eq!(summary.enqueue_failures[0].execution_id, finance.execution.execution_id);
    assert_eq!(summary.enqueue_failures[0].agent_type, AgentType::Finance);

    let status = orchestrator.get_deal_status(deal.deal_id).await.unwrap();
    assert_eq!(status.agent(AgentType::Finance).unwrap().status, ExecutionStatus::Pending);
    assert_eq!(status.agent(AgentType::Legal).unwrap().status, ExecutionStatus::Queued);
    assert!(harness.system.resolver().is_watching(deal.deal_id));

    // The stranded execution is no longer failed, so only the poller can pick it up
    let again = orchestrator.retry_failed_jobs(deal.deal_id).await.unwrap();
    assert_eq!(again.retried, 0);

    tokio::time::advance(Duration::from_secs(61)).await;
    let promoted = eventually(Duration::from_secs(5), || async {
        let status = orchestrator.get_deal_status(deal.deal_id).await.unwrap();
        status.agent(AgentType::Finance).unwrap().status == ExecutionStatus::Queued
    })
    .await;
    assert!(promoted, "poller should queue the reset finance execution");

    harness.shutdown().await;
}

#[tokio::test]
async fn test_all_completed_finalizes_deal() {
    let harness = TestHarness::new(manual_resolution(fast(four_agent_config())));
    let deal = harness.seed_deal();
    let orchestrator = harness.system.orchestrator();
    let resolver = harness.system.resolver();
    orchestrator.create_orchestration_plan(deal.deal_id).await.unwrap();

    run_to_completion(&harness, AgentType::Finance).await;
    let partial = resolver.resolve_deal(deal.deal_id).await.unwrap();
    assert_eq!(partial.promoted.len(), 1, "only synergy is ready");
    assert_eq!(partial.pending_remaining, 1);

    run_to_completion(&harness, AgentType::Legal).await;
    let rest = resolver.resolve_deal(deal.deal_id).await.unwrap();
    assert_eq!(rest.promoted.len(), 1, "operations is ready now");
    assert!(!rest.finalized);

    run_to_completion(&harness, AgentType::Synergy).await;
    run_to_completion(&harness, AgentType::Operations).await;
    let done = resolver.resolve_deal(deal.deal_id).await.unwrap();
    assert!(done.finalized);

    let status = orchestrator.get_deal_status(deal.deal_id).await.unwrap();
    assert_eq!(status.deal_status, DealStatus::Completed);
    assert_eq!(status.overall_percentage, 100);
    assert!(status.bottlenecks.is_empty());
    assert_eq!(status.next_actions, vec![NextAction::GenerateFinalReport]);

    // Finalization is recorded once however often resolution runs
    resolver.resolve_deal(deal.deal_id).await.unwrap();
    assert_eq!(
        event_count(&harness, deal.deal_id, TimelineEventType::OrchestrationCompleted).await,
        1
    );

    harness.shutdown().await;
}

#[tokio::test]
async fn test_cancel_leaves_running_execution_alone() {
    let mut config = OrchestratorConfig::default();
    config.agents = BTreeMap::from([
        (AgentType::Finance, AgentSettings::new(2.5, 1, &[])),
        (
            AgentType::Synergy,
            AgentSettings::new(1.5, 2, &[AgentType::Finance]),
        ),
        (
            AgentType::Operations,
            AgentSettings::new(2.0, 3, &[AgentType::Finance]),
        ),
    ]);
    let harness = TestHarness::new(manual_resolution(fast(config)));
    let deal = harness.seed_deal();
    let orchestrator = harness.system.orchestrator();
    orchestrator.create_orchestration_plan(deal.deal_id).await.unwrap();

    let finance = claim(&harness, AgentType::Finance).await;
    assert_eq!(finance.execution.status, ExecutionStatus::Running);

    let summary = orchestrator.cancel_deal_orchestration(deal.deal_id).await.unwrap();
    assert_eq!(summary.cancelled_count, 2);
    assert_eq!(summary.still_running, 1);
    assert_eq!(summary.jobs_removed, 0);

    let status = orchestrator.get_deal_status(deal.deal_id).await.unwrap();
    assert_eq!(status.deal_status, DealStatus::Cancelled);
    assert_eq!(status.agent(AgentType::Synergy).unwrap().status, ExecutionStatus::Cancelled);
    assert_eq!(status.agent(AgentType::Operations).unwrap().status, ExecutionStatus::Cancelled);

    // The running execution finishes naturally and nothing new is promoted
    harness
        .system
        .dispatcher()
        .on_completed(finance.job.job_id, json!({ "revenue": 12 }))
        .await
        .unwrap();
    let resolution = harness.system.resolver().resolve_deal(deal.deal_id).await.unwrap();
    assert!(resolution.promoted.is_empty());
    assert!(!resolution.finalized);

    let status = orchestrator.get_deal_status(deal.deal_id).await.unwrap();
    assert_eq!(status.agent(AgentType::Finance).unwrap().status, ExecutionStatus::Completed);
    assert_eq!(status.deal_status, DealStatus::Cancelled);
    assert_eq!(
        event_count(&harness, deal.deal_id, TimelineEventType::AgentCancelled).await,
        2
    );

    harness.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_cancel_keeps_backoff_job_of_running_execution() {
    let harness = TestHarness::new(manual_resolution(fast(four_agent_config())));
    let deal = harness.seed_deal();
    let orchestrator = harness.system.orchestrator();
    let dispatcher = harness.system.dispatcher();
    orchestrator.create_orchestration_plan(deal.deal_id).await.unwrap();

    let finance = claim(&harness, AgentType::Finance).await;
    let disposition = dispatcher
        .handle_worker_error(finance.job.job_id, &WorkerError::transient("ledger timeout"))
        .await
        .unwrap();
    assert!(matches!(disposition, FailureDisposition::RetryScheduled { attempt: 1, .. }));

    let summary = orchestrator.cancel_deal_orchestration(deal.deal_id).await.unwrap();
    assert_eq!(summary.cancelled_count, 3);
    assert_eq!(summary.still_running, 1);
    assert_eq!(summary.jobs_removed, 1, "only legal's waiting job goes");
    assert_eq!(harness.queue.stats(AgentType::Finance).await.unwrap().delayed, 1);

    // Once the backoff elapses the running execution is re-attempted and finishes
    tokio::time::advance(Duration::from_millis(25)).await;
    let retried = claim(&harness, AgentType::Finance).await;
    assert_eq!(retried.job.job_id, finance.job.job_id);
    assert_eq!(retried.job.attempts_made, 2);
    assert_eq!(retried.execution.status, ExecutionStatus::Running);

    let completed = dispatcher
        .on_completed(retried.job.job_id, json!({ "revenue": 12 }))
        .await
        .unwrap();
    assert_eq!(completed.status, ExecutionStatus::Completed);
    assert!(matches!(
        dispatcher.on_progress(retried.job.job_id, 50).await,
        Err(OrchestratorError::UnknownJob(_))
    ));

    let status = orchestrator.get_deal_status(deal.deal_id).await.unwrap();
    assert_eq!(status.deal_status, DealStatus::Cancelled);

    harness.shutdown().await;
}

#[tokio::test]
async fn test_cancel_removes_waiting_jobs() {
    let harness = TestHarness::new(manual_resolution(fast(four_agent_config())));
    let deal = harness.seed_deal();
    let orchestrator = harness.system.orchestrator();
    orchestrator.create_orchestration_plan(deal.deal_id).await.unwrap();

    let summary = orchestrator.cancel_deal_orchestration(deal.deal_id).await.unwrap();
    assert_eq!(summary.jobs_removed, 2);
    assert_eq!(summary.cancelled_count, 4);
    assert_eq!(summary.still_running, 0);

    let claimed = harness
        .system
        .dispatcher()
        .claim_next(AgentType::Finance)
        .await
        .unwrap();
    assert!(claimed.is_none());

    // Re-planning a cancelled deal appends fresh executions one level deeper
    orchestrator.create_orchestration_plan(deal.deal_id).await.unwrap();
    let status = orchestrator.get_deal_status(deal.deal_id).await.unwrap();
    assert_eq!(status.agents.len(), 8);
    let finance = status.agent(AgentType::Finance).unwrap();
    assert_eq!(finance.recursion_level, 1);
    assert_eq!(finance.status, ExecutionStatus::Queued);
    assert_eq!(status.deal_status, DealStatus::Analyzing);

    harness.shutdown().await;
}

#[tokio::test]
async fn test_recursive_analysis_appends_child_execution() {
    let harness = TestHarness::new(manual_resolution(fast(four_agent_config())));
    let deal = harness.seed_deal();
    let orchestrator = harness.system.orchestrator();
    let resolver = harness.system.resolver();
    orchestrator.create_orchestration_plan(deal.deal_id).await.unwrap();

    // Active executions cannot be re-analysed
    let err = orchestrator
        .trigger_recursive_analysis(deal.deal_id, AgentType::Finance)
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::Validation(_)));

    run_to_completion(&harness, AgentType::Finance).await;
    run_to_completion(&harness, AgentType::Legal).await;
    resolver.resolve_deal(deal.deal_id).await.unwrap();
    run_to_completion(&harness, AgentType::Synergy).await;
    run_to_completion(&harness, AgentType::Operations).await;
    assert!(resolver.resolve_deal(deal.deal_id).await.unwrap().finalized);

    harness
        .stores
        .findings
        .set_requires_recursion(deal.deal_id, true);
    let status = orchestrator.get_deal_status(deal.deal_id).await.unwrap();
    assert!(status.recursive_analysis_needed);
    assert!(status.next_actions.contains(&NextAction::TriggerRecursiveAnalysis));

    let child = orchestrator
        .trigger_recursive_analysis(deal.deal_id, AgentType::Finance)
        .await
        .unwrap();
    assert_eq!(child.recursion_level, 1);
    assert!(child.parent_execution_id.is_some());
    assert_eq!(child.status, ExecutionStatus::Queued, "finance has no prerequisites");
    let input = child.input_data.clone().unwrap();
    assert_eq!(input["parent_output"]["summary"], "finance");

    let status = orchestrator.get_deal_status(deal.deal_id).await.unwrap();
    assert_eq!(status.deal_status, DealStatus::Analyzing);
    assert_eq!(status.agents.len(), 5);
    assert_eq!(status.overall_percentage, 80);

    let claimed = claim(&harness, AgentType::Finance).await;
    assert_eq!(claimed.execution.execution_id, child.execution_id);
    harness
        .system
        .dispatcher()
        .on_completed(claimed.job.job_id, json!({ "summary": "finance, deeper" }))
        .await
        .unwrap();
    assert!(resolver.resolve_deal(deal.deal_id).await.unwrap().finalized);
    assert_eq!(
        event_count(&harness, deal.deal_id, TimelineEventType::OrchestrationCompleted).await,
        2
    );

    harness.shutdown().await;
}

#[tokio::test]
async fn test_unknown_deal_and_unconfigured_agent_are_rejected() {
    let harness = TestHarness::new(manual_resolution(fast(four_agent_config())));
    let orchestrator = harness.system.orchestrator();

    let missing = orchestrator
        .create_orchestration_plan(uuid::Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(missing, OrchestratorError::NotFound { .. }));
    assert_err!(orchestrator.get_deal_status(uuid::Uuid::new_v4()).await);

    let deal = harness.seed_deal();
    assert_ok!(orchestrator.create_orchestration_plan(deal.deal_id).await);
    let err = orchestrator
        .trigger_recursive_analysis(deal.deal_id, AgentType::Reputation)
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::Validation(_)));

    harness.shutdown().await;
}

#[tokio::test]
async fn test_push_resolution_promotes_dependents() {
    let mut config = fast(four_agent_config());
    config.resolver.poll_enabled = false;
    let harness = TestHarness::new(config);
    let deal = harness.seed_deal();
    let orchestrator = harness.system.orchestrator();
    orchestrator.create_orchestration_plan(deal.deal_id).await.unwrap();

    run_to_completion(&harness, AgentType::Finance).await;
    run_to_completion(&harness, AgentType::Legal).await;

    let promoted = eventually(Duration::from_secs(2), || async {
        let status = orchestrator.get_deal_status(deal.deal_id).await.unwrap();
        [AgentType::Synergy, AgentType::Operations]
            .iter()
            .all(|agent_type| status.agent(*agent_type).unwrap().status == ExecutionStatus::Queued)
    })
    .await;
    assert!(promoted, "dependents should be queued after push resolution");

    harness.shutdown().await;
}

#[tokio::test]
async fn test_fallback_poller_promotes_dependents_without_push() {
    let mut config = fast(four_agent_config());
    config.resolver.push_enabled = false;
    let harness = TestHarness::new(config);
    let deal = harness.seed_deal();
    let orchestrator = harness.system.orchestrator();
    orchestrator.create_orchestration_plan(deal.deal_id).await.unwrap();
    assert!(harness.system.resolver().is_watching(deal.deal_id));

    run_to_completion(&harness, AgentType::Finance).await;

    let promoted = eventually(Duration::from_secs(2), || async {
        let status = orchestrator.get_deal_status(deal.deal_id).await.unwrap();
        status.agent(AgentType::Synergy).unwrap().status == ExecutionStatus::Queued
    })
    .await;
    assert!(promoted, "poller should promote synergy");

    run_to_completion(&harness, AgentType::Legal).await;
    let stopped = eventually(Duration::from_secs(2), || async {
        !harness.system.resolver().is_watching(deal.deal_id)
    })
    .await;
    assert!(stopped, "poller should stop once nothing is pending");

    harness.shutdown().await;
}
