//! # Progress & Bottleneck Analyzer
//!
//! Read-only aggregation over a deal's executions. Percentages count every
//! execution including superseded recursion levels; bottlenecks and next actions
//! look only at the latest execution of each agent type.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::dependency_graph::DependencyGraph;
use super::types::{Bottleneck, BottleneckKind, NextAction, ProgressAnalysis, Severity};
use crate::config::OrchestratorConfig;
use crate::models::{latest_per_agent_type, AgentExecution, AgentType};
use crate::state_machine::ExecutionStatus;

const MS_PER_HOUR: f64 = 3_600_000.0;

#[derive(Debug, Clone)]
pub struct ProgressAnalyzer {
    graph: Arc<DependencyGraph>,
    config: Arc<OrchestratorConfig>,
}

impl ProgressAnalyzer {
    pub fn new(graph: Arc<DependencyGraph>, config: Arc<OrchestratorConfig>) -> Self {
        Self { graph, config }
    }

    pub fn analyze(
        &self,
        executions: &[AgentExecution],
        recursive_analysis_needed: bool,
        now: DateTime<Utc>,
    ) -> ProgressAnalysis {
        let latest = latest_per_agent_type(executions);

        let mut bottlenecks = Vec::new();
        bottlenecks.extend(self.failed_agents(&latest));
        bottlenecks.extend(self.long_running(&latest, now));
        bottlenecks.extend(self.dependency_blocks(&latest));

        ProgressAnalysis {
            overall_percentage: overall_percentage(executions),
            bottlenecks,
            next_actions: self.next_actions(&latest, recursive_analysis_needed),
        }
    }

    fn failed_agents(
        &self,
        latest: &BTreeMap<AgentType, &AgentExecution>,
    ) -> Option<Bottleneck> {
        let failed: Vec<&AgentExecution> = latest
            .values()
            .copied()
            .filter(|execution| execution.status == ExecutionStatus::Failed)
            .collect();
        if failed.is_empty() {
            return None;
        }

        Some(Bottleneck {
            kind: BottleneckKind::FailedAgents,
            severity: Severity::High,
            agents: failed.iter().map(|execution| execution.agent_type).collect(),
            blocked_by: Vec::new(),
            execution_ids: failed.iter().map(|execution| execution.execution_id).collect(),
        })
    }

    fn long_running(
        &self,
        latest: &BTreeMap<AgentType, &AgentExecution>,
        now: DateTime<Utc>,
    ) -> Vec<Bottleneck> {
        latest
            .values()
            .filter_map(|execution| {
                let elapsed = execution.running_for(now)?;
                let expected_hours = self.config.expected_duration_hours(execution.agent_type)?;
                let threshold_ms =
                    (self.config.analysis.long_running_factor * expected_hours * MS_PER_HOUR) as i64;

                (elapsed.num_milliseconds() > threshold_ms).then(|| Bottleneck {
                    kind: BottleneckKind::LongRunning,
                    severity: Severity::Medium,
                    agents: vec![execution.agent_type],
                    blocked_by: Vec::new(),
                    execution_ids: vec![execution.execution_id],
                })
            })
            .collect()
    }

    fn dependency_blocks(&self, latest: &BTreeMap<AgentType, &AgentExecution>) -> Vec<Bottleneck> {
        latest
            .values()
            .filter(|execution| execution.status == ExecutionStatus::Pending)
            .filter_map(|execution| {
                let blocked_by = self.unmet_dependencies(execution.agent_type, latest);
                (!blocked_by.is_empty()).then(|| Bottleneck {
                    kind: BottleneckKind::DependencyBlock,
                    severity: Severity::Low,
                    agents: vec![execution.agent_type],
                    blocked_by,
                    execution_ids: vec![execution.execution_id],
                })
            })
            .collect()
    }

    fn next_actions(
        &self,
        latest: &BTreeMap<AgentType, &AgentExecution>,
        recursive_analysis_needed: bool,
    ) -> Vec<NextAction> {
        let mut actions = Vec::new();

        let failed = agents_with_status(latest, ExecutionStatus::Failed);
        if !failed.is_empty() {
            actions.push(NextAction::RetryFailedAgents { agents: failed });
        }

        let ready: Vec<AgentType> = latest
            .values()
            .filter(|execution| execution.status == ExecutionStatus::Pending)
            .filter(|execution| {
                self.unmet_dependencies(execution.agent_type, latest)
                    .is_empty()
            })
            .map(|execution| execution.agent_type)
            .collect();
        if !ready.is_empty() {
            actions.push(NextAction::StartReadyAgents { agents: ready });
        }

        let all_completed = !latest.is_empty()
            && latest
                .values()
                .all(|execution| execution.status == ExecutionStatus::Completed);
        if all_completed {
            actions.push(NextAction::GenerateFinalReport);
        }

        let any_active = latest.values().any(|execution| execution.is_active());
        if recursive_analysis_needed && !latest.is_empty() && !any_active {
            actions.push(NextAction::TriggerRecursiveAnalysis);
        }

        actions
    }

    /// Prerequisites whose latest execution is missing or not completed
    pub fn unmet_dependencies(
        &self,
        agent_type: AgentType,
        latest: &BTreeMap<AgentType, &AgentExecution>,
    ) -> Vec<AgentType> {
        self.graph
            .dependencies_of(agent_type)
            .filter(|dependency| {
                !latest
                    .get(dependency)
                    .is_some_and(|execution| execution.status.satisfies_dependencies())
            })
            .collect()
    }
}

/// `floor(100 * completed / total)`, 0 when there are no executions
pub fn overall_percentage(executions: &[AgentExecution]) -> u8 {
    if executions.is_empty() {
        return 0;
    }
    let completed = executions
        .iter()
        .filter(|execution| execution.status == ExecutionStatus::Completed)
        .count();
    ((completed * 100) / executions.len()) as u8
}

fn agents_with_status(
    latest: &BTreeMap<AgentType, &AgentExecution>,
    status: ExecutionStatus,
) -> Vec<AgentType> {
    latest
        .values()
        .filter(|execution| execution.status == status)
        .map(|execution| execution.agent_type)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewAgentExecution;
    use uuid::Uuid;

    fn analyzer() -> ProgressAnalyzer {
        let config = Arc::new(OrchestratorConfig::default());
        let graph = Arc::new(DependencyGraph::from_config(&config).unwrap());
        ProgressAnalyzer::new(graph, config)
    }

    fn execution(deal_id: Uuid, agent_type: AgentType, status: ExecutionStatus) -> AgentExecution {
        let mut execution =
            NewAgentExecution::root(deal_id, agent_type, None).into_execution(Utc::now());
        execution.status = status;
        execution
    }

    #[test]
    fn test_percentage_floors() {
        let deal_id = Uuid::new_v4();
        let executions = vec![
            execution(deal_id, AgentType::Finance, ExecutionStatus::Completed),
            execution(deal_id, AgentType::Legal, ExecutionStatus::Running),
            execution(deal_id, AgentType::Synergy, ExecutionStatus::Pending),
        ];
        assert_eq!(overall_percentage(&executions), 33);
        assert_eq!(overall_percentage(&[]), 0);
    }

    #[test]
    fn test_failed_finance_blocks_dependents() {
        let deal_id = Uuid::new_v4();
        let executions = vec![
            execution(deal_id, AgentType::Finance, ExecutionStatus::Failed),
            execution(deal_id, AgentType::Legal, ExecutionStatus::Completed),
            execution(deal_id, AgentType::Synergy, ExecutionStatus::Pending),
            execution(deal_id, AgentType::Operations, ExecutionStatus::Pending),
        ];

        let analysis = analyzer().analyze(&executions, false, Utc::now());
        let kinds: Vec<BottleneckKind> = analysis.bottlenecks.iter().map(|b| b.kind).collect();
        assert_eq!(
            kinds,
            vec![
                BottleneckKind::FailedAgents,
                BottleneckKind::DependencyBlock,
                BottleneckKind::DependencyBlock
            ]
        );
        assert_eq!(analysis.bottlenecks[0].agents, vec![AgentType::Finance]);
        assert_eq!(analysis.bottlenecks[0].severity, Severity::High);
        assert_eq!(analysis.bottlenecks[1].agents, vec![AgentType::Synergy]);
        assert_eq!(analysis.bottlenecks[2].blocked_by, vec![AgentType::Finance]);
        assert_eq!(
            analysis.next_actions,
            vec![NextAction::RetryFailedAgents {
                agents: vec![AgentType::Finance]
            }]
        );
    }

    #[test]
    fn test_long_running_uses_factor_of_expected_duration() {
        let deal_id = Uuid::new_v4();
        let now = Utc::now();
        // Reputation expects 1h; 1.5h is the threshold
        let mut slow = execution(deal_id, AgentType::Reputation, ExecutionStatus::Running);
        slow.start_time = Some(now - chrono::Duration::minutes(91));
        let mut fine = execution(deal_id, AgentType::Finance, ExecutionStatus::Running);
        fine.start_time = Some(now - chrono::Duration::minutes(200));

        let analysis = analyzer().analyze(&[slow.clone(), fine], false, now);
        assert_eq!(analysis.bottlenecks.len(), 1);
        assert_eq!(analysis.bottlenecks[0].kind, BottleneckKind::LongRunning);
        assert_eq!(analysis.bottlenecks[0].execution_ids, vec![slow.execution_id]);
    }

    #[test]
    fn test_ready_pending_work_and_final_report() {
        let deal_id = Uuid::new_v4();
        let pending = vec![
            execution(deal_id, AgentType::Finance, ExecutionStatus::Completed),
            execution(deal_id, AgentType::Synergy, ExecutionStatus::Pending),
        ];
        let analysis = analyzer().analyze(&pending, false, Utc::now());
        assert_eq!(
            analysis.next_actions,
            vec![NextAction::StartReadyAgents {
                agents: vec![AgentType::Synergy]
            }]
        );

        let done: Vec<AgentExecution> = AgentType::ALL
            .iter()
            .map(|agent_type| execution(deal_id, *agent_type, ExecutionStatus::Completed))
            .collect();
        let analysis = analyzer().analyze(&done, true, Utc::now());
        assert_eq!(analysis.overall_percentage, 100);
        assert!(analysis.bottlenecks.is_empty());
        assert_eq!(
            analysis.next_actions,
            vec![
                NextAction::GenerateFinalReport,
                NextAction::TriggerRecursiveAnalysis
            ]
        );
    }

    #[test]
    fn test_superseded_failure_is_not_a_bottleneck() {
        let deal_id = Uuid::new_v4();
        let failed_root = execution(deal_id, AgentType::Finance, ExecutionStatus::Failed);
        let child = NewAgentExecution::recursive(&failed_root, None).into_execution(Utc::now());

        let analysis = analyzer().analyze(&[failed_root, child], false, Utc::now());
        assert!(analysis.bottlenecks.is_empty());
    }
}
