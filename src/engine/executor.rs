use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, error, warn};
use uuid::Uuid;

use super::graph::Graph;
use super::nodes::{branch_outcome, dispatch, NodeContext};
use super::recorder::RunRecorder;
use super::templating::{render_node, OutputContext};
use super::ExecutionEnv;
use crate::db::workflow_repository::WorkflowRepository;
use crate::models::execution::{
    EventKind, Execution, ExecutionStatus, LogData, LogEntry, NewExecution,
};
use crate::models::workflow::WorkflowEdge;

const PERSISTENCE_MAX_ATTEMPTS: usize = 3;
#[cfg(test)]
const PERSISTENCE_INITIAL_BACKOFF: Duration = Duration::from_millis(5);
#[cfg(not(test))]
const PERSISTENCE_INITIAL_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error(
        "executor persistence operation `{operation}` failed for run {run_id} after {attempts} attempts: {source}"
    )]
    Persistence {
        run_id: Uuid,
        operation: &'static str,
        attempts: usize,
        #[source]
        source: sqlx::Error,
    },
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: Uuid,
    pub started_at: OffsetDateTime,
    pub status: ExecutionStatus,
    pub output: Option<String>,
    pub error: Option<String>,
    pub duration_ms: i64,
    pub logs: Vec<LogEntry>,
}

impl RunOutcome {
    pub fn into_execution(self, workflow_id: Uuid, user_id: Uuid, input: Value) -> NewExecution {
        NewExecution {
            id: self.run_id,
            workflow_id,
            user_id,
            timestamp: self.started_at,
            input,
            output: self.output,
            status: self.status,
            duration_ms: self.duration_ms,
            error: self.error,
            logs: self.logs,
        }
    }
}

/// Runs every reachable node of `graph` in order, stopping at the first failure.
pub async fn execute_workflow(
    env: &ExecutionEnv,
    graph: &Graph,
    input: &str,
    mut recorder: RunRecorder,
) -> RunOutcome {
    let run_id = recorder.run_id();
    let started_at = OffsetDateTime::now_utc();
    let clock = Instant::now();

    let mut outputs: HashMap<String, String> = HashMap::new();
    let mut context = OutputContext::default();
    let mut final_output: Option<String> = None;
    let mut failure: Option<String> = None;

    for node in graph.ordered() {
        let incoming = graph.incoming(&node.id);
        let node_input = if incoming.is_empty() {
            input.to_string()
        } else {
            let live: Vec<&str> = incoming
                .iter()
                .filter_map(|edge| live_output(graph, &outputs, edge))
                .collect();
            if live.is_empty() {
                debug!(%run_id, node_id = %node.id, "no live inputs; skipping node");
                continue;
            }
            live.join("\n")
        };

        let rendered = render_node(node, &node_input, &context);
        recorder.emit(LogData::new(EventKind::NodeStart, node.id.clone()).with_node_type(node.kind.clone()));
        debug!(%run_id, node_id = %node.id, node_kind = %node.kind, "executing workflow node");

        let node_timeout = env.settings.node_timeout;
        let result = {
            let mut ctx = NodeContext {
                env,
                node: &rendered,
                input: &node_input,
                recorder: &mut recorder,
            };
            match timeout(node_timeout, dispatch(&mut ctx)).await {
                Ok(result) => result,
                Err(_) => Err(format!("Node timed out after {}s", node_timeout.as_secs_f64())),
            }
        };

        match result {
            Ok(output) => {
                recorder.emit(
                    LogData::new(EventKind::NodeComplete, node.id.clone())
                        .with_node_type(node.kind.clone())
                        .with_output(output.clone()),
                );
                context.insert(node, &output);
                if node.kind == "output" {
                    final_output = Some(output.clone());
                }
                outputs.insert(node.id.clone(), output);
            }
            Err(err) => {
                warn!(%run_id, node_id = %node.id, node_kind = %node.kind, error = %err, "workflow node failed");
                recorder.emit(
                    LogData::new(EventKind::NodeError, node.id.clone())
                        .with_node_type(node.kind.clone())
                        .with_error(err.clone()),
                );
                failure = Some(format!("Node `{}` failed: {}", node.id, err));
                break;
            }
        }
    }

    RunOutcome {
        run_id,
        started_at,
        status: if failure.is_some() {
            ExecutionStatus::Failed
        } else {
            ExecutionStatus::Completed
        },
        output: final_output,
        error: failure,
        duration_ms: clock.elapsed().as_millis() as i64,
        logs: recorder.into_logs(),
    }
}

/// Output carried by `edge`, if its source ran and the branch was taken.
fn live_output<'a>(
    graph: &Graph,
    outputs: &'a HashMap<String, String>,
    edge: &WorkflowEdge,
) -> Option<&'a str> {
    let output = outputs.get(&edge.source)?;
    let is_condition = graph
        .node(&edge.source)
        .is_some_and(|source| source.kind == "condition");
    if is_condition {
        if let Some(label) = edge.source_handle.as_deref() {
            let taken = branch_outcome(output)?;
            if (label == "true") != taken {
                return None;
            }
        }
    }
    Some(output.as_str())
}

async fn retry_with_backoff<T, Fut, F>(
    run_id: Uuid,
    operation: &'static str,
    mut op: F,
) -> Result<T, ExecutorError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, sqlx::Error>>,
{
    let mut attempt = 0usize;
    let mut backoff = PERSISTENCE_INITIAL_BACKOFF;

    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < PERSISTENCE_MAX_ATTEMPTS => {
                warn!(
                    %run_id,
                    operation,
                    attempt,
                    ?err,
                    "executor persistence operation failed; retrying"
                );
                sleep(backoff).await;
                backoff = backoff.saturating_mul(2);
            }
            Err(err) => {
                error!(
                    %run_id,
                    operation,
                    attempt,
                    ?err,
                    "executor persistence operation exhausted retries"
                );
                return Err(ExecutorError::Persistence {
                    run_id,
                    operation,
                    attempts: attempt,
                    source: err,
                });
            }
        }
    }
}

pub async fn record_execution_with_retry(
    repo: Arc<dyn WorkflowRepository>,
    execution: NewExecution,
) -> Result<Execution, ExecutorError> {
    let run_id = execution.id;
    retry_with_backoff(run_id, "insert_execution", move || {
        let repo = repo.clone();
        let execution = execution.clone();
        async move { repo.insert_execution(execution).await }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::workflow_repository::MockWorkflowRepository;
    use crate::engine::graph::tests::{branch, edge, node};
    use crate::engine::nodes::test_support::{env, env_with, recorder};
    use crate::engine::status::{fold_node_statuses, NodeRunState};
    use crate::engine::EngineSettings;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn events(outcome: &RunOutcome) -> Vec<(EventKind, String)> {
        outcome
            .logs
            .iter()
            .map(|e| (e.data.kind, e.data.node_id.clone()))
            .collect()
    }

    fn assert_paired(outcome: &RunOutcome) {
        let mut starts: HashMap<String, usize> = HashMap::new();
        let mut terminals: HashMap<String, usize> = HashMap::new();
        for entry in &outcome.logs {
            match entry.data.kind {
                EventKind::NodeStart => *starts.entry(entry.data.node_id.clone()).or_default() += 1,
                EventKind::NodeComplete | EventKind::NodeError => {
                    assert_eq!(starts.get(&entry.data.node_id), Some(&1));
                    *terminals.entry(entry.data.node_id.clone()).or_default() += 1;
                }
                _ => {}
            }
        }
        assert_eq!(starts, terminals);
    }

    #[tokio::test]
    async fn linear_chain_passes_outputs_downstream() {
        let graph = Graph::build(
            vec![
                node("in", "input", json!({})),
                node("shout", "lua-script", json!({"script": "return input:upper()"})),
                node("out", "output", json!({"output": "${input} ({{in}})"})),
            ],
            vec![edge("in", "shout"), edge("shout", "out")],
        )
        .unwrap();

        let outcome = execute_workflow(&env(), &graph, "hello", recorder()).await;

        assert_eq!(outcome.status, ExecutionStatus::Completed);
        assert_eq!(outcome.output.as_deref(), Some("HELLO (hello)"));
        assert!(outcome.error.is_none());
        assert_paired(&outcome);
        assert_eq!(
            events(&outcome),
            vec![
                (EventKind::NodeStart, "in".into()),
                (EventKind::Input, "in".into()),
                (EventKind::NodeComplete, "in".into()),
                (EventKind::NodeStart, "shout".into()),
                (EventKind::Output, "shout".into()),
                (EventKind::NodeComplete, "shout".into()),
                (EventKind::NodeStart, "out".into()),
                (EventKind::Output, "out".into()),
                (EventKind::NodeComplete, "out".into()),
            ]
        );
    }

    #[tokio::test]
    async fn condition_follows_only_the_matching_branch() {
        let build = |condition: &str| {
            Graph::build(
                vec![
                    node("in", "input", json!({})),
                    node("check", "condition", json!({"condition": condition})),
                    node("yes", "output", json!({"output": "took yes"})),
                    node("no", "output", json!({"output": "took no"})),
                    node("after", "output", json!({})),
                ],
                vec![
                    edge("in", "check"),
                    branch("check", "yes", "true"),
                    branch("check", "no", "false"),
                    edge("no", "after"),
                ],
            )
            .unwrap()
        };

        let taken = execute_workflow(&env(), &build("${input} > 10"), "42", recorder()).await;
        assert_eq!(taken.output.as_deref(), Some("took yes"));
        assert!(taken.logs.iter().all(|e| e.data.node_id != "no" && e.data.node_id != "after"));
        assert_paired(&taken);

        let other = execute_workflow(&env(), &build("${input} > 10"), "3", recorder()).await;
        assert_eq!(other.output.as_deref(), Some("took no"));
        assert!(other.logs.iter().any(|e| e.data.node_id == "after"));
        assert!(other.logs.iter().all(|e| e.data.node_id != "yes"));
    }

    #[tokio::test]
    async fn unlabeled_condition_edges_always_fire() {
        let graph = Graph::build(
            vec![
                node("check", "condition", json!({"condition": "false"})),
                node("out", "output", json!({})),
            ],
            vec![edge("check", "out")],
        )
        .unwrap();

        let outcome = execute_workflow(&env(), &graph, "", recorder()).await;
        assert_eq!(outcome.output.as_deref(), Some("false"));
    }

    #[tokio::test]
    async fn joins_inputs_from_multiple_parents() {
        let graph = Graph::build(
            vec![
                node("a", "input", json!({"input": "first"})),
                node("b", "input", json!({"input": "second"})),
                node("out", "output", json!({})),
            ],
            vec![edge("a", "out"), edge("b", "out")],
        )
        .unwrap();

        let outcome = execute_workflow(&env(), &graph, "", recorder()).await;
        assert_eq!(outcome.output.as_deref(), Some("first\nsecond"));
    }

    #[tokio::test]
    async fn first_failure_stops_the_run() {
        let graph = Graph::build(
            vec![
                node("in", "input", json!({})),
                node("boom", "lua-script", json!({"script": "error('kaput')"})),
                node("out", "output", json!({})),
            ],
            vec![edge("in", "boom"), edge("boom", "out")],
        )
        .unwrap();

        let outcome = execute_workflow(&env(), &graph, "x", recorder()).await;

        assert_eq!(outcome.status, ExecutionStatus::Failed);
        assert!(outcome.output.is_none());
        assert!(outcome.error.as_deref().unwrap().contains("kaput"));
        assert!(outcome.logs.iter().all(|e| e.data.node_id != "out"));
        assert_paired(&outcome);

        let statuses = fold_node_statuses(outcome.logs.iter().map(|e| &e.data));
        assert_eq!(statuses["in"].status, NodeRunState::Completed);
        assert_eq!(statuses["boom"].status, NodeRunState::Error);
    }

    #[tokio::test]
    async fn slow_nodes_time_out() {
        let env = env_with(EngineSettings {
            node_timeout: Duration::from_millis(100),
            ..EngineSettings::default()
        });
        let graph = Graph::build(
            vec![node("spin", "lua-script", json!({"script": "while true do end"}))],
            vec![],
        )
        .unwrap();

        let outcome = execute_workflow(&env, &graph, "", recorder()).await;
        assert_eq!(outcome.status, ExecutionStatus::Failed);
        assert_paired(&outcome);
    }

    fn new_execution() -> NewExecution {
        RunOutcome {
            run_id: Uuid::new_v4(),
            started_at: OffsetDateTime::now_utc(),
            status: ExecutionStatus::Completed,
            output: Some("ok".into()),
            error: None,
            duration_ms: 3,
            logs: vec![],
        }
        .into_execution(Uuid::new_v4(), Uuid::new_v4(), json!("in"))
    }

    fn stored(new: &NewExecution) -> Execution {
        Execution {
            id: new.id,
            workflow_id: new.workflow_id,
            user_id: new.user_id,
            timestamp: new.timestamp,
            input: new.input.clone(),
            output: new.output.clone(),
            status: new.status.as_str().to_string(),
            duration: Some(new.duration_ms),
            error: new.error.clone(),
            logs: new.logs.clone(),
        }
    }

    #[tokio::test]
    async fn persistence_retries_transient_failures() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let mut repo = MockWorkflowRepository::new();
        repo.expect_insert_execution()
            .times(2)
            .returning(move |new| {
                if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(sqlx::Error::PoolTimedOut)
                } else {
                    Ok(stored(&new))
                }
            });

        let execution = new_execution();
        let id = execution.id;
        let saved = record_execution_with_retry(Arc::new(repo), execution)
            .await
            .unwrap();

        assert_eq!(saved.id, id);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn persistence_gives_up_after_max_attempts() {
        let mut repo = MockWorkflowRepository::new();
        repo.expect_insert_execution()
            .times(PERSISTENCE_MAX_ATTEMPTS)
            .returning(|_| Err(sqlx::Error::PoolTimedOut));

        let err = record_execution_with_retry(Arc::new(repo), new_execution())
            .await
            .unwrap_err();

        let ExecutorError::Persistence {
            operation,
            attempts,
            ..
        } = err;
        assert_eq!(operation, "insert_execution");
        assert_eq!(attempts, PERSISTENCE_MAX_ATTEMPTS);
    }
}
