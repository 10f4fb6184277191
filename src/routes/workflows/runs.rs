use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use super::{
    helpers::{caller_id, db_error_response, graph_error_response, parse_workflow_id},
    prelude::*,
};
use crate::engine::status::fold_node_statuses;
use crate::engine::{
    execute_workflow, record_execution_with_retry, RunOutcome, RunRecorder, RunUpdate,
};
use crate::models::workflow::{WorkflowEdge, WorkflowNode};
use crate::utils::sse::DONE_SENTINEL;

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(10);

/// An editor graph run without saving it first.
#[derive(Deserialize)]
pub struct RunGraphPayload {
    #[serde(default)]
    pub nodes: Vec<WorkflowNode>,
    #[serde(default)]
    pub edges: Vec<WorkflowEdge>,
    #[serde(default)]
    pub input: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct RunParams {
    pub input: Option<String>,
    #[serde(default)]
    pub sync: bool,
}

#[derive(Deserialize)]
struct RunBody {
    #[serde(default)]
    input: Option<Value>,
}

/// Where a finished run gets written, if anywhere.
#[derive(Clone, Copy)]
struct HistoryTarget {
    workflow_id: Uuid,
    user_id: Uuid,
}

/// Starts the run on its own task so it completes (and is recorded) even
/// when the caller disconnects. Waits for a free run slot first.
fn spawn_run(
    state: &AppState,
    graph: Graph,
    input: String,
    history: Option<HistoryTarget>,
    live: Option<UnboundedSender<RunUpdate>>,
) -> JoinHandle<RunOutcome> {
    let env = state.engine.clone();
    let slots = state.run_slots.clone();
    let repo = state.workflow_repo.clone();
    let run_id = Uuid::new_v4();

    tokio::spawn(async move {
        let _permit = match slots.acquire_owned().await {
            Ok(permit) => Some(permit),
            Err(_) => {
                tracing::warn!(%run_id, "run semaphore closed; running without a slot");
                None
            }
        };

        let recorder = RunRecorder::new(run_id, live.clone());
        let outcome = execute_workflow(&env, &graph, &input, recorder).await;

        if let Some(HistoryTarget {
            workflow_id,
            user_id,
        }) = history
        {
            let execution =
                outcome
                    .clone()
                    .into_execution(workflow_id, user_id, Value::String(input.clone()));
            if let Err(err) = record_execution_with_retry(repo, execution).await {
                tracing::error!(%run_id, %workflow_id, error = %err, "execution history lost");
            }
        }

        if let Some(tx) = live {
            let _ = tx.send(RunUpdate::Done);
        }
        outcome
    })
}

fn sse_response(mut rx: UnboundedReceiver<RunUpdate>) -> Response {
    let s = stream! {
        while let Some(update) = rx.recv().await {
            match update {
                RunUpdate::Log(data) => match Event::default().json_data(&data) {
                    Ok(ev) => yield Ok::<Event, Infallible>(ev),
                    Err(err) => tracing::warn!(error = %err, node_id = %data.node_id, "dropping unserializable event"),
                },
                RunUpdate::Done => break,
            }
        }
        yield Ok::<Event, Infallible>(Event::default().data(DONE_SENTINEL));
    };

    Sse::new(s)
        .keep_alive(
            KeepAlive::new()
                .interval(KEEP_ALIVE_INTERVAL)
                .text("keep-alive"),
        )
        .into_response()
}

fn run_summary(outcome: &RunOutcome) -> Value {
    let statuses = fold_node_statuses(outcome.logs.iter().map(|entry| &entry.data));
    json!({
        "success": outcome.error.is_none(),
        "executionId": outcome.run_id,
        "status": outcome.status,
        "output": outcome.output,
        "error": outcome.error,
        "duration": outcome.duration_ms,
        "nodes": statuses,
        "logs": outcome.logs,
    })
}

/// `POST /api/workflow/run`: streams a run of the posted graph. Not recorded.
pub async fn run_unsaved_workflow(
    State(app_state): State<AppState>,
    session: AuthSession,
    Json(payload): Json<RunGraphPayload>,
) -> Response {
    if let Err(resp) = caller_id(&session) {
        return resp;
    }

    let graph = match Graph::build(payload.nodes, payload.edges) {
        Ok(graph) => graph,
        Err(err) => return graph_error_response(err),
    };

    let (tx, rx) = mpsc::unbounded_channel();
    spawn_run(
        &app_state,
        graph,
        payload.input.unwrap_or_default(),
        None,
        Some(tx),
    );
    sse_response(rx)
}

/// `GET|POST /api/workflow/:id/run`: runs a saved workflow and records it.
///
/// Input comes from a JSON `{input}` body or the `input` query parameter.
/// With `sync=true` the response is a JSON summary once the run finishes.
pub async fn run_saved_workflow(
    State(app_state): State<AppState>,
    session: AuthSession,
    Path(workflow_id): Path<String>,
    Query(params): Query<RunParams>,
    body: Bytes,
) -> Response {
    let (user_id, workflow_id) = match (caller_id(&session), parse_workflow_id(&workflow_id)) {
        (Ok(u), Ok(w)) => (u, w),
        (Err(resp), _) | (_, Err(resp)) => return resp,
    };

    let body_input = if body.iter().all(u8::is_ascii_whitespace) {
        None
    } else {
        match serde_json::from_slice::<RunBody>(&body) {
            Ok(parsed) => parsed.input.map(|value| match value {
                Value::String(s) => s,
                other => other.to_string(),
            }),
            Err(err) => {
                return JsonResponse::bad_request(&format!("Invalid request body: {err}"))
                    .into_response()
            }
        }
    };
    let input = body_input.or(params.input).unwrap_or_default();

    let workflow = match app_state
        .workflow_repo
        .find_workflow_by_id(user_id, workflow_id)
        .await
    {
        Ok(Some(workflow)) => workflow,
        Ok(None) => return JsonResponse::not_found("Workflow not found").into_response(),
        Err(e) => return db_error_response("Failed to fetch workflow", e),
    };

    let graph = match Graph::build(workflow.nodes, workflow.edges) {
        Ok(graph) => graph,
        Err(err) => return graph_error_response(err),
    };

    let history = Some(HistoryTarget {
        workflow_id,
        user_id,
    });

    if params.sync {
        return match spawn_run(&app_state, graph, input, history, None).await {
            Ok(outcome) => (StatusCode::OK, Json(run_summary(&outcome))).into_response(),
            Err(err) => {
                tracing::error!(%workflow_id, error = %err, "run task failed");
                JsonResponse::server_error("Workflow run failed").into_response()
            }
        };
    }

    let (tx, rx) = mpsc::unbounded_channel();
    spawn_run(&app_state, graph, input, history, Some(tx));
    sse_response(rx)
}
