use super::{
    helpers::{caller_id, db_error_response, parse_workflow_id},
    prelude::*,
};
use crate::engine::status::fold_node_statuses;
use crate::utils::pagination::{Page, PageRequest};

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct HistoryParams {
    pub page: Option<u32>,
    #[serde(alias = "per_page")]
    pub per_page: Option<u32>,
}

impl HistoryParams {
    fn page_request(&self) -> Option<PageRequest> {
        if self.page.is_none() && self.per_page.is_none() {
            return None;
        }
        Some(PageRequest::new(self.page, self.per_page))
    }
}

/// Past executions, newest first. Paged only when the caller asks for it.
pub async fn list_executions(
    State(app_state): State<AppState>,
    session: AuthSession,
    Path(workflow_id): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Response {
    let (user_id, workflow_id) = match (caller_id(&session), parse_workflow_id(&workflow_id)) {
        (Ok(u), Ok(w)) => (u, w),
        (Err(resp), _) | (_, Err(resp)) => return resp,
    };

    match app_state
        .workflow_repo
        .find_workflow_by_id(user_id, workflow_id)
        .await
    {
        Ok(Some(_)) => {}
        Ok(None) => return JsonResponse::not_found("Workflow not found").into_response(),
        Err(e) => return db_error_response("Failed to fetch workflow", e),
    }

    let request = params.page_request();
    match app_state
        .workflow_repo
        .list_executions(user_id, workflow_id, request)
        .await
    {
        Ok((executions, total)) => match request {
            Some(request) => {
                (StatusCode::OK, Json(Page::new(executions, total, request))).into_response()
            }
            None => (StatusCode::OK, Json(executions)).into_response(),
        },
        Err(e) => db_error_response("Failed to fetch executions", e),
    }
}

pub async fn get_execution(
    State(app_state): State<AppState>,
    session: AuthSession,
    Path((workflow_id, execution_id)): Path<(String, String)>,
) -> Response {
    let (user_id, workflow_id) = match (caller_id(&session), parse_workflow_id(&workflow_id)) {
        (Ok(u), Ok(w)) => (u, w),
        (Err(resp), _) | (_, Err(resp)) => return resp,
    };
    let Ok(execution_id) = Uuid::parse_str(&execution_id) else {
        return JsonResponse::not_found("Execution not found").into_response();
    };

    match app_state
        .workflow_repo
        .find_execution(user_id, workflow_id, execution_id)
        .await
    {
        Ok(Some(execution)) => {
            let nodes = fold_node_statuses(execution.logs.iter().map(|entry| &entry.data));
            (
                StatusCode::OK,
                Json(json!({
                    "execution": execution,
                    "nodes": nodes,
                })),
            )
                .into_response()
        }
        Ok(None) => JsonResponse::not_found("Execution not found").into_response(),
        Err(e) => db_error_response("Failed to fetch execution", e),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use time::{Duration as TimeDuration, OffsetDateTime};
    use tower::ServiceExt;
    use uuid::Uuid;

    use crate::db::mock_db::{InMemoryWorkflowRepository, MockDb};
    use crate::db::workflow_repository::{MockWorkflowRepository, WorkflowRepository};
    use crate::models::execution::{EventKind, ExecutionStatus, LogData, LogEntry, NewExecution};
    use crate::routes::build_router;
    use crate::state::test_support::{bearer_for, test_config, test_state, test_state_with};

    async fn seed(repo: &InMemoryWorkflowRepository, user_id: Uuid, runs: usize) -> Uuid {
        let workflow = repo
            .create_workflow(user_id, "history", &[], &[])
            .await
            .unwrap();
        let base = OffsetDateTime::now_utc();
        for i in 0..runs {
            let at = base + TimeDuration::seconds(i as i64);
            repo.insert_execution(NewExecution {
                id: Uuid::new_v4(),
                workflow_id: workflow.id,
                user_id,
                timestamp: at,
                input: json!(format!("run {i}")),
                output: Some(format!("out {i}")),
                status: ExecutionStatus::Completed,
                duration_ms: 5,
                error: None,
                logs: vec![
                    LogEntry {
                        timestamp: at,
                        data: LogData::new(EventKind::NodeStart, "n1").with_node_type("input"),
                    },
                    LogEntry {
                        timestamp: at,
                        data: LogData::new(EventKind::NodeComplete, "n1")
                            .with_output(format!("out {i}")),
                    },
                ],
            })
            .await
            .unwrap();
        }
        workflow.id
    }

    async fn get(app: axum::Router, uri: &str, auth: &str) -> (StatusCode, Value) {
        let res = app
            .oneshot(
                Request::builder()
                    .uri(uri)
                    .header(header::AUTHORIZATION, auth)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn plain_history_is_newest_first_array() {
        let user_id = Uuid::new_v4();
        let (state, repo) = test_state();
        let workflow_id = seed(&repo, user_id, 3).await;
        let auth = bearer_for(&state, user_id, "ada");

        let (status, body) = get(
            build_router(state),
            &format!("/api/workflow/{workflow_id}/history"),
            &auth,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let runs = body.as_array().unwrap();
        assert_eq!(runs.len(), 3);
        assert_eq!(runs[0]["input"], "run 2");
        assert_eq!(runs[0]["workflowId"], workflow_id.to_string());
        assert_eq!(runs[0]["logs"][0]["data"]["type"], "node_start");
    }

    #[tokio::test]
    async fn paged_history_returns_envelope() {
        let user_id = Uuid::new_v4();
        let (state, repo) = test_state();
        let workflow_id = seed(&repo, user_id, 5).await;
        let auth = bearer_for(&state, user_id, "ada");

        let (status, body) = get(
            build_router(state),
            &format!("/api/workflow/{workflow_id}/history?page=2&perPage=2"),
            &auth,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 5);
        assert_eq!(body["totalPages"], 3);
        assert_eq!(body["page"], 2);
        let items = body["items"].as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["input"], "run 2");
    }

    #[tokio::test]
    async fn single_execution_includes_folded_statuses() {
        let user_id = Uuid::new_v4();
        let (state, repo) = test_state();
        let workflow_id = seed(&repo, user_id, 1).await;
        let execution_id = repo.executions.lock().unwrap()[0].id;
        let auth = bearer_for(&state, user_id, "ada");
        let app = build_router(state);

        let (status, body) = get(
            app.clone(),
            &format!("/api/workflow/{workflow_id}/history/{execution_id}"),
            &auth,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["execution"]["id"], execution_id.to_string());
        assert_eq!(body["nodes"]["n1"]["status"], "completed");
        assert_eq!(body["nodes"]["n1"]["output"], "out 0");

        let (status, _) = get(
            app,
            &format!("/api/workflow/{workflow_id}/history/{}", Uuid::new_v4()),
            &auth,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn history_of_someone_elses_workflow_is_not_found() {
        let (state, repo) = test_state();
        let workflow_id = seed(&repo, Uuid::new_v4(), 1).await;
        let auth = bearer_for(&state, Uuid::new_v4(), "mallory");

        let (status, _) = get(
            build_router(state),
            &format!("/api/workflow/{workflow_id}/history"),
            &auth,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn database_errors_surface_as_500() {
        let mut repo = MockWorkflowRepository::new();
        repo.expect_find_workflow_by_id()
            .returning(|_, _| Err(sqlx::Error::PoolTimedOut));
        let state = test_state_with(Arc::new(MockDb::default()), Arc::new(repo), test_config());
        let auth = bearer_for(&state, Uuid::new_v4(), "ada");

        let (status, body) = get(
            build_router(state),
            &format!("/api/workflow/{}/history", Uuid::new_v4()),
            &auth,
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], false);
    }
}
