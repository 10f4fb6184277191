use super::{
    helpers::{caller_id, db_error_response, graph_error_response, parse_workflow_id},
    prelude::*,
};

/// Creates the workflow when the body carries no `id`, replaces it otherwise.
pub async fn save_workflow(
    State(app_state): State<AppState>,
    session: AuthSession,
    Json(payload): Json<SaveWorkflow>,
) -> Response {
    let user_id = match caller_id(&session) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let name = payload.name.trim();
    if name.is_empty() {
        return JsonResponse::bad_request("Workflow name is required").into_response();
    }

    if let Err(err) = Graph::build(payload.nodes.clone(), payload.edges.clone()) {
        return graph_error_response(err);
    }

    let repo = &app_state.workflow_repo;
    match payload.id {
        Some(workflow_id) => {
            match repo
                .update_workflow(user_id, workflow_id, name, &payload.nodes, &payload.edges)
                .await
            {
                Ok(Some(workflow)) => (StatusCode::OK, Json(workflow)).into_response(),
                Ok(None) => JsonResponse::not_found("Workflow not found").into_response(),
                Err(e) => db_error_response("Failed to update workflow", e),
            }
        }
        None => match repo
            .create_workflow(user_id, name, &payload.nodes, &payload.edges)
            .await
        {
            Ok(workflow) => {
                tracing::info!(%user_id, workflow_id = %workflow.id, "created workflow");
                (StatusCode::CREATED, Json(workflow)).into_response()
            }
            Err(e) => db_error_response("Failed to create workflow", e),
        },
    }
}

pub async fn list_workflows(State(app_state): State<AppState>, session: AuthSession) -> Response {
    let user_id = match caller_id(&session) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match app_state.workflow_repo.list_workflows_by_user(user_id).await {
        Ok(workflows) => (StatusCode::OK, Json(workflows)).into_response(),
        Err(e) => db_error_response("Failed to fetch workflows", e),
    }
}

pub async fn get_workflow(
    State(app_state): State<AppState>,
    session: AuthSession,
    Path(workflow_id): Path<String>,
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
        Ok(Some(workflow)) => (StatusCode::OK, Json(workflow)).into_response(),
        Ok(None) => JsonResponse::not_found("Workflow not found").into_response(),
        Err(e) => db_error_response("Failed to fetch workflow", e),
    }
}

pub async fn rename_workflow(
    State(app_state): State<AppState>,
    session: AuthSession,
    Path(workflow_id): Path<String>,
    Json(payload): Json<RenameWorkflow>,
) -> Response {
    let (user_id, workflow_id) = match (caller_id(&session), parse_workflow_id(&workflow_id)) {
        (Ok(u), Ok(w)) => (u, w),
        (Err(resp), _) | (_, Err(resp)) => return resp,
    };

    let name = payload.name.trim();
    if name.is_empty() {
        return JsonResponse::bad_request("Workflow name is required").into_response();
    }

    match app_state
        .workflow_repo
        .rename_workflow(user_id, workflow_id, name)
        .await
    {
        Ok(Some(workflow)) => (StatusCode::OK, Json(workflow)).into_response(),
        Ok(None) => JsonResponse::not_found("Workflow not found").into_response(),
        Err(e) => db_error_response("Failed to rename workflow", e),
    }
}

pub async fn delete_workflow(
    State(app_state): State<AppState>,
    session: AuthSession,
    Path(workflow_id): Path<String>,
) -> Response {
    let (user_id, workflow_id) = match (caller_id(&session), parse_workflow_id(&workflow_id)) {
        (Ok(u), Ok(w)) => (u, w),
        (Err(resp), _) | (_, Err(resp)) => return resp,
    };

    match app_state
        .workflow_repo
        .delete_workflow(user_id, workflow_id)
        .await
    {
        Ok(true) => JsonResponse::success("Workflow deleted").into_response(),
        Ok(false) => JsonResponse::not_found("Workflow not found").into_response(),
        Err(e) => db_error_response("Failed to delete workflow", e),
    }
}
