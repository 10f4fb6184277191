use super::prelude::*;

pub(crate) fn caller_id(session: &AuthSession) -> Result<Uuid, Response> {
    session
        .user_id()
        .ok_or_else(|| JsonResponse::unauthorized("Invalid user ID").into_response())
}

pub(crate) fn parse_workflow_id(raw: &str) -> Result<Uuid, Response> {
    Uuid::parse_str(raw).map_err(|_| JsonResponse::not_found("Workflow not found").into_response())
}

pub(crate) fn graph_error_response(err: GraphError) -> Response {
    JsonResponse::bad_request_with_code(&err.to_string(), "invalid_graph").into_response()
}

pub(crate) fn db_error_response(context: &str, err: sqlx::Error) -> Response {
    tracing::error!(error = ?err, "{context}");
    JsonResponse::server_error(context).into_response()
}
