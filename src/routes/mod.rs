pub mod auth;
pub mod models;
pub mod workflows;

use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderValue, Method};
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use auth::{handle_login, handle_register};
use models::list_models;
use workflows::{
    delete_workflow, get_execution, get_workflow, list_executions, list_workflows,
    rename_workflow, run_saved_workflow, run_unsaved_workflow, save_workflow,
};

/// Login and registration. Kept separate so the binary can rate limit them.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(handle_login))
        .route("/register", post(handle_register))
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/workflows", get(list_workflows))
        .route("/workflow", post(save_workflow))
        .route("/workflow/run", post(run_unsaved_workflow))
        .route(
            "/workflow/{id}",
            get(get_workflow).put(rename_workflow).delete(delete_workflow),
        )
        .route(
            "/workflow/{id}/run",
            get(run_saved_workflow).post(run_saved_workflow),
        )
        .route("/workflow/{id}/history", get(list_executions))
        .route("/workflow/{id}/history/{execution_id}", get(get_execution))
        .route("/models", get(list_models))
}

fn cors_layer(frontend_origin: Option<&str>) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE]);

    match frontend_origin.and_then(|origin| origin.parse::<HeaderValue>().ok()) {
        Some(origin) => cors.allow_origin(origin),
        None => cors.allow_origin(Any),
    }
}

/// Assembles `/api` around a caller-supplied auth router.
pub fn router_with_auth(state: AppState, auth: Router<AppState>) -> Router {
    let cors = cors_layer(state.config.frontend_origin.as_deref());

    Router::new()
        .nest("/api", api_routes().merge(auth))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub fn build_router(state: AppState) -> Router {
    router_with_auth(state, auth_routes())
}
