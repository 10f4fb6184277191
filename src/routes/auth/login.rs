use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::{responses::JsonResponse, state::AppState, utils::password::verify_password};

use super::token_response;

#[derive(Deserialize, Serialize)]
pub struct LoginPayload {
    pub username: String,
    pub password: String,
}

pub async fn handle_login(
    State(app_state): State<AppState>,
    Json(payload): Json<LoginPayload>,
) -> Response {
    let username = payload.username.trim();
    if username.is_empty() || payload.password.is_empty() {
        return JsonResponse::bad_request("Username and password are required").into_response();
    }

    let user = match app_state.db.find_user_by_username(username).await {
        Ok(Some(record)) => record,
        Ok(None) => return JsonResponse::unauthorized("Invalid credentials").into_response(),
        Err(e) => {
            tracing::error!(error = ?e, "user lookup failed");
            return JsonResponse::server_error("Database error").into_response();
        }
    };

    match verify_password(&payload.password, &user.password_hash) {
        Ok(true) => token_response(&app_state, &user, StatusCode::OK, "Login successful"),
        Ok(false) => JsonResponse::unauthorized("Invalid credentials").into_response(),
        Err(e) => {
            tracing::error!(error = %e, user_id = %user.id, "password verification error");
            JsonResponse::server_error("Internal error").into_response()
        }
    }
}
