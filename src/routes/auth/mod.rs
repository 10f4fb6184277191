pub mod claims;
pub mod login;
pub mod register;
pub mod session;

pub use login::handle_login;
pub use register::handle_register;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::models::user::User;
use crate::responses::JsonResponse;
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
    pub message: String,
}

/// Signs a session token for `user` and wraps it in the auth response body.
pub(crate) fn token_response(state: &AppState, user: &User, status: StatusCode, message: &str) -> Response {
    match state
        .jwt_keys
        .issue_token(user.id, &user.username, state.config.token_ttl)
    {
        Ok(token) => (
            status,
            Json(TokenResponse {
                token,
                message: message.to_string(),
            }),
        )
            .into_response(),
        Err(err) => {
            tracing::error!(error = %err, user_id = %user.id, "token generation failed");
            JsonResponse::server_error("Token generation failed").into_response()
        }
    }
}
