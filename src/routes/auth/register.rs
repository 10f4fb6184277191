use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::utils::password::{hash_password, MIN_PASSWORD_LENGTH};
use crate::{responses::JsonResponse, state::AppState};

use super::token_response;

const MAX_USERNAME_LENGTH: usize = 64;

#[derive(Deserialize, Serialize)]
pub struct RegisterPayload {
    pub username: String,
    pub password: String,
    #[serde(default, rename = "registrationCode", alias = "registration_code")]
    pub registration_code: Option<String>,
}

pub async fn handle_register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterPayload>,
) -> Response {
    let username = payload.username.trim();
    if username.is_empty() || username.chars().count() > MAX_USERNAME_LENGTH {
        return JsonResponse::bad_request("Username must be between 1 and 64 characters")
            .into_response();
    }
    if payload.password.chars().count() < MIN_PASSWORD_LENGTH {
        return JsonResponse::bad_request("Password must be at least 6 characters")
            .into_response();
    }

    if let Some(expected) = state.config.registration_code.as_deref() {
        if payload.registration_code.as_deref().map(str::trim) != Some(expected) {
            return JsonResponse::forbidden("Invalid registration code").into_response();
        }
    }

    match state.db.is_username_taken(username).await {
        Ok(true) => return JsonResponse::conflict("User already registered").into_response(),
        Ok(false) => {}
        Err(e) => {
            tracing::error!(error = ?e, "username lookup failed");
            return JsonResponse::server_error("Database error").into_response();
        }
    }

    let password_hash = match hash_password(&payload.password) {
        Ok(hash) => hash,
        Err(_) => return JsonResponse::server_error("Password hashing failed").into_response(),
    };

    let user = match state.db.create_user(username, &password_hash).await {
        Ok(user) => user,
        // Lost a race against a concurrent registration of the same name.
        Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
            return JsonResponse::conflict("User already registered").into_response();
        }
        Err(e) => {
            tracing::error!(error = ?e, "failed to insert user");
            return JsonResponse::server_error("Could not create user").into_response();
        }
    };

    tracing::info!(user_id = %user.id, "registered user");
    token_response(&state, &user, StatusCode::OK, "Registration successful")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        extract::Request,
        http::StatusCode,
        routing::post,
        Router,
    };
    use serde_json::json;
    use tower::ServiceExt;

    use super::handle_register;
    use crate::{
        config::Config,
        db::mock_db::{InMemoryWorkflowRepository, MockDb},
        routes::auth::TokenResponse,
        state::test_support::{test_config, test_state_with},
    };

    fn build_app(db: MockDb, config: Config) -> (Router, Arc<MockDb>) {
        let db = Arc::new(db);
        let state = test_state_with(
            db.clone(),
            Arc::new(InMemoryWorkflowRepository::default()),
            config,
        );
        let app = Router::new()
            .route("/register", post(handle_register))
            .with_state(state);
        (app, db)
    }

    fn register_request(body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/register")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_register_success_stores_hashed_password() {
        let (app, db) = build_app(MockDb::default(), test_config());

        let res = app
            .oneshot(register_request(json!({ "username": "ada", "password": "secret1" })))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let json: TokenResponse = serde_json::from_slice(&body).unwrap();
        assert!(!json.token.is_empty());

        let users = db.users.lock().unwrap();
        assert_eq!(users.len(), 1);
        assert_ne!(users[0].password_hash, "secret1");
    }

    #[tokio::test]
    async fn test_register_rejects_short_password() {
        let (app, _) = build_app(MockDb::default(), test_config());
        let res = app
            .oneshot(register_request(json!({ "username": "ada", "password": "12345" })))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_register_conflict_on_existing_user() {
        let (app, _) = build_app(MockDb::with_user("ada", "hash"), test_config());
        let res = app
            .oneshot(register_request(json!({ "username": "ADA", "password": "secret1" })))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_register_requires_configured_code() {
        let mut config = test_config();
        config.registration_code = Some("letmein".into());

        let (app, _) = build_app(MockDb::default(), config.clone());
        let res = app
            .oneshot(register_request(json!({
                "username": "ada",
                "password": "secret1",
                "registrationCode": "wrong"
            })))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);

        let (app, _) = build_app(MockDb::default(), config);
        let res = app
            .oneshot(register_request(json!({
                "username": "ada",
                "password": "secret1",
                "registration_code": "letmein"
            })))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }
}
