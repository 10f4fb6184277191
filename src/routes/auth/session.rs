use axum::{
    extract::{FromRequestParts, Query},
    http::request::Parts,
    response::{IntoResponse, Response},
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::responses::JsonResponse;
use crate::routes::auth::claims::Claims;
use crate::utils::jwt::JwtKeyProvider;

/// Authenticated caller. The token comes from `Authorization: Bearer` or,
/// for EventSource clients that cannot set headers, a `token` query parameter.
#[derive(Debug, PartialEq)]
pub struct AuthSession(pub Claims);

impl AuthSession {
    pub fn user_id(&self) -> Option<Uuid> {
        self.0.user_id()
    }
}

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

impl<S> FromRequestParts<S> for AuthSession
where
    S: JwtKeyProvider + Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let header_token = TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
            .await
            .ok()
            .map(|TypedHeader(auth)| auth.token().to_string());

        let token = match header_token {
            Some(token) => token,
            None => Query::<TokenQuery>::try_from_uri(&parts.uri)
                .ok()
                .and_then(|Query(q)| q.token)
                .filter(|t| !t.is_empty())
                .ok_or_else(|| JsonResponse::unauthorized("Missing token").into_response())?,
        };

        let claims = state.jwt_keys().verify(&token).map_err(|err| {
            tracing::debug!(error = %err, "rejected bearer token");
            JsonResponse::unauthorized("Invalid or expired token").into_response()
        })?;

        if claims.user_id().is_none() {
            return Err(JsonResponse::unauthorized("Invalid user ID").into_response());
        }

        Ok(AuthSession(claims))
    }
}
