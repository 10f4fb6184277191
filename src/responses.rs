use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize)]
pub struct JsonResponse {
    pub status: String,
    pub success: bool,
    pub message: String,
    pub code: Option<String>,
}

impl JsonResponse {
    fn envelope(status: StatusCode, msg: &str, code: Option<&str>) -> impl IntoResponse {
        let ok = status.is_success();
        (
            status,
            Json(JsonResponse {
                status: if ok { "success" } else { "error" }.to_string(),
                success: ok,
                message: msg.to_string(),
                code: code.map(str::to_string),
            }),
        )
    }

    pub fn success(msg: &str) -> impl IntoResponse {
        Self::envelope(StatusCode::OK, msg, None)
    }

    pub fn not_found(msg: &str) -> impl IntoResponse {
        Self::envelope(StatusCode::NOT_FOUND, msg, None)
    }

    pub fn conflict(msg: &str) -> impl IntoResponse {
        Self::envelope(StatusCode::CONFLICT, msg, None)
    }

    pub fn server_error(msg: &str) -> impl IntoResponse {
        Self::envelope(StatusCode::INTERNAL_SERVER_ERROR, msg, None)
    }

    pub fn unauthorized(msg: &str) -> impl IntoResponse {
        Self::envelope(StatusCode::UNAUTHORIZED, msg, None)
    }

    pub fn bad_request(msg: &str) -> impl IntoResponse {
        Self::envelope(StatusCode::BAD_REQUEST, msg, None)
    }

    /// 400 carrying a machine-readable reason, e.g. `invalid_graph`.
    pub fn bad_request_with_code(msg: &str, code: &str) -> impl IntoResponse {
        Self::envelope(StatusCode::BAD_REQUEST, msg, Some(code))
    }

    pub fn too_many_requests(msg: &str) -> impl IntoResponse {
        Self::envelope(StatusCode::TOO_MANY_REQUESTS, msg, None)
    }

    pub fn forbidden(msg: &str) -> impl IntoResponse {
        Self::envelope(StatusCode::FORBIDDEN, msg, None)
    }

    pub fn bad_gateway(msg: &str) -> impl IntoResponse {
        Self::envelope(StatusCode::BAD_GATEWAY, msg, None)
    }
}
