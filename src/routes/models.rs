use axum::{
    extract::{Json, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use crate::{
    engine::nodes::llm::resolve_base_url, responses::JsonResponse,
    routes::auth::session::AuthSession, state::AppState,
};

const LIST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ModelsQuery {
    pub provider: Option<String>,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}

/// Lists model names from an OpenAI-compatible `/models` endpoint.
pub async fn list_models(
    State(app_state): State<AppState>,
    _session: AuthSession,
    Query(query): Query<ModelsQuery>,
) -> Response {
    let base = resolve_base_url(
        query.provider.as_deref(),
        query.base_url.as_deref(),
        &app_state.engine.settings.default_llm_base_url,
    );
    let url = format!("{base}/models");

    let mut request = app_state.http_client.get(&url).timeout(LIST_TIMEOUT);
    if let Some(key) = query.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
        request = request.bearer_auth(key);
    }

    let response = match request.send().await {
        Ok(resp) => resp,
        Err(err) => {
            tracing::warn!(%url, error = %err, "model listing request failed");
            return JsonResponse::bad_gateway("Could not reach model provider").into_response();
        }
    };

    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        tracing::warn!(%url, status = status.as_u16(), "model listing rejected");
        return JsonResponse::bad_gateway(&format!(
            "Model provider returned {}: {}",
            status.as_u16(),
            text
        ))
        .into_response();
    }

    match response.json::<Value>().await {
        Ok(body) => (
            StatusCode::OK,
            Json(json!({ "success": true, "models": model_names(&body) })),
        )
            .into_response(),
        Err(err) => {
            tracing::warn!(%url, error = %err, "model listing was not JSON");
            JsonResponse::bad_gateway("Model provider returned an invalid response").into_response()
        }
    }
}

/// Accepts `{"data":[{"id":..}]}` (OpenAI) and `{"models":[{"name":..}]}` (Ollama).
fn model_names(body: &Value) -> Vec<String> {
    let pick = |list: &str, field: &str| -> Option<Vec<String>> {
        body.get(list)?.as_array().map(|items| {
            items
                .iter()
                .filter_map(|item| item.get(field)?.as_str().map(str::to_string))
                .collect()
        })
    };
    let mut names = pick("data", "id")
        .or_else(|| pick("models", "name"))
        .unwrap_or_default();
    names.sort();
    names.dedup();
    names
}
