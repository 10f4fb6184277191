use futures::StreamExt;
use serde_json::{json, Value};
use tracing::debug;

use super::NodeContext;
use crate::models::execution::EventKind;
use crate::utils::sse::{SseDecoder, SseFrame, DONE_SENTINEL};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";

/// Picks the API base: explicit URL, then the provider's well-known one, then `fallback`.
pub fn resolve_base_url(provider: Option<&str>, base_url: Option<&str>, fallback: &str) -> String {
    let chosen = match (base_url.map(str::trim).filter(|u| !u.is_empty()), provider) {
        (Some(url), _) => url,
        (None, Some(p)) if p.eq_ignore_ascii_case("openai") => OPENAI_BASE_URL,
        (None, Some(p)) if p.eq_ignore_ascii_case("ollama") => OLLAMA_BASE_URL,
        (None, _) => fallback,
    };
    chosen.trim_end_matches('/').to_string()
}

pub(super) async fn run(ctx: &mut NodeContext<'_>) -> Result<String, String> {
    let node = ctx.node;
    let settings = &ctx.env.settings;
    let base_url = resolve_base_url(
        node.config_str("provider").as_deref(),
        node.config_str("baseUrl").as_deref(),
        &settings.default_llm_base_url,
    );
    let model = node
        .config_str("model")
        .unwrap_or_else(|| settings.default_llm_model.clone());
    let prompt = node
        .config_str("prompt")
        .unwrap_or_else(|| ctx.input.to_string());

    let mut messages = Vec::new();
    if let Some(system) = node.config_str("systemPrompt") {
        messages.push(json!({"role": "system", "content": system}));
    }
    messages.push(json!({"role": "user", "content": prompt}));
    let mut body = json!({"model": model, "messages": messages, "stream": true});
    if let Some(temperature) = node.config.get("temperature").and_then(Value::as_f64) {
        body["temperature"] = json!(temperature);
    }

    let mut request = ctx
        .env
        .http
        .post(format!("{base_url}/chat/completions"))
        .json(&body);
    if let Some(key) = node.config_str("apiKey") {
        request = request.bearer_auth(key);
    }

    debug!(node_id = %node.id, %base_url, %model, "calling chat completions");
    let resp = request
        .send()
        .await
        .map_err(|e| format!("LLM request failed: {e}"))?;
    let status = resp.status();
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        return Err(format!("LLM provider returned {}: {}", status.as_u16(), text));
    }

    let is_json = resp
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"));

    let mut stream = StreamState::default();
    if is_json {
        let payload: Value = resp
            .json()
            .await
            .map_err(|e| format!("Invalid LLM response: {e}"))?;
        let content = payload
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .unwrap_or_default();
        stream.push(ctx, content);
    } else {
        let mut decoder = SseDecoder::new();
        let mut bytes = resp.bytes_stream();
        'read: while let Some(chunk) = bytes.next().await {
            let chunk = chunk.map_err(|e| format!("LLM stream interrupted: {e}"))?;
            for frame in decoder.feed(&chunk) {
                if stream.apply(ctx, &frame)? {
                    break 'read;
                }
            }
        }
        if let Some(frame) = decoder.finish() {
            stream.apply(ctx, &frame)?;
        }
    }

    let event = ctx
        .event(EventKind::AiResponseComplete)
        .with_total_chunks(stream.chunks);
    ctx.emit(event);
    Ok(stream.text)
}

#[derive(Default)]
struct StreamState {
    text: String,
    chunks: usize,
}

impl StreamState {
    fn push(&mut self, ctx: &mut NodeContext<'_>, content: &str) {
        if content.is_empty() {
            return;
        }
        self.text.push_str(content);
        self.chunks += 1;
        let event = ctx.event(EventKind::AiResponseChunk).with_data(content);
        ctx.emit(event);
    }

    /// Returns `true` once the provider signalled the end of the stream.
    fn apply(&mut self, ctx: &mut NodeContext<'_>, frame: &SseFrame) -> Result<bool, String> {
        let data = frame.data.trim();
        if data == DONE_SENTINEL {
            return Ok(true);
        }
        let payload: Value =
            serde_json::from_str(data).map_err(|e| format!("Invalid LLM stream frame: {e}"))?;
        if let Some(err) = payload.get("error") {
            let message = err
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| err.to_string());
            return Err(format!("LLM provider error: {message}"));
        }
        if let Some(content) = payload
            .pointer("/choices/0/delta/content")
            .and_then(Value::as_str)
        {
            self.push(ctx, content);
        }
        Ok(false)
    }
}
