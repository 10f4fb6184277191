use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use serde_json::Value;
use tracing::warn;

use super::NodeContext;

const DEFAULT_TIMEOUT_MS: u64 = 30_000;
const RETRY_STEP_MS: u64 = 250;

pub(super) async fn run(ctx: &mut NodeContext<'_>) -> Result<String, String> {
    let url = ctx
        .node
        .config_str("url")
        .ok_or_else(|| "HTTP url is required".to_string())?;
    let parsed = reqwest::Url::parse(&url).map_err(|e| format!("Invalid url `{url}`: {e}"))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err("Only http/https schemes are allowed".to_string());
    }

    let method_raw = ctx
        .node
        .config_str("method")
        .unwrap_or_else(|| "GET".to_string())
        .to_uppercase();
    let method = Method::from_bytes(method_raw.as_bytes())
        .map_err(|_| format!("Unsupported HTTP method `{method_raw}`"))?;
    let headers = parse_headers(ctx.node.config.get("headers"))?;
    let body = ctx.node.config_str("body");
    let timeout_ms = ctx.node.config_u64("timeoutMs").unwrap_or(DEFAULT_TIMEOUT_MS);
    let retries = ctx.node.config_u64("retries").unwrap_or(0);

    let mut attempt = 0u64;
    loop {
        attempt += 1;
        let mut request = ctx
            .env
            .http
            .request(method.clone(), parsed.clone())
            .headers(headers.clone())
            .timeout(Duration::from_millis(timeout_ms));
        if let Some(body) = &body {
            if !matches!(method, Method::GET | Method::HEAD) {
                request = request.body(body.clone());
            }
        }

        let failure = match request.send().await {
            Ok(resp) => {
                let status = resp.status();
                let text = resp.text().await.map_err(|e| e.to_string())?;
                if status.is_success() {
                    ctx.emit_output(&text);
                    return Ok(text);
                }
                let failure = format!("HTTP {}: {}", status.as_u16(), text);
                if !status.is_server_error() {
                    return Err(failure);
                }
                failure
            }
            Err(err) => err.to_string(),
        };

        if attempt > retries {
            return Err(failure);
        }
        warn!(node_id = %ctx.node.id, attempt, error = %failure, "http request failed; retrying");
        tokio::time::sleep(Duration::from_millis(RETRY_STEP_MS * attempt)).await;
    }
}

/// Accepts either a JSON object or `Key: Value` lines.
fn parse_headers(raw: Option<&Value>) -> Result<HeaderMap, String> {
    let mut pairs: Vec<(String, String)> = Vec::new();
    match raw {
        None | Some(Value::Null) => {}
        Some(Value::Object(map)) => {
            for (k, v) in map {
                let value = match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                pairs.push((k.clone(), value));
            }
        }
        Some(Value::String(text)) => {
            let trimmed = text.trim();
            if trimmed.starts_with('{') {
                let parsed: Value = serde_json::from_str(trimmed)
                    .map_err(|e| format!("Invalid headers JSON: {e}"))?;
                return parse_headers(Some(&parsed));
            }
            for line in trimmed.lines().map(str::trim).filter(|l| !l.is_empty()) {
                let (k, v) = line
                    .split_once(':')
                    .ok_or_else(|| format!("Invalid header line `{line}`"))?;
                pairs.push((k.trim().to_string(), v.trim().to_string()));
            }
        }
        Some(other) => return Err(format!("Unsupported headers value: {other}")),
    }

    let mut headers = HeaderMap::new();
    for (k, v) in pairs {
        let name = HeaderName::try_from(k.as_str()).map_err(|_| format!("Invalid header name `{k}`"))?;
        let value = HeaderValue::from_str(&v).map_err(|_| format!("Invalid value for header `{k}`"))?;
        headers.append(name, value);
    }
    Ok(headers)
}
