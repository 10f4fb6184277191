//! Runs a saved workflow against a running server and prints node progress.
//!
//! Usage: `flowline-run <workflow-id> [input]` with `FLOWLINE_API_URL`
//! (default `http://localhost:3000`) and `FLOWLINE_TOKEN` in the environment.

use std::env;

use anyhow::{bail, Context, Result};
use futures::StreamExt;
use serde_json::json;

use flowline_backend::engine::status::{fold_node_statuses, NodeRunState};
use flowline_backend::models::execution::{EventKind, LogData};
use flowline_backend::utils::sse::{RunStreamDecoder, RunStreamItem};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let mut args = env::args().skip(1);
    let Some(workflow_id) = args.next() else {
        bail!("usage: flowline-run <workflow-id> [input]");
    };
    let input = args.next().unwrap_or_default();

    let base = env::var("FLOWLINE_API_URL").unwrap_or_else(|_| "http://localhost:3000".into());
    let token = env::var("FLOWLINE_TOKEN").context("FLOWLINE_TOKEN must be set")?;
    let url = format!("{}/api/workflow/{}/run", base.trim_end_matches('/'), workflow_id);

    let response = reqwest::Client::new()
        .post(&url)
        .bearer_auth(token)
        .json(&json!({ "input": input }))
        .send()
        .await
        .with_context(|| format!("failed to reach {url}"))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        bail!("server returned {status}: {body}");
    }

    let mut decoder = RunStreamDecoder::new();
    let mut events: Vec<LogData> = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.context("stream interrupted")?;
        for item in decoder.feed(&chunk) {
            if let RunStreamItem::Event(data) = item {
                print_event(&data);
                events.push(data);
            }
        }
        if decoder.is_done() {
            break;
        }
    }
    for item in decoder.finish() {
        if let RunStreamItem::Event(data) = item {
            print_event(&data);
            events.push(data);
        }
    }

    println!();
    let statuses = fold_node_statuses(&events);
    let mut failed = false;
    for (node_id, status) in &statuses {
        let label = match status.status {
            NodeRunState::Idle => "idle",
            NodeRunState::Running => "running",
            NodeRunState::Completed => "completed",
            NodeRunState::Error => {
                failed = true;
                "error"
            }
        };
        match (&status.output, &status.error) {
            (_, Some(err)) => println!("{node_id:<20} {label:<10} {err}"),
            (Some(out), None) => println!("{node_id:<20} {label:<10} {}", one_line(out)),
            (None, None) => println!("{node_id:<20} {label}"),
        }
    }

    if !decoder.is_done() {
        bail!("stream ended before the run finished");
    }
    if failed {
        bail!("workflow run failed");
    }
    Ok(())
}

fn print_event(data: &LogData) {
    match data.kind {
        EventKind::AiResponseChunk => {
            if let Some(chunk) = &data.data {
                eprint!("{chunk}");
            }
        }
        EventKind::NodeStart => eprintln!(
            "> {} ({})",
            data.node_id,
            data.node_type.as_deref().unwrap_or("?")
        ),
        EventKind::NodeError => eprintln!(
            "! {}: {}",
            data.node_id,
            data.error.as_deref().unwrap_or("unknown error")
        ),
        _ => {}
    }
}

fn one_line(text: &str) -> String {
    let flat = text.replace('\n', " ");
    if flat.chars().count() > 80 {
        format!("{}…", flat.chars().take(79).collect::<String>())
    } else {
        flat
    }
}
