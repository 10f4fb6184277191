use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    NodeStart,
    NodeComplete,
    NodeError,
    AiResponseChunk,
    AiResponseComplete,
    Input,
    Output,
}

/// One progress event. This is both the SSE payload and the `data` half of a
/// stored log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogData {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub node_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_chunks: Option<usize>,
}

impl LogData {
    pub fn new(kind: EventKind, node_id: impl Into<String>) -> Self {
        Self {
            kind,
            node_id: node_id.into(),
            node_type: None,
            data: None,
            output: None,
            error: None,
            total_chunks: None,
        }
    }

    pub fn with_node_type(mut self, node_type: impl Into<String>) -> Self {
        self.node_type = Some(node_type.into());
        self
    }

    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = Some(data.into());
        self
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_total_chunks(mut self, total: usize) -> Self {
        self.total_chunks = Some(total);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub data: LogData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Completed,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, FromRow, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    pub id: Uuid,
    pub workflow_id: Uuid,
    #[serde(skip_serializing, default)]
    pub user_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub input: Value,
    pub output: Option<String>,
    pub status: String,
    pub duration: Option<i64>,
    pub error: Option<String>,
    #[sqlx(json)]
    pub logs: Vec<LogEntry>,
}

/// A finished run waiting to be written to the history store.
#[derive(Debug, Clone)]
pub struct NewExecution {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub user_id: Uuid,
    pub timestamp: OffsetDateTime,
    pub input: Value,
    pub output: Option<String>,
    pub status: ExecutionStatus,
    pub duration_ms: i64,
    pub error: Option<String>,
    pub logs: Vec<LogEntry>,
}
