use std::collections::{BTreeMap, HashSet};

use serde::Serialize;

use crate::models::execution::{EventKind, LogData};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NodeRunState {
    #[default]
    Idle,
    Running,
    Completed,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct NodeStatus {
    pub status: NodeRunState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Folds a flat event log into the latest status of every node it mentions.
///
/// A node only reaches `completed` after a `node_start` was seen for it.
pub fn fold_node_statuses<'a, I>(events: I) -> BTreeMap<String, NodeStatus>
where
    I: IntoIterator<Item = &'a LogData>,
{
    let mut statuses: BTreeMap<String, NodeStatus> = BTreeMap::new();
    let mut started: HashSet<String> = HashSet::new();

    for event in events {
        let status = statuses.entry(event.node_id.clone()).or_default();
        match event.kind {
            EventKind::NodeStart => {
                started.insert(event.node_id.clone());
                *status = NodeStatus {
                    status: NodeRunState::Running,
                    ..NodeStatus::default()
                };
            }
            EventKind::NodeComplete => {
                if started.contains(&event.node_id) {
                    status.status = NodeRunState::Completed;
                    if event.output.is_some() {
                        status.output = event.output.clone();
                    }
                }
            }
            EventKind::NodeError => {
                status.status = NodeRunState::Error;
                status.error = event.error.clone();
            }
            EventKind::AiResponseChunk => {
                if let Some(chunk) = &event.data {
                    status.output.get_or_insert_with(String::new).push_str(chunk);
                }
            }
            EventKind::AiResponseComplete => {
                if status.status == NodeRunState::Running {
                    status.status = NodeRunState::Completed;
                }
            }
            EventKind::Output => {
                if let Some(output) = event.output.as_ref().or(event.data.as_ref()) {
                    status.output = Some(output.clone());
                }
            }
            EventKind::Input => {}
        }
    }

    statuses
}
