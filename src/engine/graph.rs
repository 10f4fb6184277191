use std::collections::{HashMap, VecDeque};

use thiserror::Error;

use crate::models::workflow::{WorkflowEdge, WorkflowNode};

pub const SUPPORTED_NODE_TYPES: &[&str] = &[
    "input",
    "ai-model",
    "condition",
    "output",
    "http-request",
    "lua-script",
    "postgresql",
    "read-file",
    "write-file",
];

/// Branch labels exposed by every condition node, whatever its config.
pub const BRANCH_LABELS: [&str; 2] = ["true", "false"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("duplicate node id `{0}`")]
    DuplicateNode(String),
    #[error("node `{node_id}` has unsupported type `{kind}`")]
    UnsupportedNodeType { node_id: String, kind: String },
    #[error("edge {edge} references unknown node `{node_id}`")]
    UnknownEdgeEndpoint { edge: String, node_id: String },
    #[error("condition node `{node_id}` has invalid branch label `{label}`")]
    InvalidBranchLabel { node_id: String, label: String },
    #[error("condition node `{node_id}` has more than one `{label}` branch")]
    DuplicateBranch { node_id: String, label: String },
    #[error("workflow graph contains a cycle")]
    Cycle,
}

#[derive(Debug, Clone)]
pub struct Graph {
    nodes: Vec<WorkflowNode>,
    index: HashMap<String, usize>,
    edges: Vec<WorkflowEdge>,
    edges_out: HashMap<String, Vec<usize>>, // source -> edge indices
    edges_in: HashMap<String, Vec<usize>>,  // target -> edge indices
    order: Vec<usize>,
}

impl Graph {
    pub fn build(nodes: Vec<WorkflowNode>, edges: Vec<WorkflowEdge>) -> Result<Self, GraphError> {
        let mut index = HashMap::with_capacity(nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            if !SUPPORTED_NODE_TYPES.contains(&node.kind.as_str()) {
                return Err(GraphError::UnsupportedNodeType {
                    node_id: node.id.clone(),
                    kind: node.kind.clone(),
                });
            }
            if index.insert(node.id.clone(), i).is_some() {
                return Err(GraphError::DuplicateNode(node.id.clone()));
            }
        }

        let mut edges_out: HashMap<String, Vec<usize>> = HashMap::new();
        let mut edges_in: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, edge) in edges.iter().enumerate() {
            for endpoint in [&edge.source, &edge.target] {
                if !index.contains_key(endpoint) {
                    return Err(GraphError::UnknownEdgeEndpoint {
                        edge: describe_edge(edge),
                        node_id: endpoint.clone(),
                    });
                }
            }
            edges_out.entry(edge.source.clone()).or_default().push(i);
            edges_in.entry(edge.target.clone()).or_default().push(i);
        }

        let mut graph = Graph {
            nodes,
            index,
            edges,
            edges_out,
            edges_in,
            order: Vec::new(),
        };
        graph.check_branches()?;
        graph.order = graph.topological_order()?;
        Ok(graph)
    }

    pub fn node(&self, id: &str) -> Option<&WorkflowNode> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn nodes(&self) -> &[WorkflowNode] {
        &self.nodes
    }

    /// Nodes in execution order.
    pub fn ordered(&self) -> impl Iterator<Item = &WorkflowNode> + '_ {
        self.order.iter().map(|&i| &self.nodes[i])
    }

    pub fn outgoing(&self, node_id: &str) -> Vec<&WorkflowEdge> {
        self.edge_list(self.edges_out.get(node_id))
    }

    pub fn incoming(&self, node_id: &str) -> Vec<&WorkflowEdge> {
        self.edge_list(self.edges_in.get(node_id))
    }

    pub fn roots(&self) -> Vec<&WorkflowNode> {
        self.nodes
            .iter()
            .filter(|n| !self.edges_in.contains_key(&n.id))
            .collect()
    }

    fn edge_list(&self, indices: Option<&Vec<usize>>) -> Vec<&WorkflowEdge> {
        indices
            .map(|v| v.iter().map(|&i| &self.edges[i]).collect())
            .unwrap_or_default()
    }

    fn check_branches(&self) -> Result<(), GraphError> {
        for node in self.nodes.iter().filter(|n| n.kind == "condition") {
            let mut seen = [false; 2];
            for edge in self.outgoing(&node.id) {
                let Some(label) = edge.source_handle.as_deref() else {
                    continue;
                };
                let slot = BRANCH_LABELS
                    .iter()
                    .position(|l| *l == label)
                    .ok_or_else(|| GraphError::InvalidBranchLabel {
                        node_id: node.id.clone(),
                        label: label.to_string(),
                    })?;
                if seen[slot] {
                    return Err(GraphError::DuplicateBranch {
                        node_id: node.id.clone(),
                        label: label.to_string(),
                    });
                }
                seen[slot] = true;
            }
        }
        Ok(())
    }

    // Kahn's algorithm; ready nodes are taken in declaration order.
    fn topological_order(&self) -> Result<Vec<usize>, GraphError> {
        let mut in_degree: Vec<usize> = self
            .nodes
            .iter()
            .map(|n| self.edges_in.get(&n.id).map_or(0, Vec::len))
            .collect();
        let mut ready: VecDeque<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, d)| **d == 0)
            .map(|(i, _)| i)
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(i) = ready.pop_front() {
            order.push(i);
            let mut released = Vec::new();
            for edge in self.outgoing(&self.nodes[i].id) {
                let target = self.index[&edge.target];
                in_degree[target] -= 1;
                if in_degree[target] == 0 {
                    released.push(target);
                }
            }
            released.sort_unstable();
            for target in released {
                let pos = ready.iter().position(|&r| r > target).unwrap_or(ready.len());
                ready.insert(pos, target);
            }
        }

        if order.len() != self.nodes.len() {
            return Err(GraphError::Cycle);
        }
        Ok(order)
    }
}

fn describe_edge(edge: &WorkflowEdge) -> String {
    match &edge.id {
        Some(id) => format!("`{id}`"),
        None => format!("{} -> {}", edge.source, edge.target),
    }
}
