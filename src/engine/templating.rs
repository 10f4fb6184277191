use serde_json::{Map, Value};

use crate::models::workflow::WorkflowNode;

const INPUT_PLACEHOLDER: &str = "${input}";

/// Config keys passed to handlers verbatim.
const RAW_KEYS: &[&str] = &["script"];

/// Outputs of executed nodes, keyed by node id and by label.
#[derive(Debug, Default, Clone)]
pub struct OutputContext {
    values: Map<String, Value>,
}

impl OutputContext {
    pub fn insert(&mut self, node: &WorkflowNode, output: &str) {
        let value = serde_json::from_str::<Value>(output)
            .ok()
            .filter(|v| v.is_object() || v.is_array())
            .unwrap_or_else(|| Value::String(output.to_string()));

        if let Some(label) = node.label.as_deref().map(str::trim).filter(|l| !l.is_empty()) {
            self.values.insert(label.to_string(), value.clone());
        }
        self.values.insert(node.id.clone(), value);
    }

    pub fn as_value(&self) -> Value {
        Value::Object(self.values.clone())
    }
}

/// Returns a copy of `node` with every string in its config rendered.
pub fn render_node(node: &WorkflowNode, input: &str, ctx: &OutputContext) -> WorkflowNode {
    let ctx = ctx.as_value();
    let config = node
        .config
        .iter()
        .map(|(k, v)| {
            let rendered = if RAW_KEYS.contains(&k.as_str()) {
                v.clone()
            } else {
                render_value(v, input, &ctx)
            };
            (k.clone(), rendered)
        })
        .collect();

    WorkflowNode {
        config,
        ..node.clone()
    }
}

fn render_value(value: &Value, input: &str, ctx: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(render_str(s, input, ctx)),
        Value::Array(items) => Value::Array(items.iter().map(|v| render_value(v, input, ctx)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), render_value(v, input, ctx)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Substitutes `${input}` and `{{path}}` in one left-to-right pass.
/// Substituted text is copied as-is and never scanned again, so template
/// syntax inside the input or an upstream output stays literal.
/// Unknown paths render as empty strings.
pub(crate) fn render_str(s: &str, input: &str, ctx: &Value) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    loop {
        let next_input = rest.find(INPUT_PLACEHOLDER);
        let next_expr = rest.find("{{");
        let start = match (next_input, next_expr) {
            (None, None) => break,
            (Some(i), Some(e)) => i.min(e),
            (Some(i), None) => i,
            (None, Some(e)) => e,
        };
        let (head, tail) = rest.split_at(start);
        out.push_str(head);

        if Some(start) == next_input {
            out.push_str(input);
            rest = &tail[INPUT_PLACEHOLDER.len()..];
            continue;
        }
        match tail.find("}}") {
            Some(end_rel) => {
                let expr = tail[2..end_rel].trim();
                if !expr.is_empty() {
                    out.push_str(&lookup_ctx(expr, ctx).unwrap_or_default());
                }
                rest = &tail[end_rel + 2..];
            }
            None => {
                // Unterminated: keep the remainder, still honouring `${input}`.
                out.push_str("{{");
                rest = &tail[2..];
            }
        }
    }
    out.push_str(rest);
    out
}

pub(crate) fn lookup_ctx(path: &str, ctx: &Value) -> Option<String> {
    let mut cur = ctx;
    for part in path.split('.') {
        if part.is_empty() {
            continue;
        }
        match cur {
            Value::Object(map) => {
                cur = map.get(part)?;
            }
            Value::Array(arr) => {
                let idx: usize = part.parse().ok()?;
                cur = arr.get(idx)?;
            }
            _ => return None,
        }
    }
    Some(match cur {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}
