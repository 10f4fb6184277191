use super::NodeContext;
use crate::models::execution::EventKind;

pub(super) fn run_input(ctx: &mut NodeContext<'_>) -> Result<String, String> {
    let value = ctx
        .node
        .config_str("input")
        .unwrap_or_else(|| ctx.input.to_string());
    let event = ctx.event(EventKind::Input).with_data(value.clone());
    ctx.emit(event);
    Ok(value)
}

pub(super) fn run_output(ctx: &mut NodeContext<'_>) -> Result<String, String> {
    let value = ctx
        .node
        .config_str("output")
        .unwrap_or_else(|| ctx.input.to_string());
    ctx.emit_output(&value);
    Ok(value)
}

#[cfg(test)]
mod tests {
    use crate::engine::graph::tests::node;
    use crate::engine::nodes::test_support::{env, run_node};
    use crate::models::execution::EventKind;
    use serde_json::json;

    #[tokio::test]
    async fn input_prefers_config_over_run_input() {
        let env = env();
        let (out, events) = run_node(&env, &node("i", "input", json!({"input": "fixed"})), "run").await;
        assert_eq!(out.unwrap(), "fixed");
        assert_eq!(events[0].kind, EventKind::Input);
        assert_eq!(events[0].data.as_deref(), Some("fixed"));

        let (out, _) = run_node(&env, &node("i", "input", json!({})), "run").await;
        assert_eq!(out.unwrap(), "run");
    }

    #[tokio::test]
    async fn output_passes_input_through() {
        let env = env();
        let (out, events) = run_node(&env, &node("o", "output", json!({})), "result").await;
        assert_eq!(out.unwrap(), "result");
        assert_eq!(events[0].kind, EventKind::Output);
        assert_eq!(events[0].output.as_deref(), Some("result"));
    }
}
