mod condition;
mod files;
mod http;
mod io;
pub mod llm;
mod lua_script;
mod postgresql;

use crate::engine::recorder::RunRecorder;
use crate::engine::ExecutionEnv;
use crate::models::execution::{EventKind, LogData};
use crate::models::workflow::WorkflowNode;

/// What a handler sees while it runs. `node` already has its config rendered.
pub struct NodeContext<'a> {
    pub env: &'a ExecutionEnv,
    pub node: &'a WorkflowNode,
    pub input: &'a str,
    pub recorder: &'a mut RunRecorder,
}

impl NodeContext<'_> {
    pub fn event(&self, kind: EventKind) -> LogData {
        LogData::new(kind, self.node.id.clone()).with_node_type(self.node.kind.clone())
    }

    pub fn emit(&mut self, data: LogData) {
        self.recorder.emit(data);
    }

    pub fn emit_output(&mut self, output: &str) {
        let event = self.event(EventKind::Output).with_output(output);
        self.emit(event);
    }
}

/// Runs the handler for `ctx.node`, returning its output or an error message.
pub async fn dispatch(ctx: &mut NodeContext<'_>) -> Result<String, String> {
    match ctx.node.kind.as_str() {
        "input" => io::run_input(ctx),
        "output" => io::run_output(ctx),
        "condition" => condition::run(ctx),
        "http-request" => http::run(ctx).await,
        "lua-script" => lua_script::run(ctx).await,
        "postgresql" => postgresql::run(ctx).await,
        "ai-model" => llm::run(ctx).await,
        "read-file" => files::run_read(ctx).await,
        "write-file" => files::run_write(ctx).await,
        other => Err(format!("Unsupported node type `{other}`")),
    }
}

/// Outcome of a condition output, if `output` is one.
pub fn branch_outcome(output: &str) -> Option<bool> {
    match output {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}
