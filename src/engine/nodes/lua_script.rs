use std::time::{Duration, Instant};

use mlua::{HookTriggers, Lua, LuaOptions, StdLib, Value as LuaValue, VmState};

use super::NodeContext;

const HOOK_INSTRUCTION_INTERVAL: u32 = 10_000;

pub(super) async fn run(ctx: &mut NodeContext<'_>) -> Result<String, String> {
    let script = ctx
        .node
        .config_str("script")
        .ok_or_else(|| "Lua script is required".to_string())?;
    let input = ctx.input.to_string();
    let memory_limit = ctx.env.settings.lua_memory_limit;
    let budget = ctx
        .node
        .config_u64("timeoutMs")
        .map(Duration::from_millis)
        .unwrap_or(ctx.env.settings.node_timeout);

    let output = tokio::task::spawn_blocking(move || evaluate(&script, &input, memory_limit, budget))
        .await
        .map_err(|e| format!("Lua worker failed: {e}"))??;

    ctx.emit_output(&output);
    Ok(output)
}

fn evaluate(script: &str, input: &str, memory_limit: usize, budget: Duration) -> Result<String, String> {
    let libs = StdLib::TABLE | StdLib::STRING | StdLib::MATH | StdLib::UTF8 | StdLib::COROUTINE;
    let lua = Lua::new_with(libs, LuaOptions::default()).map_err(lua_error)?;
    lua.set_memory_limit(memory_limit).map_err(lua_error)?;
    lua.globals().set("input", input).map_err(lua_error)?;

    let deadline = Instant::now() + budget;
    lua.set_hook(
        HookTriggers::new().every_nth_instruction(HOOK_INSTRUCTION_INTERVAL),
        move |_lua, _debug| {
            if Instant::now() >= deadline {
                Err(mlua::Error::runtime("script exceeded its time limit"))
            } else {
                Ok(VmState::Continue)
            }
        },
    );

    let value: LuaValue = lua
        .load(script)
        .set_name("lua-script")
        .eval()
        .map_err(lua_error)?;

    match value {
        LuaValue::Nil => Ok(String::new()),
        LuaValue::String(s) => Ok(s.to_string_lossy().to_string()),
        other => serde_json::to_string(&other).map_err(|e| format!("Cannot serialize Lua result: {e}")),
    }
}

fn lua_error(err: mlua::Error) -> String {
    format!("Lua error: {err}")
}
