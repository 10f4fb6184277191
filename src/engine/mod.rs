mod executor;
pub mod graph;
pub mod nodes;
pub mod recorder;
pub mod status;
mod templating;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;

use crate::config::Config;

pub use executor::{execute_workflow, record_execution_with_retry, ExecutorError, RunOutcome};
pub use graph::{Graph, GraphError};
pub use recorder::{RunRecorder, RunUpdate};

/// Tunables shared by every run.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub node_timeout: Duration,
    pub pg_query_timeout: Duration,
    pub lua_memory_limit: usize,
    pub default_llm_base_url: String,
    pub default_llm_model: String,
    pub files_root: Option<PathBuf>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            node_timeout: Duration::from_secs(120),
            pg_query_timeout: Duration::from_secs(30),
            lua_memory_limit: 64 * 1024 * 1024,
            default_llm_base_url: "http://localhost:11434/v1".to_string(),
            default_llm_model: "qwen3:14b".to_string(),
            files_root: None,
        }
    }
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            node_timeout: config.node_timeout,
            pg_query_timeout: config.pg_query_timeout,
            lua_memory_limit: config.lua_memory_limit_mb * 1024 * 1024,
            default_llm_base_url: config.default_llm_base_url.clone(),
            default_llm_model: config.default_llm_model.clone(),
            files_root: config.files_root.clone(),
        }
    }
}

/// Everything a run needs from the outside world.
#[derive(Debug, Clone)]
pub struct ExecutionEnv {
    pub http: Client,
    pub settings: Arc<EngineSettings>,
}

impl ExecutionEnv {
    pub fn new(http: Client, settings: EngineSettings) -> Self {
        Self {
            http,
            settings: Arc::new(settings),
        }
    }
}
