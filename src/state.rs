use std::sync::Arc;

use reqwest::Client;
use tokio::sync::Semaphore;

use crate::config::Config;
use crate::db::{user_repository::UserRepository, workflow_repository::WorkflowRepository};
use crate::engine::{EngineSettings, ExecutionEnv};
use crate::utils::jwt::{JwtKeyProvider, JwtKeys};

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn UserRepository>,
    pub workflow_repo: Arc<dyn WorkflowRepository>,
    pub engine: ExecutionEnv,
    pub http_client: Client,
    pub config: Arc<Config>,
    pub jwt_keys: Arc<JwtKeys>,
    /// Bounds how many runs execute at once across the process.
    pub run_slots: Arc<Semaphore>,
}

impl AppState {
    pub fn new(
        db: Arc<dyn UserRepository>,
        workflow_repo: Arc<dyn WorkflowRepository>,
        config: Config,
        jwt_keys: JwtKeys,
        http_client: Client,
    ) -> Self {
        let engine = ExecutionEnv::new(http_client.clone(), EngineSettings::from_config(&config));
        let run_slots = Arc::new(Semaphore::new(config.max_concurrent_runs));
        Self {
            db,
            workflow_repo,
            engine,
            http_client,
            config: Arc::new(config),
            jwt_keys: Arc::new(jwt_keys),
            run_slots,
        }
    }
}

impl JwtKeyProvider for AppState {
    fn jwt_keys(&self) -> &JwtKeys {
        &self.jwt_keys
    }
}
