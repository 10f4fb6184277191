use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_JWT_ISSUER: &str = "flowline";
pub const DEFAULT_JWT_AUDIENCE: &str = "flowline";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has an invalid value `{value}`")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub jwt_audience: String,
    pub token_ttl: Duration,
    pub frontend_origin: Option<String>,
    pub bind_addr: SocketAddr,
    pub registration_code: Option<String>,
    pub max_concurrent_runs: usize,
    pub node_timeout: Duration,
    pub pg_query_timeout: Duration,
    pub lua_memory_limit_mb: usize,
    pub default_llm_base_url: String,
    pub default_llm_model: String,
    pub files_root: Option<PathBuf>,
    pub auth_rate_limit_seconds: u64,
    pub auth_rate_limit_burst: u32,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok(); // Load .env file
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |name: &'static str| get(name).ok_or(ConfigError::Missing(name));

        Ok(Config {
            database_url: required("DATABASE_URL")?,
            jwt_secret: required("JWT_SECRET")?,
            jwt_issuer: get("JWT_ISSUER").unwrap_or_else(|| DEFAULT_JWT_ISSUER.to_string()),
            jwt_audience: get("JWT_AUDIENCE").unwrap_or_else(|| DEFAULT_JWT_AUDIENCE.to_string()),
            token_ttl: Duration::from_secs(parse_or(&get, "TOKEN_TTL_HOURS", 24u64)? * 3600),
            frontend_origin: get("FRONTEND_ORIGIN"),
            bind_addr: parse_or(&get, "BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 3000)))?,
            registration_code: get("REGISTRATION_CODE"),
            max_concurrent_runs: parse_or(&get, "MAX_CONCURRENT_RUNS", 16usize)?.max(1),
            node_timeout: Duration::from_secs(parse_or(&get, "NODE_TIMEOUT_SECS", 120u64)?),
            pg_query_timeout: Duration::from_secs(parse_or(&get, "PG_QUERY_TIMEOUT_SECS", 30u64)?),
            lua_memory_limit_mb: parse_or(&get, "LUA_MEMORY_LIMIT_MB", 64usize)?,
            default_llm_base_url: get("DEFAULT_LLM_BASE_URL")
                .unwrap_or_else(|| "http://localhost:11434/v1".to_string()),
            default_llm_model: get("DEFAULT_LLM_MODEL").unwrap_or_else(|| "qwen3:14b".to_string()),
            files_root: get("FILES_ROOT").map(PathBuf::from),
            auth_rate_limit_seconds: parse_or(&get, "RATE_LIMITER_AUTH_SECONDS", 2u64)?,
            auth_rate_limit_burst: parse_or(&get, "RATE_LIMITER_AUTH_BURST", 5u32)?,
        })
    }
}

fn parse_or<T, G>(get: &G, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(name) {
        Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid { name, value: raw }),
        None => Ok(default),
    }
}
