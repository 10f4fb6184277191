use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use axum::response::IntoResponse;
use flowline_backend::{
    config::Config,
    db::{
        postgres_user_repository::PostgresUserRepository,
        postgres_workflow_repository::PostgresWorkflowRepository,
        user_repository::UserRepository, workflow_repository::WorkflowRepository,
    },
    responses::JsonResponse,
    routes::{auth_routes, router_with_auth},
    state::AppState,
    utils::jwt::JwtKeys,
};
use reqwest::Client;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tokio::net::TcpListener;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[cfg(feature = "tls")]
use axum_server::tls_rustls::RustlsConfig;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("flowline_backend=info,tower_http=info,warn"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    // LOG_FORMAT=json switches to structured output for log shippers.
    if std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json")) {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env().context("invalid configuration")?;
    init_tracing();

    let jwt_keys = JwtKeys::from_config(&config).context("invalid JWT_SECRET")?;

    let auth_governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(config.auth_rate_limit_seconds)
            .burst_size(config.auth_rate_limit_burst)
            .use_headers()
            .error_handler(|_err| {
                JsonResponse::too_many_requests(
                    "Too many requests. Please wait a moment and try again.",
                )
                .into_response()
            })
            .finish()
            .context("invalid rate limiter settings")?,
    );

    // Drop idle client IPs from the limiter map.
    let governor_limiter = auth_governor_conf.limiter().clone();
    std::thread::spawn(move || loop {
        std::thread::sleep(std::time::Duration::from_secs(60));
        governor_limiter.retain_recent();
    });

    let pg_pool = establish_connection(&config.database_url).await?;
    sqlx::migrate!("./migrations")
        .run(&pg_pool)
        .await
        .context("failed to run database migrations")?;

    let user_repo = Arc::new(PostgresUserRepository {
        pool: pg_pool.clone(),
    }) as Arc<dyn UserRepository>;
    let workflow_repo = Arc::new(PostgresWorkflowRepository {
        pool: pg_pool.clone(),
    }) as Arc<dyn WorkflowRepository>;

    let addr = config.bind_addr;
    let state = AppState::new(user_repo, workflow_repo, config, jwt_keys, Client::new());

    let auth = auth_routes().layer(GovernorLayer {
        config: auth_governor_conf,
    });
    let app = router_with_auth(state, auth);
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();

    #[cfg(feature = "tls")]
    {
        let cert = std::env::var("TLS_CERT_PATH").context("TLS_CERT_PATH must be set")?;
        let key = std::env::var("TLS_KEY_PATH").context("TLS_KEY_PATH must be set")?;
        let tls_config = RustlsConfig::from_pem_file(cert, key)
            .await
            .context("failed to load TLS certificates")?;

        info!(%addr, "listening with TLS");
        axum_server::bind_rustls(addr, tls_config)
            .serve(make_service)
            .await
            .context("server error")?;
        return Ok(());
    }

    #[allow(unreachable_code)]
    {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        info!(%addr, "listening");
        axum::serve(listener, make_service)
            .await
            .context("server error")?;
        Ok(())
    }
}

/// Connects to the database and verifies it answers.
async fn establish_connection(database_url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .context("failed to connect to the database")?;

    sqlx::query("SELECT 1")
        .execute(&pool)
        .await
        .context("failed to verify database connection")?;

    info!("connected to the database");
    Ok(pool)
}
