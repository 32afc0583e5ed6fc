//! Sporta API server binary.
//!
//! Connects to Postgres and Redis, applies migrations, serves the HTTP API
//! and runs the refresh-token retention sweep until shut down.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use sporta_api::AppState;
use sporta_api::config::ApiConfig;
use sporta_core::auth::session::SessionService;
use sporta_core::cache::redis::RedisCache;
use sporta_core::store::postgres::PgCredentialStore;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// CLI arguments for the API server. Unset flags fall back to `ApiConfig`.
#[derive(Parser, Debug)]
#[command(name = "sporta_api_server", about = "Sporta account and session API")]
struct Args {
    /// Port to listen on; overrides the port part of `BIND_ADDR`.
    #[arg(long, env = "PORT")]
    port: Option<u16>,

    /// PostgreSQL connection URL.
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Redis connection URL.
    #[arg(long, env = "REDIS_URL")]
    redis_url: Option<String>,

    /// Maximum number of database connections in the pool.
    #[arg(long, env = "DB_MAX_CONNECTIONS", default_value_t = 10)]
    max_connections: u32,

    /// Seconds between refresh-token retention sweeps.
    #[arg(long, env = "RETENTION_SWEEP_INTERVAL_SECS", default_value_t = 3600)]
    sweep_interval_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sporta_api=debug,sporta_core=debug".into()),
        )
        .init();

    let args = Args::parse();
    let mut config = ApiConfig::from_env()?;
    if let Some(url) = args.database_url {
        config.database_url = url;
    }
    if let Some(url) = args.redis_url {
        config.redis_url = url;
    }
    if let Some(port) = args.port {
        let host = config
            .bind_addr
            .rsplit_once(':')
            .map(|(host, _)| host.to_string())
            .unwrap_or_else(|| "127.0.0.1".into());
        config.bind_addr = format!("{host}:{port}");
    }

    info!(
        bind_addr = %config.bind_addr,
        max_connections = args.max_connections,
        auth = ?config.auth,
        "starting sporta_api_server"
    );

    let pool = PgPoolOptions::new()
        .max_connections(args.max_connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&config.database_url)
        .await?;

    info!("running database migrations");
    sporta_api::migrate(&pool).await?;

    let cache = RedisCache::connect(&config.redis_url).await?;
    info!("connected to redis");

    let session = Arc::new(SessionService::new(
        config.auth.clone(),
        Arc::new(PgCredentialStore::new(pool.clone())),
        Arc::new(cache),
    ));

    let shutdown = CancellationToken::new();
    let sweep = tokio::spawn(retention_sweep(
        session.clone(),
        Duration::from_secs(args.sweep_interval_secs.max(1)),
        shutdown.clone(),
    ));

    let app = sporta_api::router(AppState::new(session, shutdown.clone()));
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %listener.local_addr()?, "REST API listening");

    let serve_result = axum::serve(listener, app)
        .with_graceful_shutdown({
            let shutdown = shutdown.clone();
            async move {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!(error = %e, "failed to listen for ctrl-c");
                }
                info!("shutdown requested");
                shutdown.cancel();
            }
        })
        .await;

    shutdown.cancel();
    if let Err(e) = sweep.await {
        warn!(error = %e, "retention sweep task failed");
    }
    pool.close().await;

    serve_result?;
    Ok(())
}

/// Purge old refresh tokens every `interval` until `shutdown` fires.
async fn retention_sweep(
    session: Arc<SessionService>,
    interval: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(e) = session.purge_refresh_tokens(&shutdown).await
                    && !e.is_cancelled()
                {
                    warn!(error = %e, "refresh token purge failed");
                }
            }
        }
    }
    info!("retention sweep stopped");
}
