mod error;
mod gate;
mod handlers;
mod metrics;
mod rate_limit;
mod routes;

use anyhow::Context;
use gate::RequestGate;
use rate_limit::{MemoryRateLimitStore, RateLimitStore, RedisRateLimitStore};
use redis::aio::ConnectionManager;
use skyforge_common::config::Config;
use skyforge_engine::{Orchestrator, Sandbox};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::info;

pub struct AppState {
    pub orchestrator: Orchestrator,
    pub sandbox: Arc<Sandbox>,
    pub gate: RequestGate,
    pub trust_proxy: bool,
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = std::env::var("LOG_FORMAT").is_ok_and(|format| format == "json");
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

async fn rate_limit_store(config: &Config) -> anyhow::Result<Arc<dyn RateLimitStore>> {
    let Some(redis_url) = &config.redis_url else {
        info!("Rate limiting in memory (REDIS_URL not set)");
        return Ok(Arc::new(MemoryRateLimitStore::new(
            config.rate_limit_max,
            config.rate_limit_window_ms,
        )));
    };

    let client = redis::Client::open(redis_url.as_str()).context("Failed to create Redis client")?;
    let conn = ConnectionManager::new(client)
        .await
        .context("Failed to connect to Redis")?;
    info!("Rate limiting via Redis: {}", redis_url);

    Ok(Arc::new(RedisRateLimitStore::new(
        conn,
        config.rate_limit_max,
        config.rate_limit_window_ms,
    )))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    info!("SkyForge API booting...");

    let config = Config::from_env().context("Invalid configuration")?;

    let sandbox = Arc::new(Sandbox::local());
    let orchestrator =
        Orchestrator::from_config(&config, sandbox.clone()).context("Failed to build HTTP client")?;
    info!(tiers = ?orchestrator.tiers(), "Execution cascade ready");

    let limiter = rate_limit_store(&config).await?;
    let state = Arc::new(AppState {
        orchestrator,
        sandbox,
        gate: RequestGate::new(
            limiter,
            config.rate_limit_max,
            config.rate_limit_window_ms,
            config.execution_timeout_ms,
        ),
        trust_proxy: config.trust_proxy,
    });

    let app = routes::app(state, config.frontend_url.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("HTTP server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = signal::ctrl_c().await;
        info!("Shutdown signal received");
    })
    .await
    .context("Server error")?;

    Ok(())
}
