use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cadenza_api::api::{create_router, AppState};
use cadenza_api::db;
use cadenza_api::repository::PostgresMusicRepository;
use cadenza_api::services::{HybridRecommendationEngine, RealTimeRecommendationCache};
use cadenza_api::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cadenza_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let pool = db::create_pool(&config.database_url).await?;
    tracing::info!("Connected to PostgreSQL");

    let redis_client = db::create_redis_client(&config.redis_url)?;
    let (cache, cache_writer) = db::Cache::new(redis_client).await;
    tracing::info!("Redis cache writer started");

    let repository = Arc::new(PostgresMusicRepository::new(Arc::new(pool)));
    let realtime = Arc::new(RealTimeRecommendationCache::new(
        config.freshness_window_secs,
    ));
    let engine = Arc::new(HybridRecommendationEngine::with_default_strategies(
        repository,
        realtime,
        cache,
        config.result_cache_ttl_secs,
    ));

    let app = create_router(AppState::new(engine));

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Flush pending cache writes before exiting
    cache_writer.shutdown().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install shutdown signal handler");
    }
    tracing::info!("Shutdown signal received");
}
