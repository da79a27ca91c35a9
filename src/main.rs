use std::env;
use std::net::SocketAddr;
use std::sync::Arc;

use basecamp_cache::api::router;
use basecamp_cache::basecamp::{BasecampConfig, Paginator};
use basecamp_cache::db;
use basecamp_cache::error::AppError;
use basecamp_cache::services::SyncScheduler;
use basecamp_cache::state::AppState;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            env::var("RUST_LOG").unwrap_or_else(|_| "basecamp_cache=debug".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = BasecampConfig::new_from_env()?;
    info!("Basecamp config: {:?}", config);

    let database_url = env::var("DATABASE_URL")
        .unwrap_or_else(|_| "sqlite://basecamp_cache.db".to_string());
    let pool = db::connect(&database_url).await?;

    let basecamp = Arc::new(Paginator::from_config(&config)?);
    let state = AppState::new(pool.clone(), basecamp.clone(), config.batch_size);

    if let Ok(raw) = env::var("SYNC_INTERVAL_SECS") {
        let interval: u64 = raw.trim().parse().map_err(|_| {
            AppError::Config(format!("SYNC_INTERVAL_SECS has an invalid value: {}", raw))
        })?;
        let scheduler = SyncScheduler::new(pool, basecamp, config.batch_size, interval)
            .with_lock(state.sync_lock.clone());
        info!("auto-sync every {:?}", scheduler.interval());
        tokio::spawn(scheduler.start());
    }

    let app = router(state);

    let addr: SocketAddr = env::var("BIND_ADDR")
        .unwrap_or_else(|_| "127.0.0.1:3000".to_string())
        .parse()?;
    info!("listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
