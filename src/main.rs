//! PrepPAL API server

use anyhow::Result;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use preppal::{
    api::{self, AppState},
    cache::create_cache,
    config::Config,
    db,
    services::{create_image_host, Services, UserService},
};

/// Expired sessions, reset codes and rate limiter state are pruned this often
const CLEANUP_INTERVAL_SECS: u64 = 300;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "preppal=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting PrepPAL...");

    let config = Config::load_with_env(Path::new("config.yml"))?;
    tracing::info!("Configuration loaded");

    let pool = db::create_pool(&config.database).await?;
    tracing::info!(url = %config.database.url, "Database connected");

    db::migrations::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed");

    let cache = create_cache(&config.cache);
    let images = create_image_host(&config.images)?;
    tracing::info!(driver = ?config.images.driver, "Image host ready");

    let services = Services::new(pool.clone(), &config, cache, images);
    spawn_cleanup(services.users.clone());

    let state = AppState::new(pool.clone(), &config, services);
    let app = api::build_router(state, &config);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    pool.close().await;
    tracing::info!("Server stopped");
    Ok(())
}

fn spawn_cleanup(users: Arc<UserService>) {
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(tokio::time::Duration::from_secs(CLEANUP_INTERVAL_SECS));
        loop {
            interval.tick().await;
            match users.cleanup_expired().await {
                Ok((sessions, resets)) => {
                    tracing::debug!(sessions, resets, "Expired sessions and reset codes removed")
                }
                Err(e) => tracing::warn!(error = %e, "Cleanup failed"),
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
