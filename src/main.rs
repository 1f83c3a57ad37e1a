//! Hookline: durable webhook dispatcher.
//!
//! Main entry point. Loads configuration, connects to PostgreSQL, applies
//! the queue schema, then runs the ingestion API and the delivery engine
//! side by side until a shutdown signal arrives.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use hookline_api::{AppState, Config};
use hookline_core::{storage::Storage, RealClock};
use hookline_delivery::DeliveryEngine;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    init_tracing(&config);

    info!(
        database_url = %config.database_url_masked(),
        max_attempts = config.max_attempts,
        worker_count = config.worker_count,
        "starting hookline"
    );

    let db_pool = create_database_pool(&config).await?;
    info!("database connection pool established");

    hookline_core::storage::run_migrations(&db_pool).await?;
    info!("queue schema ready");

    let storage = Arc::new(Storage::new(db_pool.clone()));
    let clock = Arc::new(RealClock::new());

    // Delivery engine: claims pending rows and dispatches them.
    let mut engine = DeliveryEngine::new(storage.clone(), config.to_delivery_config(), clock)?;
    engine.start().await;

    // Ingestion API.
    let shutdown_token = CancellationToken::new();
    let server_handle = tokio::spawn({
        let state = AppState::new(storage, config.default_target_url.clone());
        let addr = config.parse_server_addr()?;
        let request_timeout = Duration::from_secs(config.request_timeout);
        let token = shutdown_token.clone();
        async move {
            if let Err(e) = hookline_api::start_server(state, addr, request_timeout, token).await {
                error!(error = %e, "HTTP server failed");
            }
        }
    });

    info!(addr = %config.parse_server_addr()?, "hookline is ready to accept events");

    shutdown_signal().await;
    info!("shutdown signal received, starting graceful shutdown");

    shutdown_token.cancel();
    if let Err(e) = engine.shutdown().await {
        error!(error = %e, "delivery engine shutdown incomplete");
    }

    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(config.request_timeout)) => {
            info!("server drain period expired");
        }
        _ = server_handle => {
            info!("HTTP server stopped");
        }
    }

    db_pool.close().await;
    info!("hookline shutdown complete");
    Ok(())
}

/// Initializes tracing from the configured filter, with `RUST_LOG` taking
/// precedence when set.
fn init_tracing(config: &Config) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.rust_log))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = fmt::layer().with_target(true);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
}

/// Creates the database connection pool, retrying while the database comes
/// up.
async fn create_database_pool(config: &Config) -> Result<sqlx::PgPool> {
    const MAX_RETRIES: u32 = 5;
    const RETRY_DELAY: Duration = Duration::from_secs(2);

    let mut retries = 0;
    loop {
        match PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .min_connections(config.database_min_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(&config.database_url)
            .await
        {
            Ok(pool) => {
                sqlx::query("SELECT 1")
                    .fetch_one(&pool)
                    .await
                    .context("failed to verify database connection")?;
                return Ok(pool);
            },
            Err(_e) if retries < MAX_RETRIES => {
                retries += 1;
                info!(attempt = retries, max_retries = MAX_RETRIES, "database not ready, retrying");
                tokio::time::sleep(RETRY_DELAY).await;
            },
            Err(e) => {
                return Err(e).context("failed to create database connection pool after retries");
            },
        }
    }
}

/// Waits for CTRL-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received CTRL+C");
        },
        _ = terminate => {
            info!("received SIGTERM");
        },
    }
}
