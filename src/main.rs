mod captcha;
mod catalog;
mod config;
mod entities;
mod http;
mod models;
mod reconciler;
mod state;
mod voting;

#[cfg(test)]
mod test_support;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::captcha::{CaptchaVerifier, RecaptchaClient};
use crate::config::ApiConfig;
use crate::reconciler::CountReconciler;
use crate::state::{ApiCache, AppState};
use crate::voting::VoteIntake;
use crate::voting::hashing::VoterHasher;
use crate::voting::ledger::VoteLedger;
use crate::voting::rate_limit::RateLimiter;
use anyhow::{Context, Result};
use axum::Router;
use migration::MigratorTrait;
use sea_orm::ConnectOptions;
use sea_orm::Database;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config = ApiConfig::load().context("Failed to load configuration")?;
    init_tracing(config.server.is_production());
    let database = connect_database(&config).await?;
    run_migrations(&database).await?;

    let captcha: Option<Arc<dyn CaptchaVerifier>> = match RecaptchaClient::from_config(
        &config.captcha,
    )
    .context("Failed to initialize captcha client")?
    {
        Some(client) => Some(Arc::new(client)),
        None => {
            warn!("captcha.secret not set; CAPTCHA verification disabled");
            None
        }
    };

    let cache = Arc::new(ApiCache::new(&config.cache));
    let limiter = Arc::new(RateLimiter::new(&config.rate_limiting));
    let ledger = VoteLedger::new(database.clone());
    let intake = Arc::new(VoteIntake::new(
        Arc::new(ledger.clone()),
        Arc::clone(&limiter),
        VoterHasher::new(config.voting.hash_salt.clone()),
        captcha,
        Arc::clone(&cache),
        config.server.environment,
    ));

    let app_state = AppState::new(
        database.clone(),
        intake,
        Arc::clone(&cache),
        limiter,
        config.admin.clone(),
        config.campaign.clone(),
        config.server.environment,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reconciler_handle = if config.reconciler.enabled {
        let reconciler = CountReconciler::new(ledger, &config.reconciler, Arc::clone(&cache));
        Some(tokio::spawn(async move {
            if let Err(err) = reconciler.run(shutdown_rx).await {
                error!("Reconciler terminated with error: {err}");
            }
        }))
    } else {
        info!("Background vote count reconciler disabled");
        None
    };

    let listener = TcpListener::bind(config.server.address())
        .await
        .context("Failed to bind HTTP listener")?;
    let local_addr = listener
        .local_addr()
        .context("Failed to obtain listener address")?;
    info!(
        "Scent Vote API listening on {local_addr} ({:?})",
        config.server.environment
    );

    let router: Router = http::router(app_state);
    let server = axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    );
    server
        .with_graceful_shutdown(shutdown_signal(shutdown_tx.clone()))
        .await
        .context("HTTP server exited with error")?;

    shutdown_tx.send(true).ok();
    if let Some(handle) = reconciler_handle {
        if let Err(join_err) = handle.await {
            error!("Reconciler task join error: {join_err}");
        }
    }

    Ok(())
}

fn init_tracing(json: bool) {
    let default_filter = "info";
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.to_string());
    assert!(!filter.is_empty(), "Tracing filter must not be empty");
    assert!(filter.len() < 256, "Tracing filter length exceeds bounds");

    let builder = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}

async fn connect_database(config: &ApiConfig) -> Result<sea_orm::DatabaseConnection> {
    let mut options = ConnectOptions::new(config.database.url.clone());
    options
        .max_connections(config.database.max_connections)
        .sqlx_logging(true)
        .sqlx_logging_level(tracing::log::LevelFilter::Debug)
        .acquire_timeout(Duration::from_secs(10));

    if let Some(min) = config.database.min_connections {
        options.min_connections(min);
    }

    Database::connect(options)
        .await
        .context("Failed to connect to database")
}

async fn run_migrations(database: &sea_orm::DatabaseConnection) -> Result<()> {
    migration::Migrator::up(database, None)
        .await
        .context("Database migrations failed")
}

async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {err}");
        return;
    }
    shutdown_tx.send(true).ok();
    info!("Shutdown signal dispatched");
}
