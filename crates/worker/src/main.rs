use std::sync::Arc;

use anyhow::Context;
use notices_db::{MemoryStore, PgStore};
use notices_engine::{Engine, EngineConfig, Stores};
use notices_events::{ChannelRelay, EmailConfig, EventBus, RelayConfig};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;

use config::{LogFormat, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = WorkerConfig::from_env()?;
    init_tracing(config.log_format);

    // --- Storage ---
    let stores = match &config.database_url {
        Some(database_url) => {
            let pool = notices_db::create_pool(database_url)
                .await
                .context("Failed to connect to database")?;
            tracing::info!("Database connection pool created");

            notices_db::health_check(&pool)
                .await
                .context("Database health check failed")?;
            tracing::info!("Database health check passed");

            notices_db::run_migrations(&pool)
                .await
                .context("Failed to run database migrations")?;
            tracing::info!("Database migrations applied");

            Stores::shared(Arc::new(PgStore::new(pool)))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, notes are kept in memory only");
            Stores::shared(Arc::new(MemoryStore::new()))
        }
    };

    // --- Engine ---
    let directory = Arc::new(config.directory());
    tracing::info!(
        departments = config.department_heads.len(),
        executive_director = ?config.executive_director_id,
        "Validation hierarchy loaded"
    );

    let event_bus = Arc::new(EventBus::default());
    let engine_config = EngineConfig::from_env()?;
    tracing::info!(?engine_config, "Loaded engine configuration");
    let engine = Engine::new(stores, directory, Arc::clone(&event_bus), engine_config);

    let cancel = CancellationToken::new();
    let mut handles = engine.spawn_background(&cancel);

    // --- Outbound channels ---
    let relay = ChannelRelay::from_config(RelayConfig::from_env()?, EmailConfig::from_env())?;
    if relay.is_enabled() {
        handles.push(tokio::spawn(
            Arc::new(relay).run(event_bus.subscribe(), cancel.clone()),
        ));
        tracing::info!("Channel relay started");
    } else {
        tracing::info!("No webhook or SMTP configured, notifications stay in-app");
    }

    tracing::info!("Worker started");
    shutdown_signal().await;

    // --- Shutdown ---
    cancel.cancel();
    for handle in handles {
        if tokio::time::timeout(config.shutdown_timeout, handle)
            .await
            .is_err()
        {
            tracing::warn!("Background task did not stop in time");
        }
    }
    drop(engine);

    tracing::info!("Graceful shutdown complete");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "notices_worker=debug,notices_engine=debug,notices_events=info,notices_db=info".into()
    });
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Wait for SIGINT (Ctrl-C) or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
