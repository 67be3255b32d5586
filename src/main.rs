use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use counter_sync::buffer::RedisBuffer;
use counter_sync::config::Config;
use counter_sync::db::{find_counter_drift, Database};
use counter_sync::reconcile::{run_reconcile_worker, ReconcileScheduler, Reconciler};

const DEFAULT_LOG_FILTER: &str = "info,counter_sync=debug";

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    init_tracing()?;

    info!("Starting counter-sync");

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    info!(
        comments_count = %config.counter_policy.comments_count,
        reposts_count = %config.counter_policy.reposts_count,
        interval_secs = config.reconcile_interval.as_secs(),
        "Configuration loaded"
    );

    if let Some(parent) = config.database_path.parent() {
        tokio::fs::create_dir_all(parent).await.with_context(|| {
            format!("Failed to create database directory: {}", parent.display())
        })?;
    }

    let db = Database::new(&config.database_path)
        .await
        .context("Failed to initialize database")?;

    info!("Database initialized");

    match find_counter_drift(db.pool()).await {
        Ok(drift) if drift.is_empty() => info!("Stored counters match row counts"),
        Ok(drift) => {
            for d in &drift {
                warn!(key = %d.key, field = %d.field, cached = d.cached, actual = d.actual, "Counter drift");
            }
            warn!(rows = drift.len(), "Counter drift detected at startup");
        }
        Err(e) => error!("Failed to check counter drift: {e:#}"),
    }

    // validate() guarantees a URL whenever a counter is buffered
    let Some(redis_url) = config.redis_url.as_deref() else {
        info!("All counters are on the direct path, nothing to reconcile");
        return Ok(());
    };

    let buffer = RedisBuffer::connect(redis_url)
        .await
        .context("Failed to connect to counter buffer")?;
    info!("Using Redis counter buffer");

    let reconciler = Reconciler::new(db.pool().clone(), Arc::new(buffer), config.flush_lock_timeout);
    // Writers live in other processes and share the buffer, so only the
    // interval drives this worker
    let (_scheduler, trigger) = ReconcileScheduler::channel();

    let shutdown = CancellationToken::new();
    let worker_handle = tokio::spawn(run_reconcile_worker(
        reconciler,
        trigger,
        config.reconcile_interval,
        shutdown.clone(),
    ));
    info!("Reconciliation worker started");

    shutdown_signal().await;

    info!("Shutting down...");

    shutdown.cancel();
    if let Err(e) = worker_handle.await {
        error!("Reconciliation worker panicked: {e}");
    }

    info!("Shutdown complete");

    Ok(())
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let json = matches!(
        std::env::var("LOG_FORMAT").as_deref(),
        Ok("json" | "structured")
    );

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().flatten_event(true))
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };
    installed.context("Failed to initialize tracing")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {e}");
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
                error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
