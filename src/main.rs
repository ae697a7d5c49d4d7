use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

use entitlr::api::routes::{create_router, AppState};
use entitlr::catalog::SeedLoader;
use entitlr::config::Config;
use entitlr::engine::Engine;
use entitlr::observability::{init_tracing, MetricsRegistry};
use entitlr::storage::{MemoryStorage, PostgresStorage, Storage};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse configuration
    let config = Config::parse();

    // Initialize tracing
    init_tracing(&config.log_level, config.log_format);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting entitlr resolution engine"
    );

    // Storage backend
    let storage: Arc<dyn Storage> = match config.database_url.as_deref().filter(|_| config.uses_database()) {
        Some(url) => {
            let postgres = PostgresStorage::connect(
                url,
                config.db_min_connections,
                config.db_max_connections,
            )
            .await?;
            info!(
                max_connections = config.db_max_connections,
                "Connected to Postgres"
            );

            if config.run_migrations {
                postgres.run_migrations().await?;
                info!("Migrations applied");
            }
            Arc::new(postgres)
        }
        None => {
            warn!("No database configured, using in-memory storage");
            Arc::new(MemoryStorage::new())
        }
    };

    let metrics = Arc::new(MetricsRegistry::new());
    let engine = Engine::new(storage, metrics);

    // Catalog seed (optional)
    if let Some(ref seed_path) = config.seed_path {
        let loader = SeedLoader::new(seed_path.to_string_lossy());
        let report = loader.seed(engine.catalog()).await?;
        info!(
            path = loader.path(),
            plans = report.plans,
            repaired_plan_modules = report.repaired_plan_modules,
            "Catalog seeded"
        );
    } else {
        info!("No seed configured, using existing catalog");
    }

    // Create application state
    let state = Arc::new(AppState {
        engine,
        strict_assign: config.strict_assign,
        start_time: Instant::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    });

    // Create router
    let app = create_router(state);

    // Parse listen address
    let addr: SocketAddr = config.listen_addr.parse()?;

    info!(addr = %addr, "Starting HTTP server");

    // Create TCP listener
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Run server with graceful shutdown
    if config.graceful_shutdown {
        let (signalled_tx, mut signalled_rx) = watch::channel(false);
        let server = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown_signal().await;
                let _ = signalled_tx.send(true);
            })
            .into_future();

        let timeout = config.shutdown_timeout();
        tokio::select! {
            result = server => result?,
            _ = async {
                if signalled_rx.changed().await.is_ok() {
                    tokio::time::sleep(timeout).await;
                } else {
                    std::future::pending::<()>().await;
                }
            } => {
                warn!(timeout_secs = timeout.as_secs(), "Graceful shutdown timed out");
            }
        }
    } else {
        axum::serve(listener, app).await?;
    }

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Received shutdown signal");
}
