//! API server entry point.

use api::config::{Config, LogFormat};
use ledger_store::{InMemoryStockStore, PostgresStockStore};
use queries::{InMemoryItemCatalog, PostgresItemCatalog};
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for SIGINT");
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
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration and initialize tracing
    let config = Config::from_env();
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;

    // 3. Pick the backend and build the application
    let addr = config.addr();
    let app = match config.database_url.clone() {
        Some(url) => {
            let pool = PgPoolOptions::new().max_connections(10).connect(&url).await?;
            let store = PostgresStockStore::new(pool.clone());
            store.run_migrations().await?;
            tracing::info!("using PostgreSQL backend");

            let state = api::create_default_state(store, PostgresItemCatalog::new(pool), config);
            api::create_app(state, metrics_handle)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory backend");
            let state = api::create_default_state(
                InMemoryStockStore::new(),
                InMemoryItemCatalog::new(),
                config,
            );
            api::create_app(state, metrics_handle)
        }
    };

    // 4. Start server
    tracing::info!(%addr, "starting inventory API server");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server shut down gracefully");
    Ok(())
}
