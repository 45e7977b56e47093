use std::sync::Arc;

use cadence_app::app::api::routes;
use cadence_app::middleware::perf::{PerfTracker, PerfTrackingHandler};
use cadence_app::worker_handler::WorkerServiceHandler;
use cadence_core::config::load_config;
use cadence_db::db::connection::create_pool;
use cadence_db::db::store::GenerationStore;
use cadence_service::worker::BackgroundWorkerService;
use cadence_service::worker::metrics::SnapshotProvider;
use salvo::conn::TcpListener;
use salvo::server::ServerHandle;
use salvo::{Listener, Router};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, reload};

/// Request snapshots kept for metrics aggregation.
const PERF_SNAPSHOT_CAPACITY: usize = 5000;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (filter_layer, filter_handle) = reload::Layer::new(EnvFilter::new("info"));

    let subscriber = tracing_subscriber::registry().with(filter_layer).with(
        fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true),
    );
    tracing::subscriber::set_global_default(subscriber)?;
    // Route `log` records from dependencies into the subscriber.
    tracing_log::LogTracer::init()?;

    tracing::info!("Starting Cadence instance materialization service");

    let config = load_config()?;

    tracing::info!(config = ?config, "Configuration loaded");

    if let Ok(filter) = EnvFilter::try_new(config.logging.level.as_str()) {
        if let Err(e) = filter_handle.modify(|current| *current = filter) {
            tracing::warn!(error = %e, "Failed to update log filter from config");
        }
    } else {
        tracing::warn!(level = %config.logging.level, "Invalid log level in config, keeping info");
    }

    let pool = create_pool(&config.database.url, config.database.pool_size).await?;

    tracing::info!("Database connection pool created.");

    let store: Arc<dyn GenerationStore> = Arc::new(pool);
    let tracker = Arc::new(PerfTracker::new(PERF_SNAPSHOT_CAPACITY));
    let provider: Arc<dyn SnapshotProvider> = Arc::<PerfTracker>::clone(&tracker);
    let workers = Arc::new(BackgroundWorkerService::new(
        store,
        config.scheduler.clone(),
        config.materialization.clone().into(),
        Some(provider),
    ));
    workers.start()?;

    let bind_addr = config.server.bind_addr();
    let acceptor = TcpListener::new(bind_addr.clone()).bind().await;

    let router = Router::new()
        .hoop(PerfTrackingHandler { tracker })
        .hoop(WorkerServiceHandler {
            service: Arc::clone(&workers),
        })
        .push(routes());

    let server = salvo::Server::new(acceptor);
    tokio::spawn(shutdown_on_ctrl_c(server.handle()));

    tracing::info!("Server listening on {bind_addr}");

    server.serve(router).await;

    workers.stop();
    tracing::info!("Shutdown complete");

    Ok(())
}

async fn shutdown_on_ctrl_c(handle: ServerHandle) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    tracing::info!("Shutdown signal received, stopping background workers and server");
    handle.stop_graceful(None);
}
