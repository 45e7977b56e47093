//! Shared setup for integration tests.

use std::sync::Arc;

use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use salvo::prelude::*;

use cadence_core::config::SchedulerConfig;
use cadence_db::db::memory::MemoryStore;
use cadence_service::worker::BackgroundWorkerService;
use cadence_service::worker::metrics::SnapshotProvider;
use cadence_service::worker::pipeline::WorkerConfig;
use cadence_app::app::api::routes;
use cadence_app::middleware::perf::{PerfTracker, PerfTrackingHandler};
use cadence_app::worker_handler::WorkerServiceHandler;

pub const API: &str = "http://127.0.0.1:5800/api";

/// `now + offset`, truncated to the hour so occurrence times are stable.
pub fn hour_from_now(offset: TimeDelta) -> DateTime<Utc> {
    let now = Utc::now() + offset;
    now.duration_trunc(TimeDelta::hours(1)).unwrap_or(now)
}

/// A stopped service over `store` with default settings.
pub fn worker_service(store: &MemoryStore, scheduler: SchedulerConfig) -> Arc<BackgroundWorkerService> {
    Arc::new(BackgroundWorkerService::new(
        Arc::new(store.clone()),
        scheduler,
        WorkerConfig::default(),
        None,
    ))
}

/// The full HTTP stack as the binary wires it, with request tracking.
pub struct TestApp {
    pub workers: Arc<BackgroundWorkerService>,
    pub tracker: Arc<PerfTracker>,
    pub service: Service,
}

pub fn test_app(store: &MemoryStore) -> TestApp {
    let tracker = Arc::new(PerfTracker::new(100));
    let provider: Arc<dyn SnapshotProvider> = Arc::<PerfTracker>::clone(&tracker);
    let workers = Arc::new(BackgroundWorkerService::new(
        Arc::new(store.clone()),
        SchedulerConfig {
            metrics_enabled: true,
            ..SchedulerConfig::default()
        },
        WorkerConfig::default(),
        Some(provider),
    ));

    let router = Router::new()
        .hoop(PerfTrackingHandler {
            tracker: Arc::clone(&tracker),
        })
        .hoop(WorkerServiceHandler {
            service: Arc::clone(&workers),
        })
        .push(routes());

    TestApp {
        workers,
        tracker,
        service: Service::new(router),
    }
}
