//! Service lifecycle, scheduled runs and manual triggers.

use std::time::Duration;

use chrono::{TimeDelta, Utc};

use cadence_core::config::SchedulerConfig;
use cadence_db::db::enums::Frequency;
use cadence_db::db::memory::MemoryStore;
use cadence_service::error::ServiceError;
use cadence_service::worker::HealthStatus;
use cadence_service::worker::metrics::{
    AggregationOptions, OperationStats, PerfSnapshot, run_metrics_aggregation_worker,
};
use cadence_service::worker::pipeline::WorkerConfigUpdate;
use cadence_test::fixtures::seed_organization_with_series;

use crate::helpers::{hour_from_now, worker_service};

const EVERY_SECOND: &str = "* * * * * *";

/// Polls until `store` holds `expected` instances or two seconds pass.
async fn wait_for_instances(store: &MemoryStore, expected: usize) -> usize {
    for _ in 0..40 {
        let count = store.instances().len();
        if count >= expected {
            return count;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    store.instances().len()
}

#[test_log::test(tokio::test)]
async fn start_runs_an_initial_materialization() {
    let store = MemoryStore::new();
    seed_organization_with_series(
        &store,
        "Orientation",
        hour_from_now(TimeDelta::days(1)),
        Frequency::Weekly,
        Some(3),
    );
    let workers = worker_service(&store, SchedulerConfig::default());

    workers.start().expect("start");

    assert_eq!(wait_for_instances(&store, 3).await, 3);
    workers.stop();
}

#[test_log::test(tokio::test)]
async fn scheduled_trigger_picks_up_new_organizations() {
    let store = MemoryStore::new();
    let workers = worker_service(
        &store,
        SchedulerConfig {
            materialization_schedule: EVERY_SECOND.to_owned(),
            ..SchedulerConfig::default()
        },
    );
    workers.start().expect("start");
    tokio::time::sleep(Duration::from_millis(50)).await;

    seed_organization_with_series(
        &store,
        "Late arrival",
        hour_from_now(TimeDelta::days(1)),
        Frequency::Daily,
        Some(2),
    );

    assert_eq!(wait_for_instances(&store, 2).await, 2);
    workers.stop();
}

#[test_log::test(tokio::test)]
async fn stopped_service_stops_scheduling() {
    let store = MemoryStore::new();
    let workers = worker_service(
        &store,
        SchedulerConfig {
            materialization_schedule: EVERY_SECOND.to_owned(),
            ..SchedulerConfig::default()
        },
    );
    workers.start().expect("start");
    workers.stop();
    workers.stop();

    seed_organization_with_series(
        &store,
        "Ignored",
        hour_from_now(TimeDelta::days(1)),
        Frequency::Daily,
        Some(2),
    );
    tokio::time::sleep(Duration::from_millis(1500)).await;

    assert!(store.instances().is_empty());
    assert!(!workers.is_running());
    assert!(matches!(
        workers.trigger_materialization().await,
        Err(ServiceError::NotRunning)
    ));
}

#[test_log::test(tokio::test)]
async fn invalid_schedule_keeps_service_stopped() {
    let workers = worker_service(
        &MemoryStore::new(),
        SchedulerConfig {
            cleanup_schedule: "every night".to_owned(),
            ..SchedulerConfig::default()
        },
    );

    assert!(workers.start().is_err());
    assert!(!workers.is_running());
    assert_eq!(workers.health_check().status, HealthStatus::Unhealthy);
}

#[test_log::test(tokio::test)]
async fn manual_triggers_share_the_updated_config() {
    let store = MemoryStore::new();
    let seeded = seed_organization_with_series(
        &store,
        "Council",
        hour_from_now(TimeDelta::days(1)),
        Frequency::Monthly,
        Some(3),
    );
    let workers = worker_service(&store, SchedulerConfig::default());
    workers.start().expect("start");

    let updated = workers.update_materialization_config(&WorkerConfigUpdate {
        enable_post_processing: Some(false),
        ..WorkerConfigUpdate::default()
    });
    assert!(!updated.enable_post_processing);
    assert!(!workers.get_status().materialization_config.enable_post_processing);

    let result = workers
        .trigger_materialization_for_organization(seeded.organization_id)
        .await
        .expect("trigger");
    assert_eq!(result.windows_updated, 0);
    assert_eq!(store.instances().len(), 3);

    let cleanup = workers
        .trigger_cleanup_for_organization(seeded.organization_id)
        .await
        .expect("cleanup");
    assert_eq!(cleanup.instances_deleted, 0);

    let purge = workers
        .trigger_emergency_cleanup(Utc::now() + TimeDelta::days(400))
        .await
        .expect("purge");
    assert_eq!(purge.instances_deleted, 3);

    let report = workers.health_check();
    assert!(report.is_healthy());
    assert!(report.reason.is_none());
    workers.stop();
}

#[test]
fn aggregation_over_a_static_provider() {
    struct Fixed(Vec<PerfSnapshot>);

    impl cadence_service::worker::metrics::SnapshotProvider for Fixed {
        fn recent_snapshots(&self, _: u32, max: usize) -> anyhow::Result<Vec<PerfSnapshot>> {
            Ok(self.0.iter().take(max).cloned().collect())
        }
    }

    let snapshot = |total_ms: f64| PerfSnapshot {
        total_ms,
        cache_hits: 3,
        cache_misses: 1,
        ops: [(
            "db.query".to_owned(),
            OperationStats {
                count: 2,
                ms: total_ms / 2.0,
                max: total_ms / 2.0,
            },
        )]
        .into_iter()
        .collect(),
        ..PerfSnapshot::default()
    };
    let provider = Fixed(vec![snapshot(100.0), snapshot(300.0), snapshot(200.0)]);

    let result = run_metrics_aggregation_worker(&provider, &AggregationOptions::default());

    assert_eq!(result.snapshots_processed, 3);
    let metrics = result.metrics;
    assert!((metrics.avg_total_ms - 200.0).abs() < f64::EPSILON);
    assert!((metrics.median_total_ms - 200.0).abs() < f64::EPSILON);
    assert!((metrics.cache.hit_rate - 0.75).abs() < f64::EPSILON);
    assert_eq!(metrics.operations["db.query"].count, 6);
}
