//! Retention sweeps, emergency purges and the statistics around them.

use std::sync::Arc;

use chrono::{TimeDelta, Utc};
use uuid::Uuid;

use cadence_db::db::enums::Frequency;
use cadence_db::db::memory::MemoryStore;
use cadence_service::worker::cleanup::{
    cleanup_old_instances, cleanup_specific_organization, emergency_cleanup_before,
    get_global_cleanup_statistics, get_organization_cleanup_status,
};
use cadence_service::worker::pipeline::{WorkerConfig, run_single_organization_worker};
use cadence_test::fixtures::{seed_organization_with_series, seed_series};

use crate::helpers::hour_from_now;

/// Materializes every seeded series of `organization_id`, past occurrences included.
async fn materialize(store: &MemoryStore, organization_id: Uuid) -> usize {
    run_single_organization_worker(
        Arc::new(store.clone()),
        organization_id,
        &WorkerConfig {
            enable_post_processing: false,
            ..WorkerConfig::default()
        },
    )
    .await
    .expect("materialize")
    .instances_created
}

fn count_for(store: &MemoryStore, organization_id: Uuid) -> usize {
    store
        .instances()
        .iter()
        .filter(|instance| instance.organization_id == organization_id)
        .count()
}

#[test_log::test(tokio::test)]
async fn sweep_honors_retention_and_enabled_flag() {
    let store = MemoryStore::new();

    let active = seed_organization_with_series(
        &store,
        "Archive",
        hour_from_now(TimeDelta::days(-200)),
        Frequency::Daily,
        Some(10),
    );
    seed_series(
        &store,
        active.organization_id,
        "Recent",
        hour_from_now(TimeDelta::days(-10)),
        Frequency::Daily,
        Some(5),
    );
    let disabled = seed_organization_with_series(
        &store,
        "Dormant",
        hour_from_now(TimeDelta::days(-300)),
        Frequency::Weekly,
        Some(4),
    );
    assert_eq!(materialize(&store, active.organization_id).await, 15);
    assert_eq!(materialize(&store, disabled.organization_id).await, 4);

    let mut dormant_window = store.window(disabled.organization_id).expect("window");
    dormant_window.is_enabled = false;
    store.put_window(dormant_window);

    let now = Utc::now();
    let before = get_organization_cleanup_status(&store, active.organization_id, now)
        .await
        .expect("status");
    assert_eq!(before.total_instances, 15);
    assert_eq!(before.instances_eligible_for_cleanup, 10);
    assert_eq!(before.history_retention_months, 3);

    let stats = cleanup_old_instances(&store, now).await.expect("sweep");
    assert_eq!(stats.organizations_processed, 1);
    assert_eq!(stats.instances_deleted, 10);
    assert_eq!(stats.errors_encountered, 0);

    assert_eq!(count_for(&store, active.organization_id), 5);
    assert_eq!(count_for(&store, disabled.organization_id), 4);

    let window = store.window(active.organization_id).expect("window");
    assert!(window.retention_start_date < now - TimeDelta::days(80));
    assert!(window.retention_start_date > now - TimeDelta::days(95));
}

#[test_log::test(tokio::test)]
async fn failing_organization_is_counted_and_skipped() {
    let store = MemoryStore::new();
    let start = hour_from_now(TimeDelta::days(-150));
    let healthy = seed_organization_with_series(&store, "Healthy", start, Frequency::Daily, Some(3));
    let failing = seed_organization_with_series(&store, "Failing", start, Frequency::Daily, Some(3));
    materialize(&store, healthy.organization_id).await;
    materialize(&store, failing.organization_id).await;
    store.fail_organization(failing.organization_id);

    let stats = cleanup_old_instances(&store, Utc::now()).await.expect("sweep");

    assert_eq!(stats.organizations_processed, 1);
    assert_eq!(stats.instances_deleted, 3);
    assert_eq!(stats.errors_encountered, 1);
    assert_eq!(count_for(&store, failing.organization_id), 3);
}

#[test_log::test(tokio::test)]
async fn single_organization_sweep_reports_cutoff() {
    let store = MemoryStore::new();
    let seeded = seed_organization_with_series(
        &store,
        "Quarterly",
        hour_from_now(TimeDelta::days(-400)),
        Frequency::Monthly,
        Some(14),
    );
    assert_eq!(materialize(&store, seeded.organization_id).await, 14);

    let now = Utc::now();
    let result = cleanup_specific_organization(&store, seeded.organization_id, now)
        .await
        .expect("sweep");

    assert!(result.instances_deleted >= 9);
    assert!(result.retention_cutoff_date < now);
    assert!(store
        .instances()
        .iter()
        .all(|instance| instance.actual_end_time >= result.retention_cutoff_date));

    let missing = cleanup_specific_organization(&store, Uuid::now_v7(), now).await;
    assert!(missing.is_err());
}

#[test_log::test(tokio::test)]
async fn emergency_purge_ignores_retention() {
    let store = MemoryStore::new();
    let first = seed_organization_with_series(
        &store,
        "Recent",
        hour_from_now(TimeDelta::days(-10)),
        Frequency::Daily,
        Some(5),
    );
    let second = seed_organization_with_series(
        &store,
        "Older",
        hour_from_now(TimeDelta::days(-30)),
        Frequency::Daily,
        Some(2),
    );
    materialize(&store, first.organization_id).await;
    materialize(&store, second.organization_id).await;

    let result = emergency_cleanup_before(&store, Utc::now() - TimeDelta::days(7))
        .await
        .expect("purge");

    assert_eq!(result.instances_deleted, 5);
    assert_eq!(result.organizations_affected, 2);
    assert_eq!(count_for(&store, first.organization_id), 2);
    assert_eq!(count_for(&store, second.organization_id), 0);
}

#[test_log::test(tokio::test)]
async fn global_statistics_summarize_the_table() {
    let store = MemoryStore::new();
    let empty = get_global_cleanup_statistics(&store).await.expect("stats");
    assert_eq!(empty.total_instances, 0);
    assert!(empty.oldest_instance_end.is_none());
    assert!(empty.average_instances_per_organization.abs() < f64::EPSILON);

    let start = hour_from_now(TimeDelta::days(3));
    let first = seed_organization_with_series(&store, "One", start, Frequency::Daily, Some(4));
    let second = seed_organization_with_series(&store, "Two", start, Frequency::Daily, Some(3));
    materialize(&store, first.organization_id).await;
    materialize(&store, second.organization_id).await;

    let stats = get_global_cleanup_statistics(&store).await.expect("stats");
    assert_eq!(stats.total_instances, 7);
    assert_eq!(stats.total_organizations, 2);
    assert!((stats.average_instances_per_organization - 3.5).abs() < f64::EPSILON);
    assert_eq!(stats.oldest_instance_end, Some(start + TimeDelta::hours(1)));
    assert_eq!(
        stats.newest_instance_end,
        Some(start + TimeDelta::days(3) + TimeDelta::hours(1))
    );
}
