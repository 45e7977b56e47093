//! Materialization passes end to end: discovery, execution, window advance, read path.

use std::sync::Arc;

use chrono::{Months, TimeDelta, Utc};
use uuid::Uuid;

use cadence_db::db::enums::Frequency;
use cadence_db::db::memory::MemoryStore;
use cadence_db::model::exception::{EventException, ExceptionOverrides};
use cadence_service::generation::instances::{InstanceRangeQuery, get_instances_in_date_range};
use cadence_service::worker::pipeline::{
    WorkerConfig, run_materialization_worker, run_single_organization_worker,
};
use cadence_test::fixtures::{seed_organization_with_series, seed_series};

use crate::helpers::hour_from_now;

#[test_log::test(tokio::test)]
async fn full_pass_materializes_and_advances_window() {
    let store = MemoryStore::new();
    let start = hour_from_now(TimeDelta::days(1));
    let seeded = seed_organization_with_series(&store, "Book club", start, Frequency::Weekly, Some(5));

    let result = run_materialization_worker(Arc::new(store.clone()), &WorkerConfig::default()).await;

    assert_eq!(result.organizations_processed, 1);
    assert_eq!(result.instances_created, 5);
    assert_eq!(result.windows_updated, 1);
    assert_eq!(result.errors_encountered, 0);

    let instances = store.instances();
    let starts: Vec<_> = instances
        .iter()
        .map(|instance| instance.original_instance_start_time)
        .collect();
    let expected: Vec<_> = (0..5).map(|week| start + TimeDelta::weeks(week)).collect();
    assert_eq!(starts, expected);
    assert!(instances.iter().all(|instance| instance.total_count == Some(5)));
    assert_eq!(
        instances.iter().map(|i| i.sequence_number).collect::<Vec<_>>(),
        vec![1, 2, 3, 4, 5]
    );

    let window = store.window(seeded.organization_id).expect("window");
    let horizon = Utc::now()
        .checked_add_months(Months::new(11))
        .expect("horizon");
    assert!(window.current_window_end_date > horizon);
    assert!(window.last_processed_at.is_some());
    assert_eq!(window.last_processed_instance_count, 5);
}

#[test_log::test(tokio::test)]
async fn recently_processed_organizations_are_skipped() {
    let store = MemoryStore::new();
    seed_organization_with_series(
        &store,
        "Choir",
        hour_from_now(TimeDelta::days(2)),
        Frequency::Daily,
        Some(3),
    );

    let first = run_materialization_worker(Arc::new(store.clone()), &WorkerConfig::default()).await;
    let second = run_materialization_worker(Arc::new(store.clone()), &WorkerConfig::default()).await;

    assert_eq!(first.instances_created, 3);
    assert_eq!(second.organizations_processed, 0);
    assert_eq!(second.instances_created, 0);
    assert_eq!(store.instances().len(), 3);
}

#[test_log::test(tokio::test)]
async fn forced_organization_run_is_idempotent() {
    let store = MemoryStore::new();
    let seeded = seed_organization_with_series(
        &store,
        "Yoga",
        hour_from_now(TimeDelta::days(1)),
        Frequency::Daily,
        Some(7),
    );
    let config = WorkerConfig {
        enable_post_processing: false,
        ..WorkerConfig::default()
    };

    let first = run_single_organization_worker(Arc::new(store.clone()), seeded.organization_id, &config)
        .await
        .expect("first run");
    let second = run_single_organization_worker(Arc::new(store.clone()), seeded.organization_id, &config)
        .await
        .expect("second run");

    assert_eq!(first.instances_created, 7);
    assert_eq!(second.instances_created, 0);
    assert_eq!(second.windows_updated, 0);
    assert_eq!(store.instances().len(), 7);
    assert!(store
        .window(seeded.organization_id)
        .expect("window")
        .last_processed_at
        .is_none());
}

#[test_log::test(tokio::test)]
async fn unknown_organization_is_not_found() {
    let store = MemoryStore::new();
    let result =
        run_single_organization_worker(Arc::new(store), Uuid::now_v7(), &WorkerConfig::default()).await;
    assert!(result.is_err());
}

#[test_log::test(tokio::test)]
async fn failing_series_does_not_block_the_rest() {
    let store = MemoryStore::new();
    let start = hour_from_now(TimeDelta::days(1));
    let healthy = seed_organization_with_series(&store, "Healthy", start, Frequency::Daily, Some(4));
    let broken = seed_series(
        &store,
        healthy.organization_id,
        "Broken",
        start,
        Frequency::Daily,
        Some(4),
    );
    let other = seed_organization_with_series(&store, "Other", start, Frequency::Monthly, Some(2));
    store.fail_template(broken.template_id);

    let result = run_materialization_worker(
        Arc::new(store.clone()),
        &WorkerConfig {
            max_concurrent_jobs: 1,
            ..WorkerConfig::default()
        },
    )
    .await;

    assert_eq!(result.instances_created, 6);
    assert_eq!(result.errors_encountered, 1);
    assert_eq!(result.windows_updated, 2);

    let instances = store.instances();
    assert!(instances
        .iter()
        .all(|instance| instance.base_recurring_event_id != broken.template_id));
    assert_eq!(
        instances
            .iter()
            .filter(|instance| instance.organization_id == other.organization_id)
            .count(),
        2
    );
}

#[test_log::test(tokio::test)]
async fn exceptions_shape_generation_and_reads() {
    let store = MemoryStore::new();
    let start = hour_from_now(TimeDelta::days(1));
    let seeded = seed_organization_with_series(&store, "Standup", start, Frequency::Daily, Some(4));

    let cancelled_start = start + TimeDelta::days(1);
    store.put_exception(EventException {
        id: Uuid::now_v7(),
        recurring_event_instance_id: Uuid::now_v7(),
        base_recurring_event_id: seeded.template_id,
        original_instance_start_time: cancelled_start,
        organization_id: seeded.organization_id,
        overrides: ExceptionOverrides {
            is_cancelled: Some(true),
            ..ExceptionOverrides::default()
        },
        created_by_id: None,
        created_at: Utc::now(),
    });

    run_materialization_worker(Arc::new(store.clone()), &WorkerConfig::default()).await;

    let instances = store.instances();
    assert_eq!(instances.len(), 4);
    let cancelled = instances
        .iter()
        .find(|instance| instance.original_instance_start_time == cancelled_start)
        .expect("cancelled occurrence");
    assert!(cancelled.is_cancelled);

    let renamed = &instances[2];
    store.put_exception(cadence_test::fixtures::exception(
        renamed,
        ExceptionOverrides {
            name: Some("Retro".to_owned()),
            ..ExceptionOverrides::default()
        },
    ));

    let query = InstanceRangeQuery {
        organization_id: seeded.organization_id,
        start,
        end: start + TimeDelta::days(10),
        include_cancelled: false,
        limit: None,
    };
    let visible = get_instances_in_date_range(&store, &query)
        .await
        .expect("range read");
    assert_eq!(visible.len(), 3);
    assert!(visible
        .windows(2)
        .all(|pair| pair[0].actual_start_time <= pair[1].actual_start_time));

    let retro = visible
        .iter()
        .find(|instance| instance.id == renamed.id)
        .expect("renamed instance");
    assert_eq!(retro.name, "Retro");
    assert!(retro.has_exception);
    assert_eq!(retro.applied_overrides, vec!["name"]);
    assert_eq!(retro.location.as_deref(), Some("Main hall"));

    let everything = get_instances_in_date_range(
        &store,
        &InstanceRangeQuery {
            include_cancelled: true,
            ..query
        },
    )
    .await
    .expect("range read");
    assert_eq!(everything.len(), 4);
}
