//! The admin and read surface through the full router, request tracking included.

use std::time::Duration;

use chrono::{TimeDelta, Utc};
use salvo::http::StatusCode;
use salvo::test::{ResponseExt, TestClient};
use serde_json::{Value, json};

use cadence_db::db::enums::Frequency;
use cadence_db::db::memory::MemoryStore;
use cadence_service::worker::metrics::{
    AggregationOptions, SnapshotProvider, run_metrics_aggregation_worker,
};
use cadence_test::fixtures::seed_organization_with_series;

use crate::helpers::{API, hour_from_now, test_app};

async fn json_of(response: &mut salvo::Response) -> Value {
    response.take_json::<Value>().await.expect("json body")
}

#[test_log::test(tokio::test)]
async fn operator_workflow_over_http() {
    let store = MemoryStore::new();
    let app = test_app(&store);
    app.workers.start().expect("start");
    // Let the initial materialization finish against the empty store.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let start = hour_from_now(TimeDelta::days(1));
    let seeded = seed_organization_with_series(&store, "Workshop", start, Frequency::Weekly, Some(4));
    let org = seeded.organization_id;

    let mut materialized = TestClient::post(format!("{API}/admin/materialize/{org}"))
        .send(&app.service)
        .await;
    assert_eq!(materialized.status_code, Some(StatusCode::OK));
    let result = json_of(&mut materialized).await;
    assert_eq!(result["instances_created"], 4);
    assert_eq!(result["windows_updated"], 1);

    let mut window = TestClient::get(format!("{API}/admin/organizations/{org}/window"))
        .send(&app.service)
        .await;
    let window = json_of(&mut window).await;
    assert_eq!(window["needs_extension"], false);
    assert!(window["days_until_window_end"].as_i64().expect("days") > 300);

    let mut extended = TestClient::post(format!("{API}/admin/organizations/{org}/window/extend"))
        .json(&json!({ "months": 2 }))
        .send(&app.service)
        .await;
    assert_eq!(extended.status_code, Some(StatusCode::OK));
    assert!(json_of(&mut extended).await["current_window_end_date"].is_string());

    let zero = TestClient::post(format!("{API}/admin/organizations/{org}/window/extend"))
        .json(&json!({ "months": 0 }))
        .send(&app.service)
        .await;
    assert_eq!(zero.status_code, Some(StatusCode::BAD_REQUEST));

    let mut statistics = TestClient::get(format!("{API}/admin/cleanup/statistics"))
        .send(&app.service)
        .await;
    let statistics = json_of(&mut statistics).await;
    assert_eq!(statistics["total_instances"], 4);
    assert_eq!(statistics["total_organizations"], 1);

    let mut pending = TestClient::get(format!("{API}/admin/organizations/{org}/cleanup"))
        .send(&app.service)
        .await;
    let pending = json_of(&mut pending).await;
    assert_eq!(pending["total_instances"], 4);
    assert_eq!(pending["instances_eligible_for_cleanup"], 0);

    let mut swept = TestClient::post(format!("{API}/admin/cleanup/{org}"))
        .send(&app.service)
        .await;
    assert_eq!(json_of(&mut swept).await["instances_deleted"], 0);

    let cutoff = (Utc::now() + TimeDelta::days(60)).to_rfc3339();
    let mut purged = TestClient::post(format!("{API}/admin/cleanup/emergency"))
        .json(&json!({ "cutoff": cutoff }))
        .send(&app.service)
        .await;
    assert_eq!(purged.status_code, Some(StatusCode::OK));
    let purged = json_of(&mut purged).await;
    assert_eq!(purged["instances_deleted"], 4);
    assert_eq!(purged["organizations_affected"], 1);
    assert!(store.instances().is_empty());

    app.workers.stop();
}

#[test_log::test(tokio::test)]
async fn requests_feed_metrics_aggregation() {
    let app = test_app(&MemoryStore::new());

    for _ in 0..3 {
        TestClient::get(format!("{API}/healthcheck")).send(&app.service).await;
    }
    TestClient::post(format!("{API}/admin/materialize"))
        .send(&app.service)
        .await;

    let snapshots = app
        .tracker
        .recent_snapshots(60, 100)
        .expect("snapshots");
    assert_eq!(snapshots.len(), 4);

    let result = run_metrics_aggregation_worker(app.tracker.as_ref(), &AggregationOptions::default());
    assert_eq!(result.snapshots_processed, 4);
    assert_eq!(result.metrics.operations["http.get"].count, 3);
    assert_eq!(result.metrics.operations["http.post"].count, 1);
}

#[test_log::test(tokio::test)]
async fn status_reports_metrics_schedule() {
    let app = test_app(&MemoryStore::new());
    app.workers.start().expect("start");

    let mut status = TestClient::get(format!("{API}/admin/status")).send(&app.service).await;
    assert_eq!(status.status_code, Some(StatusCode::OK));
    let status = json_of(&mut status).await;
    assert_eq!(status["is_running"], true);
    assert_eq!(status["metrics_enabled"], true);
    assert!(status["metrics_schedule"].is_string());

    let mut health = TestClient::get(format!("{API}/healthcheck")).send(&app.service).await;
    assert_eq!(health.status_code, Some(StatusCode::OK));
    assert_eq!(json_of(&mut health).await["status"], "healthy");

    app.workers.stop();
}
