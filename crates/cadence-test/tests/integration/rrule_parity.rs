//! Registered RRULE text materializes the same dates the `rrule` crate expands.

use chrono::{DateTime, TimeZone, TimeDelta, Utc};
use rrule::RRuleSet;
use uuid::Uuid;

use cadence_db::db::memory::MemoryStore;
use cadence_service::generation::materialize::{materialize_new_series, register_recurrence_rule};
use cadence_test::fixtures::template;

fn utc(year: i32, month: u32, day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, 0, 0)
        .single()
        .expect("valid timestamp")
}

fn reference_dates(start: DateTime<Utc>, rule: &str) -> Vec<DateTime<Utc>> {
    let text = format!("DTSTART:{}\nRRULE:{rule}", start.format("%Y%m%dT%H%M%SZ"));
    let set: RRuleSet = text.parse().expect("reference rule");
    set.all(500)
        .dates
        .into_iter()
        .map(|date| date.with_timezone(&Utc))
        .collect()
}

async fn materialized_dates(start: DateTime<Utc>, rule: &str) -> Vec<DateTime<Utc>> {
    let store = MemoryStore::new();
    let series = template(Uuid::now_v7(), "Parity", start, TimeDelta::minutes(30));
    let template_id = series.id;
    store.put_template(series);

    register_recurrence_rule(&store, template_id, rule)
        .await
        .expect("register rule");
    materialize_new_series(&store, template_id)
        .await
        .expect("materialize");

    let instances = store.instances();
    let count = i32::try_from(instances.len()).expect("count");
    for (sequence, instance) in (1..).zip(&instances) {
        assert_eq!(instance.sequence_number, sequence, "{rule}");
        assert_eq!(instance.total_count, Some(count), "{rule}");
        assert_eq!(
            instance.actual_end_time - instance.actual_start_time,
            TimeDelta::minutes(30)
        );
    }
    instances
        .into_iter()
        .map(|instance| instance.original_instance_start_time)
        .collect()
}

async fn assert_parity(start: DateTime<Utc>, rule: &str) {
    let expected = reference_dates(start, rule);
    assert!(!expected.is_empty(), "{rule}");
    assert_eq!(materialized_dates(start, rule).await, expected, "{rule}");
}

#[test_log::test(tokio::test)]
async fn daily() {
    assert_parity(utc(2024, 1, 1, 9), "FREQ=DAILY;COUNT=10").await;
}

#[test_log::test(tokio::test)]
async fn weekly_on_several_days() {
    assert_parity(utc(2024, 1, 1, 9), "FREQ=WEEKLY;BYDAY=MO,WE,FR;COUNT=12").await;
}

#[test_log::test(tokio::test)]
async fn biweekly_on_several_days() {
    assert_parity(utc(2024, 1, 2, 18), "FREQ=WEEKLY;INTERVAL=2;BYDAY=TU,TH;COUNT=8").await;
}

#[test_log::test(tokio::test)]
async fn monthly_by_month_day() {
    assert_parity(utc(2024, 1, 15, 12), "FREQ=MONTHLY;BYMONTHDAY=15;COUNT=6").await;
}

#[test_log::test(tokio::test)]
async fn monthly_last_friday() {
    assert_parity(utc(2024, 1, 26, 16), "FREQ=MONTHLY;BYDAY=-1FR;COUNT=6").await;
}

#[test_log::test(tokio::test)]
async fn yearly() {
    assert_parity(utc(2024, 3, 10, 10), "FREQ=YEARLY;COUNT=4").await;
}
