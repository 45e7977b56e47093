//! Builders for rows used across unit tests.

use chrono::{DateTime, Duration, TimeZone, Utc};
use uuid::Uuid;

use cadence_db::db::enums::Frequency;
use cadence_db::model::exception::{EventException, ExceptionOverrides};
use cadence_db::model::instance::GeneratedInstance;
use cadence_db::model::rule::RecurrenceRule;
use cadence_db::model::template::RecurringTemplate;
use cadence_db::model::window::GenerationWindow;

pub fn utc(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, minute, 0)
        .single()
        .expect("valid timestamp")
}

pub fn template(
    organization_id: Uuid,
    name: &str,
    start: DateTime<Utc>,
    duration: Duration,
) -> RecurringTemplate {
    RecurringTemplate {
        id: Uuid::now_v7(),
        organization_id,
        name: name.to_owned(),
        description: Some(format!("{name} description")),
        location: Some("Room 1".to_owned()),
        start_at: Some(start),
        end_at: Some(start + duration),
        all_day: false,
        is_public: true,
        is_registerable: false,
        is_invite_only: false,
        is_recurring: true,
        creator_id: Some(Uuid::now_v7()),
        updater_id: None,
        created_at: start,
        updated_at: start,
    }
}

pub fn rule(template: &RecurringTemplate, frequency: Frequency) -> RecurrenceRule {
    let start = template.start_at.unwrap_or_else(Utc::now);
    RecurrenceRule {
        id: Uuid::now_v7(),
        base_recurring_event_id: template.id,
        original_series_id: Some(template.id),
        frequency,
        interval: 1,
        recurrence_start_date: start,
        recurrence_end_date: None,
        count: None,
        by_day: Vec::new(),
        by_month: Vec::new(),
        by_month_day: Vec::new(),
        created_at: start,
        updated_at: start,
    }
}

pub fn exception(
    instance: &GeneratedInstance,
    overrides: ExceptionOverrides,
) -> EventException {
    EventException {
        id: Uuid::now_v7(),
        recurring_event_instance_id: instance.id,
        base_recurring_event_id: instance.base_recurring_event_id,
        original_instance_start_time: instance.original_instance_start_time,
        organization_id: instance.organization_id,
        overrides,
        created_by_id: Some(Uuid::now_v7()),
        created_at: instance.generated_at,
    }
}

pub fn instance(
    template: &RecurringTemplate,
    rule: &RecurrenceRule,
    start: DateTime<Utc>,
    sequence_number: i32,
) -> GeneratedInstance {
    let duration = match (template.start_at, template.end_at) {
        (Some(s), Some(e)) => e - s,
        _ => Duration::hours(1),
    };
    GeneratedInstance {
        id: Uuid::now_v7(),
        base_recurring_event_id: template.id,
        recurrence_rule_id: rule.id,
        original_series_id: rule.original_series_id.unwrap_or(template.id),
        organization_id: template.organization_id,
        original_instance_start_time: start,
        actual_start_time: start,
        actual_end_time: start + duration,
        is_cancelled: false,
        sequence_number,
        total_count: None,
        generated_at: start,
        last_updated_at: start,
        version: "1".to_owned(),
    }
}

pub fn window(organization_id: Uuid, current_window_end_date: DateTime<Utc>) -> GenerationWindow {
    let now = Utc::now();
    GenerationWindow {
        id: Uuid::now_v7(),
        organization_id,
        hot_window_months_ahead: 12,
        history_retention_months: 3,
        current_window_end_date,
        retention_start_date: now,
        processing_priority: 5,
        max_instances_per_run: 1000,
        is_enabled: true,
        last_processed_at: None,
        last_processed_instance_count: 0,
        created_by_id: None,
        created_at: now,
        updated_at: now,
    }
}
