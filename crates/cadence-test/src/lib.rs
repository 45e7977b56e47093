//! Cadence instance materialization service - integration test support.
//!
//! Re-exports the workspace crates and provides builders for seeding the in-memory store.

pub use cadence_app as app;
pub use cadence_core as core;
pub use cadence_db as db;
pub use cadence_service as service;

pub mod fixtures {
    use chrono::{DateTime, Duration, Utc};
    use uuid::Uuid;

    use cadence_db::db::enums::Frequency;
    use cadence_db::db::memory::MemoryStore;
    use cadence_db::model::exception::{EventException, ExceptionOverrides};
    use cadence_db::model::instance::GeneratedInstance;
    use cadence_db::model::rule::RecurrenceRule;
    use cadence_db::model::template::RecurringTemplate;
    use cadence_db::model::window::GenerationWindow;

    #[must_use]
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
            description: Some(format!("{name} notes")),
            location: Some("Main hall".to_owned()),
            start_at: Some(start),
            end_at: Some(start + duration),
            all_day: false,
            is_public: true,
            is_registerable: true,
            is_invite_only: false,
            is_recurring: true,
            creator_id: Some(Uuid::now_v7()),
            updater_id: None,
            created_at: start,
            updated_at: start,
        }
    }

    #[must_use]
    pub fn rule(template: &RecurringTemplate, frequency: Frequency, count: Option<i32>) -> RecurrenceRule {
        let start = template.start_at.unwrap_or_else(Utc::now);
        RecurrenceRule {
            id: Uuid::now_v7(),
            base_recurring_event_id: template.id,
            original_series_id: Some(template.id),
            frequency,
            interval: 1,
            recurrence_start_date: start,
            recurrence_end_date: None,
            count,
            by_day: Vec::new(),
            by_month: Vec::new(),
            by_month_day: Vec::new(),
            created_at: start,
            updated_at: start,
        }
    }

    /// A window with the default settings, never processed.
    #[must_use]
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

    #[must_use]
    pub fn exception(instance: &GeneratedInstance, overrides: ExceptionOverrides) -> EventException {
        EventException {
            id: Uuid::now_v7(),
            recurring_event_instance_id: instance.id,
            base_recurring_event_id: instance.base_recurring_event_id,
            original_instance_start_time: instance.original_instance_start_time,
            organization_id: instance.organization_id,
            overrides,
            created_by_id: None,
            created_at: Utc::now(),
        }
    }

    /// Ids of a seeded template and its rule.
    #[derive(Debug, Clone, Copy)]
    pub struct SeededSeries {
        pub organization_id: Uuid,
        pub template_id: Uuid,
        pub rule_id: Uuid,
    }

    /// Seeds an organization window ending at `start` plus a series starting there.
    #[must_use]
    pub fn seed_organization_with_series(
        store: &MemoryStore,
        name: &str,
        start: DateTime<Utc>,
        frequency: Frequency,
        count: Option<i32>,
    ) -> SeededSeries {
        let organization_id = Uuid::now_v7();
        store.put_window(window(organization_id, start));
        seed_series(store, organization_id, name, start, frequency, count)
    }

    /// Seeds a one-hour series for an existing organization.
    #[must_use]
    pub fn seed_series(
        store: &MemoryStore,
        organization_id: Uuid,
        name: &str,
        start: DateTime<Utc>,
        frequency: Frequency,
        count: Option<i32>,
    ) -> SeededSeries {
        let template = template(organization_id, name, start, Duration::hours(1));
        let rule = rule(&template, frequency, count);
        let seeded = SeededSeries {
            organization_id,
            template_id: template.id,
            rule_id: rule.id,
        };
        store.put_template(template);
        store.put_rule(rule);
        seeded
    }
}
