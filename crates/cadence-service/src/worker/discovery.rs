//! Finding organizations whose generation window needs advancing and turning them into jobs.

use chrono::{DateTime, Months, TimeDelta, Utc};
use uuid::Uuid;

use cadence_core::constants::{
    DEFAULT_MAX_ORGANIZATIONS, DEFAULT_PROCESSING_PRIORITY, MAX_PROCESSING_PRIORITY,
    MIN_PROCESSING_PRIORITY, TEMPLATE_PAGE_SIZE, UNNAMED_EVENT,
};
use cadence_db::db::store::{GenerationStore, WindowFilter, WindowOrder};
use cadence_db::model::rule::RecurrenceRule;
use cadence_db::model::window::GenerationWindow;

use crate::error::{ServiceError, ServiceResult};
use crate::generation::rule::{estimate_instance_count, normalize_recurrence_rule};

#[derive(Debug, Clone, PartialEq)]
pub struct JobDiscoveryConfig {
    pub max_organizations: usize,
    /// Windows ending within this many months are due.
    pub look_ahead_months: u32,
    /// Workloads scoring above this are reported as high priority.
    pub priority_threshold: f64,
    /// Windows processed more recently than this are left alone.
    pub reprocess_interval: TimeDelta,
}

impl Default for JobDiscoveryConfig {
    fn default() -> Self {
        Self {
            max_organizations: DEFAULT_MAX_ORGANIZATIONS,
            look_ahead_months: 1,
            priority_threshold: 5.0,
            reprocess_interval: TimeDelta::hours(1),
        }
    }
}

/// One recurring template of an organization, with its rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDescriptor {
    pub event_id: Uuid,
    pub event_name: String,
    pub rule_id: Uuid,
    /// Start of the template's first occurrence, or the rule start when the template has none.
    pub base_start: DateTime<Utc>,
    pub is_never_ending: bool,
    pub estimated_instances: u64,
    pub rule: RecurrenceRule,
}

/// Everything one organization needs generated in this pass.
#[derive(Debug, Clone, PartialEq)]
pub struct OrganizationWorkload {
    pub organization_id: Uuid,
    pub window: GenerationWindow,
    pub events: Vec<EventDescriptor>,
    /// 1.0 (lowest) to 10.0 (highest).
    pub priority: f64,
    pub estimated_duration_ms: u64,
}

/// Generation of one series over one window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventGenerationJob {
    pub organization_id: Uuid,
    pub base_recurring_event_id: Uuid,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub max_instances: Option<usize>,
}

/// ## Summary
/// Scores a workload from the window's configured priority, its never-ending series, the
/// urgency of its window end and its size. Always within 1 to 10.
#[must_use]
pub fn calculate_workload_priority(
    window: &GenerationWindow,
    events: &[EventDescriptor],
    now: DateTime<Utc>,
) -> f64 {
    let configured = if window.processing_priority > 0 {
        window.processing_priority
    } else {
        DEFAULT_PROCESSING_PRIORITY
    };
    let mut priority = f64::from(configured);

    let never_ending = events.iter().filter(|event| event.is_never_ending).count();
    if never_ending > 0 {
        priority += (count_as_f64(never_ending) * 0.5).min(2.0);
    }

    #[expect(clippy::cast_precision_loss)]
    let days_until_end =
        (window.current_window_end_date - now).num_seconds() as f64 / 86_400.0;
    if days_until_end < 7.0 {
        priority += ((7.0 - days_until_end) / 7.0 * 2.0).min(2.0);
    }

    if events.len() > 10 {
        priority += (count_as_f64(events.len()) / 50.0).min(1.0);
    }

    priority.clamp(
        f64::from(MIN_PROCESSING_PRIORITY),
        f64::from(MAX_PROCESSING_PRIORITY),
    )
}

fn count_as_f64(count: usize) -> f64 {
    f64::from(u32::try_from(count).unwrap_or(u32::MAX))
}

/// ## Summary
/// Rough runtime of a workload: 5 s base, 1 s per series and 10 ms per estimated instance.
#[must_use]
pub fn estimate_workload_duration(events: &[EventDescriptor]) -> u64 {
    let instances: u64 = events.iter().map(|event| event.estimated_instances).sum();
    5_000u64
        .saturating_add(1_000u64.saturating_mul(u64::try_from(events.len()).unwrap_or(u64::MAX)))
        .saturating_add(instances.saturating_mul(10))
}

/// ## Summary
/// Selects enabled windows that end within the look-ahead horizon and were not processed
/// recently, then builds a scored workload for each, highest priority first.
///
/// An organization whose templates cannot be read is logged and left out.
///
/// ## Errors
/// Returns an error if the window listing itself fails.
#[tracing::instrument(skip(store, config), fields(max_organizations = config.max_organizations))]
pub async fn discover_materialization_workloads(
    store: &dyn GenerationStore,
    config: &JobDiscoveryConfig,
    now: DateTime<Utc>,
) -> ServiceResult<Vec<OrganizationWorkload>> {
    let look_ahead = now
        .checked_add_months(Months::new(config.look_ahead_months))
        .unwrap_or(now);
    let filter = WindowFilter {
        enabled_only: true,
        window_end_before: Some(look_ahead),
        processed_before: Some(now - config.reprocess_interval),
        order: WindowOrder::PriorityDesc,
        limit: Some(i64::try_from(config.max_organizations).unwrap_or(i64::MAX)),
    };

    let windows = store.find_windows(&filter).await?;
    if windows.is_empty() {
        tracing::info!("No organizations need materialization");
        return Ok(Vec::new());
    }

    let mut workloads = Vec::with_capacity(windows.len());
    for window in windows {
        match build_workload(store, window, now).await {
            Ok(Some(workload)) => workloads.push(workload),
            Ok(None) => {}
            Err(e) => {
                tracing::error!(error = %e, "Failed to discover workload for organization");
            }
        }
    }

    workloads.sort_by(|a, b| b.priority.total_cmp(&a.priority));

    tracing::info!(
        workloads = workloads.len(),
        total_events = workloads.iter().map(|w| w.events.len()).sum::<usize>(),
        high_priority_workloads = workloads
            .iter()
            .filter(|w| w.priority > config.priority_threshold)
            .count(),
        "Discovered materialization workloads"
    );

    Ok(workloads)
}

/// ## Summary
/// Builds the workload of a single organization regardless of how recently it was
/// processed. Returns `None` when it has no recurring templates with rules.
///
/// ## Errors
/// Returns [`ServiceError::NotFound`] if the organization has no window, or an error if the
/// store fails.
#[tracing::instrument(skip(store))]
pub async fn discover_workload_for_organization(
    store: &dyn GenerationStore,
    organization_id: Uuid,
    now: DateTime<Utc>,
) -> ServiceResult<Option<OrganizationWorkload>> {
    let window = store.find_window(organization_id).await?.ok_or_else(|| {
        ServiceError::NotFound(format!(
            "No generation window found for organization {organization_id}"
        ))
    })?;
    build_workload(store, window, now).await
}

#[tracing::instrument(skip_all, fields(organization_id = %window.organization_id))]
async fn build_workload(
    store: &dyn GenerationStore,
    window: GenerationWindow,
    now: DateTime<Utc>,
) -> ServiceResult<Option<OrganizationWorkload>> {
    let events = discover_recurring_events(store, &window, now).await?;
    if events.is_empty() {
        tracing::debug!("Organization has no recurring events");
        return Ok(None);
    }

    let priority = calculate_workload_priority(&window, &events, now);
    let estimated_duration_ms = estimate_workload_duration(&events);

    Ok(Some(OrganizationWorkload {
        organization_id: window.organization_id,
        window,
        events,
        priority,
        estimated_duration_ms,
    }))
}

async fn discover_recurring_events(
    store: &dyn GenerationStore,
    window: &GenerationWindow,
    now: DateTime<Utc>,
) -> ServiceResult<Vec<EventDescriptor>> {
    let horizon = hot_window_end(window, now);
    let mut descriptors = Vec::new();
    let mut after = None;

    loop {
        let page = store
            .list_recurring_templates(window.organization_id, after, TEMPLATE_PAGE_SIZE)
            .await?;
        let Some(last) = page.last() else {
            break;
        };
        after = Some(last.id);

        let ids: Vec<Uuid> = page.iter().map(|template| template.id).collect();
        let rules = store.find_rules_for_templates(&ids).await?;

        for template in &page {
            let Some(rule) = rules
                .iter()
                .find(|rule| rule.base_recurring_event_id == template.id)
            else {
                continue;
            };

            let base_start = template.start_at.unwrap_or(rule.recurrence_start_date);
            let event_name = if template.name.trim().is_empty() {
                UNNAMED_EVENT.to_owned()
            } else {
                template.name.clone()
            };

            descriptors.push(EventDescriptor {
                event_id: template.id,
                event_name,
                rule_id: rule.id,
                base_start,
                is_never_ending: rule.is_never_ending(),
                estimated_instances: estimate_instance_count(rule, base_start, horizon),
                rule: rule.clone(),
            });
        }

        if i64::try_from(page.len()).unwrap_or(i64::MAX) < TEMPLATE_PAGE_SIZE {
            break;
        }
    }

    Ok(descriptors)
}

/// `now` plus the window's hot months.
#[must_use]
pub(crate) fn hot_window_end(window: &GenerationWindow, now: DateTime<Utc>) -> DateTime<Utc> {
    let months = u32::try_from(window.hot_window_months_ahead).unwrap_or(0);
    now.checked_add_months(Months::new(months)).unwrap_or(now)
}

/// ## Summary
/// Expands workloads into one job per series.
///
/// Each job starts at the organization's current window end and runs to the later of the
/// hot window end and the series' own end plus a week, so finite series are never cut short.
#[must_use]
pub fn create_event_generation_jobs(
    workloads: &[OrganizationWorkload],
    now: DateTime<Utc>,
) -> Vec<EventGenerationJob> {
    workloads
        .iter()
        .flat_map(|workload| {
            let default_end = hot_window_end(&workload.window, now);
            let max_instances = usize::try_from(workload.window.max_instances_per_run).ok();

            workload.events.iter().map(move |event| {
                let normalized = normalize_recurrence_rule(&event.rule, event.base_start);
                let window_end = normalized
                    .end_date
                    .map(|end| end + TimeDelta::weeks(1))
                    .map_or(default_end, |buffered| buffered.max(default_end));

                EventGenerationJob {
                    organization_id: workload.organization_id,
                    base_recurring_event_id: event.event_id,
                    window_start: workload.window.current_window_end_date,
                    window_end,
                    max_instances,
                }
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{self, utc};
    use cadence_db::db::enums::Frequency;
    use cadence_db::db::memory::MemoryStore;
    use chrono::Duration;

    fn descriptor(never_ending: bool) -> EventDescriptor {
        let template = fixtures::template(
            Uuid::now_v7(),
            "Series",
            utc(2024, 1, 1, 9, 0),
            Duration::hours(1),
        );
        let mut rule = fixtures::rule(&template, Frequency::Weekly);
        if !never_ending {
            rule.count = Some(10);
        }
        EventDescriptor {
            event_id: template.id,
            event_name: template.name,
            rule_id: rule.id,
            base_start: utc(2024, 1, 1, 9, 0),
            is_never_ending: never_ending,
            estimated_instances: 10,
            rule,
        }
    }

    #[test]
    fn priority_combines_all_factors() {
        let now = utc(2024, 1, 1, 0, 0);
        let mut window = fixtures::window(Uuid::now_v7(), now + Duration::days(60));
        window.processing_priority = 5;

        assert!((calculate_workload_priority(&window, &[descriptor(false)], now) - 5.0).abs() < 1e-9);

        let events = vec![descriptor(true), descriptor(true)];
        assert!((calculate_workload_priority(&window, &events, now) - 6.0).abs() < 1e-9);

        // Expires in 3.5 days: +1 for urgency.
        window.current_window_end_date = now + Duration::hours(84);
        assert!((calculate_workload_priority(&window, &events, now) - 7.0).abs() < 1e-9);
    }

    #[test]
    fn priority_is_always_bounded() {
        let now = utc(2024, 1, 1, 0, 0);
        let events: Vec<_> = (0..60).map(|_| descriptor(true)).collect();

        for configured in [-3, 0, 1, 5, 10, 25] {
            for days in [-400, -1, 0, 3, 30] {
                let mut window = fixtures::window(Uuid::now_v7(), now + Duration::days(days));
                window.processing_priority = configured;
                for slice in [&events[..0], &events[..1], &events[..]] {
                    let priority = calculate_workload_priority(&window, slice, now);
                    assert!((1.0..=10.0).contains(&priority), "{priority}");
                }
            }
        }
    }

    #[test]
    fn duration_estimate() {
        let events = vec![descriptor(true), descriptor(false)];
        assert_eq!(estimate_workload_duration(&events), 5_000 + 2_000 + 200);
        assert_eq!(estimate_workload_duration(&[]), 5_000);
    }

    #[test]
    fn jobs_cover_finite_series_past_the_hot_window() {
        let now = utc(2024, 1, 1, 0, 0);
        let organization_id = Uuid::now_v7();
        let mut window = fixtures::window(organization_id, utc(2024, 1, 15, 0, 0));
        window.hot_window_months_ahead = 1;

        let mut long = descriptor(false);
        long.rule.count = None;
        long.rule.recurrence_end_date = Some(utc(2024, 6, 1, 0, 0));
        let short = descriptor(false);
        let endless = descriptor(true);

        let workload = OrganizationWorkload {
            organization_id,
            window,
            events: vec![long, short, endless],
            priority: 5.0,
            estimated_duration_ms: 0,
        };

        let jobs = create_event_generation_jobs(&[workload], now);
        assert_eq!(jobs.len(), 3);
        assert!(jobs.iter().all(|job| job.window_start == utc(2024, 1, 15, 0, 0)));
        assert!(jobs.iter().all(|job| job.max_instances == Some(1000)));
        assert_eq!(jobs[0].window_end, utc(2024, 6, 8, 0, 0));
        assert_eq!(jobs[2].window_end, utc(2024, 2, 1, 0, 0));
        assert!(jobs[1].window_end >= utc(2024, 2, 1, 0, 0));
    }

    #[test_log::test(tokio::test)]
    async fn discovery_selects_due_windows_by_priority() {
        let store = MemoryStore::new();
        let now = Utc::now();

        let mut seeded = Vec::new();
        for priority in [2, 9] {
            let organization_id = Uuid::now_v7();
            let mut window = fixtures::window(organization_id, now + Duration::days(20));
            window.processing_priority = priority;
            store.put_window(window);

            let template = fixtures::template(organization_id, "", now, Duration::hours(1));
            store.put_rule(fixtures::rule(&template, Frequency::Daily));
            store.put_template(template);
            seeded.push(organization_id);
        }

        // Recently processed: skipped.
        let recent = Uuid::now_v7();
        let mut window = fixtures::window(recent, now);
        window.last_processed_at = Some(now - Duration::minutes(5));
        store.put_window(window);

        // Window far in the future: skipped.
        store.put_window(fixtures::window(Uuid::now_v7(), now + Duration::days(90)));

        // Template without a rule yields no workload.
        let ruleless = Uuid::now_v7();
        store.put_window(fixtures::window(ruleless, now));
        store.put_template(fixtures::template(ruleless, "Loose", now, Duration::hours(1)));

        let workloads = discover_materialization_workloads(&store, &JobDiscoveryConfig::default(), now)
            .await
            .expect("discovery");

        let organizations: Vec<_> = workloads.iter().map(|w| w.organization_id).collect();
        assert_eq!(organizations, vec![seeded[1], seeded[0]]);
        assert_eq!(workloads[0].events[0].event_name, UNNAMED_EVENT);
        assert!(workloads[0].events[0].is_never_ending);
    }

    #[test_log::test(tokio::test)]
    async fn failing_organization_is_skipped() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let mut healthy = None;

        for fail in [true, false] {
            let organization_id = Uuid::now_v7();
            store.put_window(fixtures::window(organization_id, now));
            let template = fixtures::template(organization_id, "Sync", now, Duration::hours(1));
            store.put_rule(fixtures::rule(&template, Frequency::Weekly));
            store.put_template(template);
            if fail {
                store.fail_organization(organization_id);
            } else {
                healthy = Some(organization_id);
            }
        }

        let workloads = discover_materialization_workloads(&store, &JobDiscoveryConfig::default(), now)
            .await
            .expect("discovery");
        assert_eq!(workloads.len(), 1);
        assert_eq!(Some(workloads[0].organization_id), healthy);
    }

    #[test_log::test(tokio::test)]
    async fn single_organization_requires_a_window() {
        let store = MemoryStore::new();
        let result = discover_workload_for_organization(&store, Uuid::now_v7(), Utc::now()).await;
        assert!(matches!(result, Err(ServiceError::NotFound(_))));
    }
}
