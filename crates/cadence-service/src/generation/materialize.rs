//! The generation entry point: compute occurrences for one series and persist the new ones.

use std::collections::HashSet;

use chrono::{DateTime, Months, Utc};
use uuid::Uuid;

use cadence_core::constants::INSTANCE_VERSION;
use cadence_db::db::store::GenerationStore;
use cadence_db::model::instance::NewGeneratedInstance;
use cadence_db::model::rule::RecurrenceRule;

use super::occurrence::{OccurrenceRequest, calculate_occurrences};
use super::rule::{parse_rrule_text, validate_recurrence_rule};
use crate::error::{ServiceError, ServiceResult};
use crate::window::initialize_generation_window;

/// One series to materialize over a window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateInstancesInput {
    pub base_recurring_event_id: Uuid,
    pub organization_id: Uuid,
    pub window_start: DateTime<Utc>,
    /// Exclusive.
    pub window_end: DateTime<Utc>,
    /// Caps the rows inserted by one call; later calls pick up the rest.
    pub max_instances: Option<usize>,
}

/// ## Summary
/// Materializes the occurrences of one recurring template inside a window.
///
/// Loads the template, its rule and exceptions, expands the rule, drops occurrences that
/// are already materialized and bulk-inserts the rest in ascending start order. Running it
/// twice for the same window creates nothing the second time.
///
/// ## Side Effects
/// Inserts rows into the generated instance table.
///
/// ## Errors
/// Returns an error if the template or its rule is missing, the rule is invalid, the rule
/// has no original series id, or a store operation fails.
#[tracing::instrument(skip(store, input), fields(
    base_recurring_event_id = %input.base_recurring_event_id,
    organization_id = %input.organization_id,
    window_start = %input.window_start,
    window_end = %input.window_end,
))]
pub async fn generate_instances_for_recurring_event(
    store: &dyn GenerationStore,
    input: &GenerateInstancesInput,
) -> ServiceResult<usize> {
    let template = store
        .find_template(input.base_recurring_event_id)
        .await?
        .ok_or_else(|| {
            ServiceError::NotFound(format!(
                "Recurring event {} not found",
                input.base_recurring_event_id
            ))
        })?;

    let rule = store
        .find_rule_for_template(template.id)
        .await?
        .ok_or_else(|| {
            ServiceError::NotFound(format!("No recurrence rule for recurring event {}", template.id))
        })?;

    if !validate_recurrence_rule(&rule) {
        return Err(ServiceError::InvalidRule {
            rule_id: rule.id,
            reason: format!("interval {} / count {:?}", rule.interval, rule.count),
        });
    }

    let original_series_id = rule
        .original_series_id
        .ok_or(ServiceError::MissingSeries { rule_id: rule.id })?;

    let exceptions = store.exceptions_for_template(template.id).await?;

    let occurrences = calculate_occurrences(&OccurrenceRequest {
        rule: &rule,
        template: &template,
        window_start: input.window_start,
        window_end: input.window_end,
        exceptions: &exceptions,
    });

    let existing: HashSet<DateTime<Utc>> = store
        .existing_start_times(template.id, input.window_start, input.window_end)
        .await?
        .into_iter()
        .collect();

    let mut fresh: Vec<_> = occurrences
        .into_iter()
        .filter(|occurrence| !existing.contains(&occurrence.original_start_time))
        .collect();

    if let Some(max) = input.max_instances
        && fresh.len() > max
    {
        tracing::warn!(
            pending = fresh.len(),
            max_instances = max,
            "More new occurrences than allowed per run; inserting the earliest only"
        );
        fresh.truncate(max);
    }

    if fresh.is_empty() {
        tracing::debug!(already_materialized = existing.len(), "Nothing new to materialize");
        return Ok(0);
    }

    let now = Utc::now();
    let rows: Vec<NewGeneratedInstance> = fresh
        .into_iter()
        .map(|occurrence| NewGeneratedInstance {
            id: Uuid::now_v7(),
            base_recurring_event_id: template.id,
            recurrence_rule_id: rule.id,
            original_series_id,
            organization_id: template.organization_id,
            original_instance_start_time: occurrence.original_start_time,
            actual_start_time: occurrence.actual_start_time,
            actual_end_time: occurrence.actual_end_time,
            is_cancelled: occurrence.is_cancelled,
            sequence_number: occurrence.sequence_number,
            total_count: occurrence.total_count,
            generated_at: now,
            last_updated_at: now,
            version: INSTANCE_VERSION.to_owned(),
        })
        .collect();

    let created = store.insert_instances(&rows).await?;
    tracing::info!(instances_created = created, "Materialized recurring event instances");

    Ok(created)
}

/// ## Summary
/// Materializes a newly created series right away instead of waiting for the next
/// scheduled run.
///
/// Ensures the organization has a generation window, then generates from the template's
/// start to the later of the window end and `now + hot_window_months_ahead`.
///
/// ## Side Effects
/// May insert the organization's generation window and inserts generated instances.
///
/// ## Errors
/// Returns an error if the template does not exist or generation fails.
#[tracing::instrument(skip(store))]
pub async fn materialize_new_series(
    store: &dyn GenerationStore,
    template_id: Uuid,
) -> ServiceResult<usize> {
    let template = store
        .find_template(template_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Recurring event {template_id} not found")))?;

    let window = initialize_generation_window(store, template.organization_id).await?;

    let now = Utc::now();
    let hot_months = u32::try_from(window.hot_window_months_ahead).unwrap_or(0);
    let horizon = now.checked_add_months(Months::new(hot_months)).unwrap_or(now);
    let window_end = window.current_window_end_date.max(horizon);
    let window_start = template.start_at.unwrap_or(now);

    generate_instances_for_recurring_event(
        store,
        &GenerateInstancesInput {
            base_recurring_event_id: template.id,
            organization_id: template.organization_id,
            window_start,
            window_end,
            max_instances: usize::try_from(window.max_instances_per_run).ok(),
        },
    )
    .await
}

/// ## Summary
/// Parses `rrule_text` against the template's start and attaches it as the template's rule.
/// The template becomes the root of its own series.
///
/// ## Side Effects
/// Inserts a recurrence rule row.
///
/// ## Errors
/// Returns [`ServiceError::NotFound`] if the template does not exist,
/// [`ServiceError::ValidationError`] if it has no start or the text is not a supported rule,
/// or an error if the insert fails.
#[tracing::instrument(skip(store))]
pub async fn register_recurrence_rule(
    store: &dyn GenerationStore,
    template_id: Uuid,
    rrule_text: &str,
) -> ServiceResult<RecurrenceRule> {
    let template = store
        .find_template(template_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Recurring event {template_id} not found")))?;
    let Some(start) = template.start_at else {
        return Err(ServiceError::ValidationError(format!(
            "Recurring event {template_id} has no start time"
        )));
    };

    let parameters = parse_rrule_text(rrule_text, start)?;
    let rule = store
        .insert_rule(&parameters.into_new_rule(template.id, start, Some(template.id)))
        .await?;

    tracing::info!(rule_id = %rule.id, frequency = ?rule.frequency, "Registered recurrence rule");
    Ok(rule)
}
