use chrono::{DateTime, Months, Utc};
use serde::Serialize;
use uuid::Uuid;

use cadence_core::constants::{
    DEFAULT_HISTORY_RETENTION_MONTHS, DEFAULT_HOT_WINDOW_MONTHS, DEFAULT_MAX_INSTANCES_PER_RUN,
    DEFAULT_PROCESSING_PRIORITY, MAX_PROCESSING_PRIORITY, MIN_PROCESSING_PRIORITY,
};
use cadence_db::db::store::{GenerationStore, InstanceFilter};
use cadence_db::model::window::{GenerationWindow, GenerationWindowChangeset, NewGenerationWindow};

use crate::error::{ServiceError, ServiceResult};

/// A window whose end is closer than this many days is due for extension.
const EXTENSION_THRESHOLD_DAYS: i64 = 30;

/// Candidate window configuration, checked by [`validate_window_config`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowSettings {
    pub organization_id: Uuid,
    pub hot_window_months_ahead: i32,
    pub history_retention_months: i32,
    pub processing_priority: i32,
    pub max_instances_per_run: i32,
}

/// Read-only summary of an organization's window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WindowStatus {
    pub current_window_end_date: DateTime<Utc>,
    pub retention_start_date: DateTime<Utc>,
    pub hot_window_months_ahead: i32,
    pub history_retention_months: i32,
    pub days_until_window_end: i64,
    pub needs_extension: bool,
}

/// Instance counts relative to an organization's retention start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WindowCleanupStats {
    pub total_instances: i64,
    pub instances_in_retention_window: i64,
    pub instances_eligible_for_cleanup: i64,
    pub retention_start_date: DateTime<Utc>,
}

fn months_before(date: DateTime<Utc>, months: i32) -> DateTime<Utc> {
    date.checked_sub_months(Months::new(months.unsigned_abs()))
        .unwrap_or(date)
}

/// ## Summary
/// Returns the organization's generation window, creating it with the global defaults if
/// it does not exist yet.
///
/// A new window ends now, so nothing counts as materialized and the next discovery pass
/// picks the organization up.
///
/// ## Side Effects
/// May insert a generation window row.
///
/// ## Errors
/// Returns an error if the store fails.
#[tracing::instrument(skip(store))]
pub async fn initialize_generation_window(
    store: &dyn GenerationStore,
    organization_id: Uuid,
) -> ServiceResult<GenerationWindow> {
    let now = Utc::now();
    let new_window = NewGenerationWindow {
        organization_id,
        hot_window_months_ahead: DEFAULT_HOT_WINDOW_MONTHS,
        history_retention_months: DEFAULT_HISTORY_RETENTION_MONTHS,
        current_window_end_date: now,
        retention_start_date: months_before(now, DEFAULT_HISTORY_RETENTION_MONTHS),
        processing_priority: DEFAULT_PROCESSING_PRIORITY,
        max_instances_per_run: DEFAULT_MAX_INSTANCES_PER_RUN,
        is_enabled: true,
        created_by_id: None,
    };

    if let Some(created) = store.insert_window_if_absent(&new_window).await? {
        tracing::info!("Initialized generation window");
        return Ok(created);
    }

    tracing::debug!("Generation window already exists");
    store.find_window(organization_id).await?.ok_or_else(|| {
        ServiceError::NotFound(format!(
            "Generation window for organization {organization_id} vanished after insert conflict"
        ))
    })
}

/// ## Summary
/// Pushes the window end and the hot window size forward by `additional_months`.
///
/// ## Side Effects
/// Updates the generation window row.
///
/// ## Errors
/// Returns [`ServiceError::NotFound`] if the organization has no window, or an error if the
/// store fails.
#[tracing::instrument(skip(store))]
pub async fn extend_generation_window(
    store: &dyn GenerationStore,
    organization_id: Uuid,
    additional_months: u32,
) -> ServiceResult<DateTime<Utc>> {
    let window = require_window(store, organization_id).await?;

    let new_end = window
        .current_window_end_date
        .checked_add_months(Months::new(additional_months))
        .ok_or_else(|| {
            ServiceError::ValidationError(format!(
                "cannot extend window by {additional_months} months"
            ))
        })?;
    let hot_months = window
        .hot_window_months_ahead
        .saturating_add(i32::try_from(additional_months).unwrap_or(i32::MAX));

    let mut changes = GenerationWindowChangeset::new(Utc::now());
    changes.current_window_end_date = Some(new_end);
    changes.hot_window_months_ahead = Some(hot_months);
    store.update_window(organization_id, &changes).await?;

    tracing::info!(new_window_end = %new_end, hot_window_months_ahead = hot_months, "Extended generation window");
    Ok(new_end)
}

/// ## Summary
/// Summarizes an organization's window without mutating it.
///
/// ## Errors
/// Returns [`ServiceError::NotFound`] if the organization has no window.
pub async fn get_window_status(
    store: &dyn GenerationStore,
    organization_id: Uuid,
) -> ServiceResult<WindowStatus> {
    let window = require_window(store, organization_id).await?;
    let days_until_window_end = (window.current_window_end_date - Utc::now()).num_days();

    Ok(WindowStatus {
        current_window_end_date: window.current_window_end_date,
        retention_start_date: window.retention_start_date,
        hot_window_months_ahead: window.hot_window_months_ahead,
        history_retention_months: window.history_retention_months,
        days_until_window_end,
        needs_extension: days_until_window_end < EXTENSION_THRESHOLD_DAYS,
    })
}

/// ## Summary
/// Counts an organization's instances on either side of its retention start.
///
/// ## Errors
/// Returns [`ServiceError::NotFound`] if the organization has no window.
pub async fn get_cleanup_stats(
    store: &dyn GenerationStore,
    organization_id: Uuid,
) -> ServiceResult<WindowCleanupStats> {
    let window = require_window(store, organization_id).await?;
    let scope = InstanceFilter::for_organization(organization_id);

    let total_instances = store.count_instances(&scope).await?;
    let instances_eligible_for_cleanup = store
        .count_instances(&scope.clone().ended_before(window.retention_start_date))
        .await?;

    Ok(WindowCleanupStats {
        total_instances,
        instances_in_retention_window: total_instances - instances_eligible_for_cleanup,
        instances_eligible_for_cleanup,
        retention_start_date: window.retention_start_date,
    })
}

/// ## Summary
/// Checks a window configuration for sane values.
#[must_use]
pub fn validate_window_config(settings: &WindowSettings) -> bool {
    !settings.organization_id.is_nil()
        && settings.hot_window_months_ahead >= 1
        && settings.history_retention_months >= 0
        && (MIN_PROCESSING_PRIORITY..=MAX_PROCESSING_PRIORITY).contains(&settings.processing_priority)
        && settings.max_instances_per_run >= 1
}

async fn require_window(
    store: &dyn GenerationStore,
    organization_id: Uuid,
) -> ServiceResult<GenerationWindow> {
    store.find_window(organization_id).await?.ok_or_else(|| {
        ServiceError::NotFound(format!(
            "No generation window found for organization {organization_id}"
        ))
    })
}
