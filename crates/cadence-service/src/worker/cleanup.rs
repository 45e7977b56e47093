//! Retention sweep: deleting generated instances that ended before each organization's
//! retention cutoff.

use chrono::{DateTime, Months, Utc};
use serde::Serialize;
use uuid::Uuid;

use cadence_db::db::store::{GenerationStore, InstanceFilter, WindowFilter};
use cadence_db::model::window::{GenerationWindow, GenerationWindowChangeset};

use crate::error::{ServiceError, ServiceResult};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupStats {
    pub organizations_processed: usize,
    pub instances_deleted: usize,
    pub errors_encountered: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrganizationCleanupResult {
    pub instances_deleted: usize,
    pub retention_cutoff_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EmergencyCleanupResult {
    pub instances_deleted: usize,
    pub organizations_affected: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OrganizationCleanupStatus {
    pub total_instances: i64,
    pub instances_eligible_for_cleanup: i64,
    pub retention_cutoff_date: Option<DateTime<Utc>>,
    pub last_cleanup_date: Option<DateTime<Utc>>,
    pub history_retention_months: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GlobalCleanupStatistics {
    pub total_instances: i64,
    pub total_organizations: i64,
    pub oldest_instance_end: Option<DateTime<Utc>>,
    pub newest_instance_end: Option<DateTime<Utc>>,
    pub average_instances_per_organization: f64,
}

/// ## Summary
/// `now` minus the window's retention months.
#[must_use]
pub fn retention_cutoff_date(window: &GenerationWindow, now: DateTime<Utc>) -> DateTime<Utc> {
    now.checked_sub_months(Months::new(window.history_retention_months.unsigned_abs()))
        .unwrap_or(now)
}

/// ## Summary
/// Sweeps every enabled organization. A failing organization is logged and counted, and
/// the sweep moves on.
///
/// ## Side Effects
/// Deletes generated instances and updates retention start dates.
///
/// ## Errors
/// Returns an error only if the list of windows cannot be loaded.
#[tracing::instrument(skip(store))]
pub async fn cleanup_old_instances(
    store: &dyn GenerationStore,
    now: DateTime<Utc>,
) -> ServiceResult<CleanupStats> {
    let windows = store
        .find_windows(&WindowFilter {
            enabled_only: true,
            ..WindowFilter::default()
        })
        .await?;
    tracing::info!(organizations = windows.len(), "Starting retention sweep");

    let mut stats = CleanupStats::default();
    for window in &windows {
        match cleanup_organization(store, window, now).await {
            Ok(deleted) => {
                stats.organizations_processed += 1;
                stats.instances_deleted += deleted;
            }
            Err(e) => {
                stats.errors_encountered += 1;
                tracing::error!(
                    organization_id = %window.organization_id,
                    error = %e,
                    "Failed to clean up organization"
                );
            }
        }
    }

    Ok(stats)
}

#[tracing::instrument(skip_all, fields(organization_id = %window.organization_id))]
async fn cleanup_organization(
    store: &dyn GenerationStore,
    window: &GenerationWindow,
    now: DateTime<Utc>,
) -> ServiceResult<usize> {
    let cutoff = retention_cutoff_date(window, now);
    let filter = InstanceFilter::for_organization(window.organization_id).ended_before(cutoff);

    let eligible = store.count_instances(&filter).await?;
    let deleted = if eligible > 0 {
        store.delete_instances(&filter).await?
    } else {
        0
    };

    let mut changes = GenerationWindowChangeset::new(now);
    changes.retention_start_date = Some(cutoff);
    store.update_window(window.organization_id, &changes).await?;

    tracing::info!(retention_cutoff = %cutoff, instances_deleted = deleted, "Cleaned up organization");
    Ok(deleted)
}

/// ## Summary
/// Sweeps a single organization on demand.
///
/// ## Errors
/// Returns [`ServiceError::NotFound`] if the organization has no window, or an error if the
/// store fails.
#[tracing::instrument(skip(store))]
pub async fn cleanup_specific_organization(
    store: &dyn GenerationStore,
    organization_id: Uuid,
    now: DateTime<Utc>,
) -> ServiceResult<OrganizationCleanupResult> {
    let window = store.find_window(organization_id).await?.ok_or_else(|| {
        ServiceError::NotFound(format!(
            "No generation window found for organization {organization_id}"
        ))
    })?;

    let instances_deleted = cleanup_organization(store, &window, now).await?;
    Ok(OrganizationCleanupResult {
        instances_deleted,
        retention_cutoff_date: retention_cutoff_date(&window, now),
    })
}

/// ## Summary
/// Reports what a sweep of the organization would delete. All zeros when the organization
/// has no window.
///
/// ## Errors
/// Returns an error if the store fails.
pub async fn get_organization_cleanup_status(
    store: &dyn GenerationStore,
    organization_id: Uuid,
    now: DateTime<Utc>,
) -> ServiceResult<OrganizationCleanupStatus> {
    let Some(window) = store.find_window(organization_id).await? else {
        return Ok(OrganizationCleanupStatus::default());
    };

    let cutoff = retention_cutoff_date(&window, now);
    let scope = InstanceFilter::for_organization(organization_id);

    Ok(OrganizationCleanupStatus {
        total_instances: store.count_instances(&scope).await?,
        instances_eligible_for_cleanup: store.count_instances(&scope.ended_before(cutoff)).await?,
        retention_cutoff_date: Some(cutoff),
        last_cleanup_date: Some(window.retention_start_date),
        history_retention_months: window.history_retention_months,
    })
}

/// ## Summary
/// Deletes every instance that ended before `cutoff`, across all organizations and
/// regardless of their retention settings. Operator use only.
///
/// ## Side Effects
/// Deletes generated instances.
///
/// ## Errors
/// Returns an error if the store fails; nothing is deleted in that case.
#[tracing::instrument(skip(store))]
pub async fn emergency_cleanup_before(
    store: &dyn GenerationStore,
    cutoff: DateTime<Utc>,
) -> ServiceResult<EmergencyCleanupResult> {
    tracing::warn!(%cutoff, "EMERGENCY CLEANUP: deleting all instances that ended before cutoff");

    let outcome = store
        .purge_instances(&InstanceFilter::default().ended_before(cutoff))
        .await?;

    tracing::warn!(
        instances_deleted = outcome.instances_deleted,
        organizations_affected = outcome.organizations.len(),
        "EMERGENCY CLEANUP completed"
    );

    Ok(EmergencyCleanupResult {
        instances_deleted: outcome.instances_deleted,
        organizations_affected: outcome.organizations.len(),
    })
}

/// ## Summary
/// Table-wide instance totals.
///
/// ## Errors
/// Returns an error if the store fails.
pub async fn get_global_cleanup_statistics(
    store: &dyn GenerationStore,
) -> ServiceResult<GlobalCleanupStatistics> {
    let stats = store.instance_statistics().await?;

    #[expect(clippy::cast_precision_loss)]
    let average = if stats.total_organizations > 0 {
        stats.total_instances as f64 / stats.total_organizations as f64
    } else {
        0.0
    };

    Ok(GlobalCleanupStatistics {
        total_instances: stats.total_instances,
        total_organizations: stats.total_organizations,
        oldest_instance_end: stats.oldest_instance_end,
        newest_instance_end: stats.newest_instance_end,
        average_instances_per_organization: (average * 100.0).round() / 100.0,
    })
}
