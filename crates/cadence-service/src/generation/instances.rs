//! Read path: resolved instances for an organization over a date range.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use cadence_db::db::store::{GenerationStore, InstanceFilter};

use super::resolver::{
    ResolvedInstance, create_exception_lookup_map, create_template_lookup_map,
    resolve_multiple_instances,
};
use crate::error::{ServiceError, ServiceResult};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InstanceRangeQuery {
    pub organization_id: Uuid,
    /// Inclusive bound on the actual start time.
    pub start: DateTime<Utc>,
    /// Exclusive bound on the actual start time.
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub include_cancelled: bool,
    #[serde(default)]
    pub limit: Option<i64>,
}

/// ## Summary
/// Loads the instances whose actual start falls in `[start, end)` and resolves each against
/// its template and exception, ordered by actual start time.
///
/// Cancellation and the start bound are checked on the resolved values, so an exception that
/// cancels or moves an instance takes effect here. Candidates are selected by their stored
/// start, so an instance moved into the range from outside it is not returned.
///
/// ## Errors
/// Returns an error if the range is inverted or a store read fails.
#[tracing::instrument(skip(store, query), fields(
    organization_id = %query.organization_id,
    start = %query.start,
    end = %query.end,
))]
pub async fn get_instances_in_date_range(
    store: &dyn GenerationStore,
    query: &InstanceRangeQuery,
) -> ServiceResult<Vec<ResolvedInstance>> {
    if query.end < query.start {
        return Err(ServiceError::ValidationError(format!(
            "range end {} precedes start {}",
            query.end, query.start
        )));
    }

    let filter = InstanceFilter {
        organization_id: Some(query.organization_id),
        actual_start_from: Some(query.start),
        actual_start_before: Some(query.end),
        ..InstanceFilter::default()
    };
    let instances = store.find_instances(&filter).await?;
    if instances.is_empty() {
        return Ok(Vec::new());
    }

    let mut template_ids: Vec<Uuid> = instances
        .iter()
        .map(|instance| instance.base_recurring_event_id)
        .collect();
    template_ids.sort_unstable();
    template_ids.dedup();
    let instance_ids: Vec<Uuid> = instances.iter().map(|instance| instance.id).collect();

    let templates = store.find_templates(&template_ids).await?;
    let exceptions = store.exceptions_for_instances(&instance_ids).await?;

    let mut resolved = resolve_multiple_instances(
        &instances,
        &create_template_lookup_map(&templates),
        &create_exception_lookup_map(&exceptions),
    );
    resolved.retain(|instance| {
        (query.include_cancelled || !instance.is_cancelled)
            && instance.actual_start_time >= query.start
            && instance.actual_start_time < query.end
    });
    resolved.sort_by_key(|instance| (instance.actual_start_time, instance.id));
    if let Some(limit) = query.limit {
        resolved.truncate(usize::try_from(limit).unwrap_or(0));
    }

    tracing::debug!(count = resolved.len(), "Resolved instances in range");
    Ok(resolved)
}
