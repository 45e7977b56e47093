//! Query composition for `recurring_event_instance`.

use chrono::{DateTime, Utc};
use diesel::dsl::{count_distinct, count_star, max, min};
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use uuid::Uuid;

use crate::db::connection::DbConnection;
use crate::db::schema::recurring_event_instance;
use crate::db::store::{InstanceFilter, InstanceStatistics};
use crate::model::instance::{GeneratedInstance, NewGeneratedInstance};

/// Rows per `INSERT` statement; keeps bind parameters well under the protocol limit.
const INSERT_CHUNK_SIZE: usize = 1000;

/// ## Summary
/// Builds a boxed query with every constraint of `filter` applied.
#[must_use]
pub fn filtered(filter: &InstanceFilter) -> recurring_event_instance::BoxedQuery<'static, Pg> {
    let mut query = recurring_event_instance::table.into_boxed();

    if let Some(organization_id) = filter.organization_id {
        query = query.filter(recurring_event_instance::organization_id.eq(organization_id));
    }
    if let Some(base_id) = filter.base_recurring_event_id {
        query = query.filter(recurring_event_instance::base_recurring_event_id.eq(base_id));
    }
    if let Some(from) = filter.actual_start_from {
        query = query.filter(recurring_event_instance::actual_start_time.ge(from));
    }
    if let Some(before) = filter.actual_start_before {
        query = query.filter(recurring_event_instance::actual_start_time.lt(before));
    }
    if let Some(from) = filter.actual_end_from {
        query = query.filter(recurring_event_instance::actual_end_time.ge(from));
    }
    if let Some(before) = filter.actual_end_before {
        query = query.filter(recurring_event_instance::actual_end_time.lt(before));
    }
    if filter.exclude_cancelled {
        query = query.filter(recurring_event_instance::is_cancelled.eq(false));
    }

    query
}

/// ## Summary
/// Returns the original start times already materialized for a template within
/// `[from, to]`, ascending.
///
/// ## Errors
/// Returns an error if the database operation fails.
pub async fn existing_start_times(
    conn: &mut DbConnection<'_>,
    base_recurring_event_id: Uuid,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> QueryResult<Vec<DateTime<Utc>>> {
    recurring_event_instance::table
        .filter(recurring_event_instance::base_recurring_event_id.eq(base_recurring_event_id))
        .filter(recurring_event_instance::original_instance_start_time.ge(from))
        .filter(recurring_event_instance::original_instance_start_time.le(to))
        .order(recurring_event_instance::original_instance_start_time.asc())
        .select(recurring_event_instance::original_instance_start_time)
        .load(conn)
        .await
}

/// ## Summary
/// Inserts instances, skipping any whose `(base_recurring_event_id,
/// original_instance_start_time)` already exists.
///
/// ## Errors
/// Returns an error if the database operation fails.
pub async fn insert_batch_ignore_conflicts(
    conn: &mut DbConnection<'_>,
    instances: &[NewGeneratedInstance],
) -> QueryResult<usize> {
    let mut inserted = 0;

    for chunk in instances.chunks(INSERT_CHUNK_SIZE) {
        inserted += diesel::insert_into(recurring_event_instance::table)
            .values(chunk)
            .on_conflict((
                recurring_event_instance::base_recurring_event_id,
                recurring_event_instance::original_instance_start_time,
            ))
            .do_nothing()
            .execute(conn)
            .await?;
    }

    Ok(inserted)
}

/// ## Summary
/// Loads instances matching `filter`, ordered by actual start time.
///
/// ## Errors
/// Returns an error if the database operation fails.
pub async fn find_filtered(
    conn: &mut DbConnection<'_>,
    filter: &InstanceFilter,
) -> QueryResult<Vec<GeneratedInstance>> {
    let mut query = filtered(filter).order((
        recurring_event_instance::actual_start_time.asc(),
        recurring_event_instance::id.asc(),
    ));

    if let Some(limit) = filter.limit {
        query = query.limit(limit);
    }

    query
        .select(GeneratedInstance::as_select())
        .load(conn)
        .await
}

/// ## Summary
/// Counts instances matching `filter`.
///
/// ## Errors
/// Returns an error if the database operation fails.
pub async fn count_filtered(conn: &mut DbConnection<'_>, filter: &InstanceFilter) -> QueryResult<i64> {
    filtered(filter).count().get_result(conn).await
}

/// ## Summary
/// Deletes instances matching `filter` and returns the number of deleted rows.
///
/// ## Errors
/// Returns an error if the database operation fails.
pub async fn delete_filtered(
    conn: &mut DbConnection<'_>,
    filter: &InstanceFilter,
) -> QueryResult<usize> {
    let ids = filtered(filter).select(recurring_event_instance::id);

    diesel::delete(
        recurring_event_instance::table.filter(recurring_event_instance::id.eq_any(ids)),
    )
    .execute(conn)
    .await
}

/// ## Summary
/// Returns the distinct organizations owning instances that match `filter`.
///
/// ## Errors
/// Returns an error if the database operation fails.
pub async fn organizations_filtered(
    conn: &mut DbConnection<'_>,
    filter: &InstanceFilter,
) -> QueryResult<Vec<Uuid>> {
    filtered(filter)
        .select(recurring_event_instance::organization_id)
        .distinct()
        .load(conn)
        .await
}

/// ## Summary
/// Computes table-wide totals and end-time bounds.
///
/// ## Errors
/// Returns an error if the database operation fails.
pub async fn statistics(conn: &mut DbConnection<'_>) -> QueryResult<InstanceStatistics> {
    let (total_instances, total_organizations, oldest_instance_end, newest_instance_end) =
        recurring_event_instance::table
            .select((
                count_star(),
                count_distinct(recurring_event_instance::organization_id),
                min(recurring_event_instance::actual_end_time),
                max(recurring_event_instance::actual_end_time),
            ))
            .get_result::<(i64, i64, Option<DateTime<Utc>>, Option<DateTime<Utc>>)>(conn)
            .await?;

    Ok(InstanceStatistics {
        total_instances,
        total_organizations,
        oldest_instance_end,
        newest_instance_end,
    })
}
