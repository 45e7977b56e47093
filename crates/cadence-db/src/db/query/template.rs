//! Query composition for `recurring_event`.

use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use uuid::Uuid;

use crate::db::connection::DbConnection;
use crate::db::schema::recurring_event;
use crate::model::template::RecurringTemplate;

/// ## Summary
/// Loads a template by id.
///
/// ## Errors
/// Returns an error if the database operation fails.
pub async fn find_by_id(
    conn: &mut DbConnection<'_>,
    id: Uuid,
) -> QueryResult<Option<RecurringTemplate>> {
    recurring_event::table
        .find(id)
        .select(RecurringTemplate::as_select())
        .first(conn)
        .await
        .optional()
}

/// ## Summary
/// Loads every template whose id is in `ids`.
///
/// ## Errors
/// Returns an error if the database operation fails.
pub async fn find_by_ids(
    conn: &mut DbConnection<'_>,
    ids: &[Uuid],
) -> QueryResult<Vec<RecurringTemplate>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    recurring_event::table
        .filter(recurring_event::id.eq_any(ids))
        .select(RecurringTemplate::as_select())
        .load(conn)
        .await
}

/// ## Summary
/// Loads one page of an organization's recurring templates ordered by id, starting after
/// `after` (keyset pagination).
///
/// ## Errors
/// Returns an error if the database operation fails.
pub async fn list_recurring_page(
    conn: &mut DbConnection<'_>,
    organization_id: Uuid,
    after: Option<Uuid>,
    limit: i64,
) -> QueryResult<Vec<RecurringTemplate>> {
    let mut query = recurring_event::table
        .filter(recurring_event::organization_id.eq(organization_id))
        .filter(recurring_event::is_recurring.eq(true))
        .into_boxed();

    if let Some(after) = after {
        query = query.filter(recurring_event::id.gt(after));
    }

    query
        .order(recurring_event::id.asc())
        .limit(limit)
        .select(RecurringTemplate::as_select())
        .load(conn)
        .await
}
