//! Query composition for `recurring_event_exception`.

use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use uuid::Uuid;

use crate::db::connection::DbConnection;
use crate::db::schema::recurring_event_exception;
use crate::model::exception::EventExceptionRow;

/// ## Summary
/// Loads every exception recorded against a template's instances.
///
/// ## Errors
/// Returns an error if the database operation fails.
pub async fn find_by_template(
    conn: &mut DbConnection<'_>,
    template_id: Uuid,
) -> QueryResult<Vec<EventExceptionRow>> {
    recurring_event_exception::table
        .filter(recurring_event_exception::base_recurring_event_id.eq(template_id))
        .order(recurring_event_exception::original_instance_start_time.asc())
        .select(EventExceptionRow::as_select())
        .load(conn)
        .await
}

/// ## Summary
/// Loads the exceptions attached to the given instances.
///
/// ## Errors
/// Returns an error if the database operation fails.
pub async fn find_by_instances(
    conn: &mut DbConnection<'_>,
    instance_ids: &[Uuid],
) -> QueryResult<Vec<EventExceptionRow>> {
    if instance_ids.is_empty() {
        return Ok(Vec::new());
    }

    recurring_event_exception::table
        .filter(recurring_event_exception::recurring_event_instance_id.eq_any(instance_ids))
        .select(EventExceptionRow::as_select())
        .load(conn)
        .await
}
