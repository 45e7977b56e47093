//! Query composition for `recurrence_rule`.

use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use uuid::Uuid;

use crate::db::connection::DbConnection;
use crate::db::schema::recurrence_rule;
use crate::model::rule::{NewRecurrenceRule, RecurrenceRule};

/// ## Summary
/// Loads the rule attached to a template.
///
/// ## Errors
/// Returns an error if the database operation fails.
pub async fn find_by_template(
    conn: &mut DbConnection<'_>,
    template_id: Uuid,
) -> QueryResult<Option<RecurrenceRule>> {
    recurrence_rule::table
        .filter(recurrence_rule::base_recurring_event_id.eq(template_id))
        .order(recurrence_rule::created_at.desc())
        .select(RecurrenceRule::as_select())
        .first(conn)
        .await
        .optional()
}

/// ## Summary
/// Loads the rules attached to any of the given templates.
///
/// ## Errors
/// Returns an error if the database operation fails.
pub async fn find_by_templates(
    conn: &mut DbConnection<'_>,
    template_ids: &[Uuid],
) -> QueryResult<Vec<RecurrenceRule>> {
    if template_ids.is_empty() {
        return Ok(Vec::new());
    }

    recurrence_rule::table
        .filter(recurrence_rule::base_recurring_event_id.eq_any(template_ids))
        .select(RecurrenceRule::as_select())
        .load(conn)
        .await
}

/// ## Summary
/// Inserts a rule and returns the stored row.
///
/// ## Errors
/// Returns an error if the database operation fails.
pub async fn insert(
    conn: &mut DbConnection<'_>,
    rule: &NewRecurrenceRule,
) -> QueryResult<RecurrenceRule> {
    diesel::insert_into(recurrence_rule::table)
        .values(rule)
        .returning(RecurrenceRule::as_returning())
        .get_result(conn)
        .await
}
