//! Query composition for `event_generation_window`.

use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use uuid::Uuid;

use crate::db::connection::DbConnection;
use crate::db::schema::event_generation_window;
use crate::db::store::{WindowFilter, WindowOrder};
use crate::model::window::{GenerationWindow, GenerationWindowChangeset, NewGenerationWindow};

/// ## Summary
/// Inserts a window unless the organization already has one.
///
/// Returns `None` when a row already existed.
///
/// ## Errors
/// Returns an error if the database operation fails.
pub async fn insert_if_absent(
    conn: &mut DbConnection<'_>,
    window: &NewGenerationWindow,
) -> QueryResult<Option<GenerationWindow>> {
    diesel::insert_into(event_generation_window::table)
        .values(window)
        .on_conflict(event_generation_window::organization_id)
        .do_nothing()
        .returning(GenerationWindow::as_returning())
        .get_result(conn)
        .await
        .optional()
}

/// ## Summary
/// Loads an organization's window.
///
/// ## Errors
/// Returns an error if the database operation fails.
pub async fn find_by_organization(
    conn: &mut DbConnection<'_>,
    organization_id: Uuid,
) -> QueryResult<Option<GenerationWindow>> {
    event_generation_window::table
        .filter(event_generation_window::organization_id.eq(organization_id))
        .select(GenerationWindow::as_select())
        .first(conn)
        .await
        .optional()
}

/// ## Summary
/// Loads windows matching `filter` in the requested order.
///
/// A window that was never processed counts as processed before any cutoff.
///
/// ## Errors
/// Returns an error if the database operation fails.
pub async fn find_filtered(
    conn: &mut DbConnection<'_>,
    filter: &WindowFilter,
) -> QueryResult<Vec<GenerationWindow>> {
    let mut query = event_generation_window::table.into_boxed();

    if filter.enabled_only {
        query = query.filter(event_generation_window::is_enabled.eq(true));
    }
    if let Some(end_before) = filter.window_end_before {
        query = query.filter(event_generation_window::current_window_end_date.lt(end_before));
    }
    if let Some(processed_before) = filter.processed_before {
        query = query.filter(
            event_generation_window::last_processed_at
                .lt(processed_before)
                .or(event_generation_window::last_processed_at.is_null()),
        );
    }

    query = match filter.order {
        WindowOrder::OrganizationId => {
            query.order(event_generation_window::organization_id.asc())
        }
        WindowOrder::PriorityDesc => query.order((
            event_generation_window::processing_priority.desc(),
            event_generation_window::current_window_end_date.asc(),
        )),
    };

    if let Some(limit) = filter.limit {
        query = query.limit(limit);
    }

    query
        .select(GenerationWindow::as_select())
        .load(conn)
        .await
}

/// ## Summary
/// Applies a partial update to an organization's window.
///
/// ## Errors
/// Returns an error if the database operation fails.
pub async fn update(
    conn: &mut DbConnection<'_>,
    organization_id: Uuid,
    changes: &GenerationWindowChangeset,
) -> QueryResult<usize> {
    diesel::update(
        event_generation_window::table
            .filter(event_generation_window::organization_id.eq(organization_id)),
    )
    .set(changes)
    .execute(conn)
    .await
}

