//! Models for the recurring event template table.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::schema::recurring_event;

/// Recurring event template.
///
/// The canonical event whose content every generated instance inherits. Created and edited
/// outside of this crate; only read here.
#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = recurring_event)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct RecurringTemplate {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub location: Option<String>,
    /// Start of the first occurrence.
    pub start_at: Option<DateTime<Utc>>,
    /// End of the first occurrence; `end_at - start_at` is every instance's duration.
    pub end_at: Option<DateTime<Utc>>,
    pub all_day: bool,
    pub is_public: bool,
    pub is_registerable: bool,
    pub is_invite_only: bool,
    pub is_recurring: bool,
    pub creator_id: Option<Uuid>,
    pub updater_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RecurringTemplate {
    /// ## Summary
    /// Returns the first occurrence span when both ends are present.
    #[must_use]
    pub fn first_occurrence(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        Some((self.start_at?, self.end_at?))
    }
}

/// New template for insertion.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = recurring_event)]
pub struct NewRecurringTemplate<'a> {
    pub organization_id: Uuid,
    pub name: &'a str,
    pub description: Option<&'a str>,
    pub location: Option<&'a str>,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    pub all_day: bool,
    pub is_public: bool,
    pub is_registerable: bool,
    pub is_invite_only: bool,
    pub is_recurring: bool,
    pub creator_id: Option<Uuid>,
}
