//! Models for the recurrence rule table.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::enums::Frequency;
use crate::db::schema::recurrence_rule;

/// Recurrence rule attached 1:1 to a recurring template.
#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = recurrence_rule)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct RecurrenceRule {
    pub id: Uuid,
    pub base_recurring_event_id: Uuid,
    /// Stable identifier that survives template splits and edits.
    pub original_series_id: Option<Uuid>,
    pub frequency: Frequency,
    pub interval: i32,
    pub recurrence_start_date: DateTime<Utc>,
    pub recurrence_end_date: Option<DateTime<Utc>>,
    pub count: Option<i32>,
    /// `BYDAY` entries such as `MO` or `1FR`.
    pub by_day: Vec<String>,
    pub by_month: Vec<i32>,
    pub by_month_day: Vec<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RecurrenceRule {
    /// ## Summary
    /// A series without a count or an end date never ends.
    #[must_use]
    pub const fn is_never_ending(&self) -> bool {
        self.count.is_none() && self.recurrence_end_date.is_none()
    }
}

/// New recurrence rule for insertion.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = recurrence_rule)]
pub struct NewRecurrenceRule {
    pub base_recurring_event_id: Uuid,
    pub original_series_id: Option<Uuid>,
    pub frequency: Frequency,
    pub interval: i32,
    pub recurrence_start_date: DateTime<Utc>,
    pub recurrence_end_date: Option<DateTime<Utc>>,
    pub count: Option<i32>,
    pub by_day: Vec<String>,
    pub by_month: Vec<i32>,
    pub by_month_day: Vec<i32>,
}
