//! Models for the generated instance table.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::schema::recurring_event_instance;

/// A materialized occurrence of a recurring template.
///
/// `(base_recurring_event_id, original_instance_start_time)` is unique.
#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = recurring_event_instance)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct GeneratedInstance {
    pub id: Uuid,
    pub base_recurring_event_id: Uuid,
    pub recurrence_rule_id: Uuid,
    pub original_series_id: Uuid,
    pub organization_id: Uuid,
    /// The "as scheduled" start time. Never changes after insertion.
    pub original_instance_start_time: DateTime<Utc>,
    pub actual_start_time: DateTime<Utc>,
    pub actual_end_time: DateTime<Utc>,
    pub is_cancelled: bool,
    /// 1-based position in the series.
    pub sequence_number: i32,
    /// Series length, `None` when the series never ends.
    pub total_count: Option<i32>,
    pub generated_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
    pub version: String,
}

/// New generated instance for insertion.
#[derive(Debug, Clone, PartialEq, Eq, Insertable)]
#[diesel(table_name = recurring_event_instance)]
pub struct NewGeneratedInstance {
    pub id: Uuid,
    pub base_recurring_event_id: Uuid,
    pub recurrence_rule_id: Uuid,
    pub original_series_id: Uuid,
    pub organization_id: Uuid,
    pub original_instance_start_time: DateTime<Utc>,
    pub actual_start_time: DateTime<Utc>,
    pub actual_end_time: DateTime<Utc>,
    pub is_cancelled: bool,
    pub sequence_number: i32,
    pub total_count: Option<i32>,
    pub generated_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
    pub version: String,
}

impl From<NewGeneratedInstance> for GeneratedInstance {
    fn from(new: NewGeneratedInstance) -> Self {
        Self {
            id: new.id,
            base_recurring_event_id: new.base_recurring_event_id,
            recurrence_rule_id: new.recurrence_rule_id,
            original_series_id: new.original_series_id,
            organization_id: new.organization_id,
            original_instance_start_time: new.original_instance_start_time,
            actual_start_time: new.actual_start_time,
            actual_end_time: new.actual_end_time,
            is_cancelled: new.is_cancelled,
            sequence_number: new.sequence_number,
            total_count: new.total_count,
            generated_at: new.generated_at,
            last_updated_at: new.last_updated_at,
            version: new.version,
        }
    }
}
