//! Models for the per-organization generation window table.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::schema::event_generation_window;

/// Per-organization generation window configuration and progress markers.
#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = event_generation_window)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct GenerationWindow {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub hot_window_months_ahead: i32,
    pub history_retention_months: i32,
    /// Instances are materialized up to this point.
    pub current_window_end_date: DateTime<Utc>,
    /// Instances ending before this point have been purged.
    pub retention_start_date: DateTime<Utc>,
    /// 1 (lowest) to 10 (highest).
    pub processing_priority: i32,
    pub max_instances_per_run: i32,
    pub is_enabled: bool,
    pub last_processed_at: Option<DateTime<Utc>>,
    pub last_processed_instance_count: i32,
    pub created_by_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// New generation window for insertion.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = event_generation_window)]
pub struct NewGenerationWindow {
    pub organization_id: Uuid,
    pub hot_window_months_ahead: i32,
    pub history_retention_months: i32,
    pub current_window_end_date: DateTime<Utc>,
    pub retention_start_date: DateTime<Utc>,
    pub processing_priority: i32,
    pub max_instances_per_run: i32,
    pub is_enabled: bool,
    pub created_by_id: Option<Uuid>,
}

/// Partial update of a generation window. `None` fields are left untouched.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = event_generation_window)]
pub struct GenerationWindowChangeset {
    pub hot_window_months_ahead: Option<i32>,
    pub current_window_end_date: Option<DateTime<Utc>>,
    pub retention_start_date: Option<DateTime<Utc>>,
    pub last_processed_at: Option<DateTime<Utc>>,
    pub last_processed_instance_count: Option<i32>,
    pub updated_at: DateTime<Utc>,
}

impl GenerationWindowChangeset {
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            hot_window_months_ahead: None,
            current_window_end_date: None,
            retention_start_date: None,
            last_processed_at: None,
            last_processed_instance_count: None,
            updated_at: now,
        }
    }

    /// ## Summary
    /// Applies the changeset to an in-memory row.
    pub fn apply_to(&self, window: &mut GenerationWindow) {
        if let Some(months) = self.hot_window_months_ahead {
            window.hot_window_months_ahead = months;
        }
        if let Some(end) = self.current_window_end_date {
            window.current_window_end_date = end;
        }
        if let Some(start) = self.retention_start_date {
            window.retention_start_date = start;
        }
        if let Some(processed_at) = self.last_processed_at {
            window.last_processed_at = Some(processed_at);
        }
        if let Some(count) = self.last_processed_instance_count {
            window.last_processed_instance_count = count;
        }
        window.updated_at = self.updated_at;
    }
}
