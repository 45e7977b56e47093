//! Models for per-instance exceptions.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::db::schema::recurring_event_exception;
use crate::error::{DbError, DbResult};

/// Fields of a generated instance that an exception may override.
///
/// Decoded from the `exception_data` payload. Keys outside this set are rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ExceptionOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub all_day: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_public: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_registerable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_invite_only: Option<bool>,
    #[serde(default, alias = "startAt", skip_serializing_if = "Option::is_none")]
    pub actual_start_time: Option<DateTime<Utc>>,
    #[serde(default, alias = "endAt", skip_serializing_if = "Option::is_none")]
    pub actual_end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_cancelled: Option<bool>,
}

impl ExceptionOverrides {
    /// ## Summary
    /// Decodes an override payload, rejecting unknown keys.
    ///
    /// ## Errors
    /// Returns an error if the payload is not an object of known override fields.
    pub fn from_json(value: JsonValue) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// ## Summary
    /// Encodes the overrides for storage.
    ///
    /// ## Errors
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<JsonValue, serde_json::Error> {
        serde_json::to_value(self)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Raw exception row as stored.
#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = recurring_event_exception)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct EventExceptionRow {
    pub id: Uuid,
    pub recurring_event_instance_id: Uuid,
    pub base_recurring_event_id: Uuid,
    pub original_instance_start_time: DateTime<Utc>,
    pub organization_id: Uuid,
    pub exception_data: JsonValue,
    pub created_by_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// New exception row for insertion.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = recurring_event_exception)]
pub struct NewEventException {
    pub recurring_event_instance_id: Uuid,
    pub base_recurring_event_id: Uuid,
    pub original_instance_start_time: DateTime<Utc>,
    pub organization_id: Uuid,
    pub exception_data: JsonValue,
    pub created_by_id: Option<Uuid>,
}

/// A per-instance override with its payload decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventException {
    pub id: Uuid,
    /// The generated instance this exception applies to (1:1).
    pub recurring_event_instance_id: Uuid,
    pub base_recurring_event_id: Uuid,
    /// Matches the instance's `original_instance_start_time`.
    pub original_instance_start_time: DateTime<Utc>,
    pub organization_id: Uuid,
    pub overrides: ExceptionOverrides,
    pub created_by_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<EventExceptionRow> for EventException {
    type Error = DbError;

    fn try_from(row: EventExceptionRow) -> DbResult<Self> {
        let overrides = ExceptionOverrides::from_json(row.exception_data).map_err(|source| {
            DbError::InvalidExceptionPayload {
                exception_id: row.id,
                source,
            }
        })?;

        Ok(Self {
            id: row.id,
            recurring_event_instance_id: row.recurring_event_instance_id,
            base_recurring_event_id: row.base_recurring_event_id,
            original_instance_start_time: row.original_instance_start_time,
            organization_id: row.organization_id,
            overrides,
            created_by_id: row.created_by_id,
            created_at: row.created_at,
        })
    }
}

impl EventException {
    /// ## Summary
    /// Decodes stored rows, skipping any whose payload is invalid so one bad row does not
    /// hide the rest.
    #[must_use]
    pub fn decode_rows(rows: Vec<EventExceptionRow>) -> Vec<Self> {
        rows.into_iter()
            .filter_map(|row| {
                let exception_id = row.id;
                Self::try_from(row)
                    .inspect_err(|e| {
                        tracing::warn!(
                            %exception_id,
                            error = %e,
                            "Skipping exception with invalid payload"
                        );
                    })
                    .ok()
            })
            .collect()
    }
}
