//! Merging generated instances with their template and exception into client-facing views.

use std::collections::HashMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use uuid::Uuid;

use cadence_db::model::exception::{EventException, ExceptionOverrides};
use cadence_db::model::instance::GeneratedInstance;
use cadence_db::model::template::RecurringTemplate;

/// The effective view of one occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedInstance {
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

    pub name: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub all_day: bool,
    pub is_public: bool,
    pub is_registerable: bool,
    pub is_invite_only: bool,
    pub creator_id: Option<Uuid>,
    pub updater_id: Option<Uuid>,

    pub has_exception: bool,
    /// camelCase names of the fields the exception overrode.
    pub applied_overrides: Vec<&'static str>,
    pub exception_created_by: Option<Uuid>,
    pub exception_created_at: Option<DateTime<Utc>>,
}

/// ## Summary
/// Combines an instance's identity and timing with its template's content, then overlays
/// the exception's overrides field by field.
#[must_use]
pub fn resolve_instance(
    instance: &GeneratedInstance,
    template: &RecurringTemplate,
    exception: Option<&EventException>,
) -> ResolvedInstance {
    let mut resolved = ResolvedInstance {
        id: instance.id,
        base_recurring_event_id: instance.base_recurring_event_id,
        recurrence_rule_id: instance.recurrence_rule_id,
        original_series_id: instance.original_series_id,
        organization_id: instance.organization_id,
        original_instance_start_time: instance.original_instance_start_time,
        actual_start_time: instance.actual_start_time,
        actual_end_time: instance.actual_end_time,
        is_cancelled: instance.is_cancelled,
        sequence_number: instance.sequence_number,
        total_count: instance.total_count,
        generated_at: instance.generated_at,
        last_updated_at: instance.last_updated_at,
        version: instance.version.clone(),
        name: template.name.clone(),
        description: template.description.clone(),
        location: template.location.clone(),
        all_day: template.all_day,
        is_public: template.is_public,
        is_registerable: template.is_registerable,
        is_invite_only: template.is_invite_only,
        creator_id: template.creator_id,
        updater_id: template.updater_id,
        has_exception: false,
        applied_overrides: Vec::new(),
        exception_created_by: None,
        exception_created_at: None,
    };

    if let Some(exception) = exception {
        resolved.has_exception = true;
        resolved.exception_created_by = exception.created_by_id;
        resolved.exception_created_at = Some(exception.created_at);
        apply_overrides(&mut resolved, &exception.overrides);
    }

    resolved
}

fn apply_overrides(resolved: &mut ResolvedInstance, overrides: &ExceptionOverrides) {
    let applied = &mut resolved.applied_overrides;

    if let Some(name) = &overrides.name {
        resolved.name.clone_from(name);
        applied.push("name");
    }
    if let Some(description) = &overrides.description {
        resolved.description = Some(description.clone());
        applied.push("description");
    }
    if let Some(location) = &overrides.location {
        resolved.location = Some(location.clone());
        applied.push("location");
    }
    if let Some(all_day) = overrides.all_day {
        resolved.all_day = all_day;
        applied.push("allDay");
    }
    if let Some(is_public) = overrides.is_public {
        resolved.is_public = is_public;
        applied.push("isPublic");
    }
    if let Some(is_registerable) = overrides.is_registerable {
        resolved.is_registerable = is_registerable;
        applied.push("isRegisterable");
    }
    if let Some(is_invite_only) = overrides.is_invite_only {
        resolved.is_invite_only = is_invite_only;
        applied.push("isInviteOnly");
    }

    // Timing and cancellation decide whether and when the occurrence happens at all.
    if let Some(start) = overrides.actual_start_time {
        resolved.actual_start_time = start;
        applied.push("actualStartTime");
    }
    if let Some(end) = overrides.actual_end_time {
        resolved.actual_end_time = end;
        applied.push("actualEndTime");
    }
    if let Some(is_cancelled) = overrides.is_cancelled {
        resolved.is_cancelled = is_cancelled;
        applied.push("isCancelled");
    }
}

/// ## Summary
/// Resolves many instances against precomputed lookups.
///
/// Instances whose template is absent from `templates` are skipped with a warning.
#[must_use]
pub fn resolve_multiple_instances(
    instances: &[GeneratedInstance],
    templates: &HashMap<Uuid, &RecurringTemplate>,
    exceptions: &HashMap<Uuid, &EventException>,
) -> Vec<ResolvedInstance> {
    instances
        .iter()
        .filter_map(|instance| {
            let Some(template) = templates.get(&instance.base_recurring_event_id) else {
                tracing::warn!(
                    instance_id = %instance.id,
                    base_recurring_event_id = %instance.base_recurring_event_id,
                    "Base template not found for instance, skipping"
                );
                return None;
            };
            Some(resolve_instance(
                instance,
                template,
                exceptions.get(&instance.id).copied(),
            ))
        })
        .collect()
}

/// ## Summary
/// Stable key for an occurrence of a series: `"{base_id}:{rfc3339 start}"`.
#[must_use]
pub fn create_exception_key(base_recurring_event_id: Uuid, original_start: DateTime<Utc>) -> String {
    format!(
        "{base_recurring_event_id}:{}",
        original_start.to_rfc3339_opts(SecondsFormat::Millis, true)
    )
}

#[must_use]
pub fn create_template_lookup_map(templates: &[RecurringTemplate]) -> HashMap<Uuid, &RecurringTemplate> {
    templates.iter().map(|template| (template.id, template)).collect()
}

/// Keyed by the id of the instance each exception applies to.
#[must_use]
pub fn create_exception_lookup_map(exceptions: &[EventException]) -> HashMap<Uuid, &EventException> {
    exceptions
        .iter()
        .map(|exception| (exception.recurring_event_instance_id, exception))
        .collect()
}

/// ## Summary
/// Checks that a resolved instance carries every field required downstream. Logs the first
/// missing field and returns `false` instead of failing.
#[must_use]
pub fn validate_resolved_instance(resolved: &ResolvedInstance) -> bool {
    let missing = [
        ("id", resolved.id.is_nil()),
        ("baseRecurringEventId", resolved.base_recurring_event_id.is_nil()),
        ("recurrenceRuleId", resolved.recurrence_rule_id.is_nil()),
        ("originalSeriesId", resolved.original_series_id.is_nil()),
        ("organizationId", resolved.organization_id.is_nil()),
        ("name", resolved.name.trim().is_empty()),
        ("actualEndTime", resolved.actual_end_time < resolved.actual_start_time),
    ]
    .into_iter()
    .find_map(|(field, missing)| missing.then_some(field));

    if let Some(field) = missing {
        tracing::warn!(instance_id = %resolved.id, field, "Resolved instance is missing a required field");
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{self, utc};
    use cadence_db::db::enums::Frequency;
    use chrono::Duration;

    fn standup() -> (RecurringTemplate, Vec<GeneratedInstance>) {
        let template = fixtures::template(
            Uuid::now_v7(),
            "Standup",
            utc(2024, 1, 1, 9, 0),
            Duration::minutes(15),
        );
        let rule = fixtures::rule(&template, Frequency::Daily);
        let instances = (0..3)
            .map(|day| {
                fixtures::instance(
                    &template,
                    &rule,
                    utc(2024, 1, 1, 9, 0) + Duration::days(day),
                    i32::try_from(day + 1).expect("small"),
                )
            })
            .collect();
        (template, instances)
    }

    #[test]
    fn cancellation_keeps_inherited_content() {
        let (template, instances) = standup();
        let exception = fixtures::exception(
            &instances[1],
            ExceptionOverrides {
                is_cancelled: Some(true),
                ..ExceptionOverrides::default()
            },
        );

        let templates = [template];
        let exceptions = [exception];
        let resolved = resolve_multiple_instances(
            &instances,
            &create_template_lookup_map(&templates),
            &create_exception_lookup_map(&exceptions),
        );

        assert_eq!(resolved.len(), 3);
        assert!(resolved[1].is_cancelled);
        assert_eq!(resolved[1].name, "Standup");
        assert!(resolved[1].has_exception);
        assert_eq!(resolved[1].applied_overrides, vec!["isCancelled"]);

        for sibling in [&resolved[0], &resolved[2]] {
            assert!(!sibling.is_cancelled);
            assert!(!sibling.has_exception);
            assert_eq!(sibling.name, "Standup");
        }
    }

    #[test]
    fn overrides_apply_field_by_field() {
        let (template, instances) = standup();
        let exception = fixtures::exception(
            &instances[0],
            ExceptionOverrides {
                name: Some("Planning".to_owned()),
                location: Some("Room 7".to_owned()),
                actual_start_time: Some(utc(2024, 1, 1, 10, 0)),
                actual_end_time: Some(utc(2024, 1, 1, 11, 0)),
                ..ExceptionOverrides::default()
            },
        );

        let resolved = resolve_instance(&instances[0], &template, Some(&exception));

        assert_eq!(resolved.name, "Planning");
        assert_eq!(resolved.location.as_deref(), Some("Room 7"));
        assert_eq!(resolved.description, template.description);
        assert_eq!(resolved.actual_start_time, utc(2024, 1, 1, 10, 0));
        assert_eq!(resolved.actual_end_time, utc(2024, 1, 1, 11, 0));
        assert_eq!(resolved.original_instance_start_time, utc(2024, 1, 1, 9, 0));
        assert_eq!(resolved.exception_created_by, exception.created_by_id);
        assert!(validate_resolved_instance(&resolved));
    }

    #[test]
    fn missing_template_is_skipped() {
        let (_, instances) = standup();
        let resolved = resolve_multiple_instances(&instances, &HashMap::new(), &HashMap::new());
        assert!(resolved.is_empty());
    }

    #[test]
    fn validation_reports_missing_fields() {
        let (template, instances) = standup();
        let mut resolved = resolve_instance(&instances[0], &template, None);
        assert!(validate_resolved_instance(&resolved));

        resolved.name = "  ".to_owned();
        assert!(!validate_resolved_instance(&resolved));

        resolved.name = "Standup".to_owned();
        resolved.original_series_id = Uuid::nil();
        assert!(!validate_resolved_instance(&resolved));
    }

    #[test]
    fn exception_key_is_stable() {
        let id = Uuid::nil();
        assert_eq!(
            create_exception_key(id, utc(2024, 3, 4, 5, 6)),
            "00000000-0000-0000-0000-000000000000:2024-03-04T05:06:00.000Z"
        );
    }
}
