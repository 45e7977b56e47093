//! Cron expression parsing for the periodic triggers.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;

use cadence_core::error::CoreError;

/// ## Summary
/// Parses a cron expression, promoting the common 5-field form (`min hour dom mon dow`) to
/// the 6-field form the `cron` crate expects by prepending a `0` seconds column.
///
/// ## Errors
/// Returns [`CoreError::InvalidCronExpression`] if the expression does not parse.
pub fn parse_cron_schedule(expression: &str) -> Result<Schedule, CoreError> {
    let trimmed = expression.trim();
    let normalized = if trimmed.split_whitespace().count() == 5 {
        format!("0 {trimmed}")
    } else {
        trimmed.to_owned()
    };

    Schedule::from_str(&normalized).map_err(|err| CoreError::InvalidCronExpression {
        expression: expression.to_owned(),
        reason: err.to_string(),
    })
}

/// Next fire time strictly after `after`.
#[must_use]
pub fn next_fire_time(schedule: &Schedule, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    schedule.after(&after).next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    #[test]
    fn five_field_expressions_are_promoted() {
        let schedule = parse_cron_schedule("0 2 * * *").expect("daily at 02:00");
        let from = Utc.with_ymd_and_hms(2024, 1, 1, 3, 0, 0).unwrap();

        let next = next_fire_time(&schedule, from).expect("next fire");
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 1, 2, 2, 0, 0).unwrap());
    }

    #[test]
    fn six_field_expressions_pass_through() {
        let schedule = parse_cron_schedule("30 */5 * * * *").expect("valid");
        let from = Utc.with_ymd_and_hms(2024, 1, 1, 0, 1, 0).unwrap();

        let next = next_fire_time(&schedule, from).expect("next fire");
        assert_eq!((next.minute(), next.second()), (5, 30));
    }

    #[test]
    fn default_schedules_parse() {
        for expression in [
            cadence_core::constants::DEFAULT_MATERIALIZATION_SCHEDULE,
            cadence_core::constants::DEFAULT_CLEANUP_SCHEDULE,
            cadence_core::constants::DEFAULT_METRICS_SCHEDULE,
        ] {
            assert!(parse_cron_schedule(expression).is_ok(), "{expression}");
        }
    }

    #[test]
    fn garbage_is_rejected() {
        let err = parse_cron_schedule("every hour please").expect_err("invalid");
        assert!(matches!(err, CoreError::InvalidCronExpression { .. }));
    }
}
