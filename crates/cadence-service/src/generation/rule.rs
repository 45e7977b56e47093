//! Recurrence rule validation, normalization and estimation.

use chrono::{DateTime, Months, TimeDelta, Utc};
use rrule::{NWeekday, RRule, Tz, Unvalidated};
use serde::Serialize;

use cadence_core::types::{ByDayEntry, WeekdayCode};
use cadence_db::db::enums::Frequency;
use cadence_db::model::rule::{NewRecurrenceRule, RecurrenceRule};
use uuid::Uuid;

use crate::error::{ServiceError, ServiceResult};

/// A rule with its filters parsed and its bound made explicit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedRule {
    pub frequency: Frequency,
    pub interval: u32,
    /// Authoritative end date: the stored one, or one derived from `count`.
    pub end_date: Option<DateTime<Utc>>,
    /// `true` when `end_date` was derived from `count`.
    pub end_date_derived: bool,
    /// Original count, kept for exact limit enforcement.
    pub count: Option<u32>,
    pub by_day: Vec<ByDayEntry>,
    /// Months 1..=12.
    pub by_month: Vec<u32>,
    /// Days -31..=31 excluding 0; negative values count from the end of the month.
    pub by_month_day: Vec<i32>,
}

impl NormalizedRule {
    #[must_use]
    pub const fn is_never_ending(&self) -> bool {
        self.end_date.is_none()
    }

    /// Candidates per period, used for rough estimates.
    fn entries_per_period(&self) -> u32 {
        let entries = match self.frequency {
            Frequency::Daily => 1,
            Frequency::Weekly => self.by_day.len(),
            Frequency::Monthly if !self.by_day.is_empty() => self
                .by_day
                .iter()
                .map(|entry| if entry.ordinal.is_some() { 1 } else { 4 })
                .sum(),
            Frequency::Monthly => self.by_month_day.len(),
            Frequency::Yearly => {
                let months = if self.by_month.is_empty() && !self.by_month_day.is_empty() {
                    12
                } else {
                    self.by_month.len().max(1)
                };
                months * self.by_month_day.len().max(1)
            }
        };
        u32::try_from(entries.max(1)).unwrap_or(u32::MAX)
    }
}

/// ## Summary
/// Checks the structural validity of a rule.
///
/// The frequency is guaranteed by its type; the interval must be at least 1 and a count,
/// when present, must be positive.
#[must_use]
pub fn validate_recurrence_rule(rule: &RecurrenceRule) -> bool {
    rule.interval >= 1 && rule.count.is_none_or(|count| count >= 1)
}

/// ## Summary
/// Parses the rule's filters and converts a count into a provisional end date.
///
/// The derived end date is an estimate used to size generation windows. Sparse filters can
/// place the last occurrence after it, so expansion stops on the count, not on this date.
/// Unparseable `BYDAY` entries and out-of-range month or day values are dropped.
#[must_use]
pub fn normalize_recurrence_rule(rule: &RecurrenceRule, base_start: DateTime<Utc>) -> NormalizedRule {
    let by_day = rule
        .by_day
        .iter()
        .filter_map(|raw| match raw.parse::<ByDayEntry>() {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::debug!(rule_id = %rule.id, entry = %raw, error = %e, "Ignoring BYDAY entry");
                None
            }
        })
        .collect();

    let mut normalized = NormalizedRule {
        frequency: rule.frequency,
        interval: u32::try_from(rule.interval.max(1)).unwrap_or(1),
        end_date: rule.recurrence_end_date,
        end_date_derived: false,
        count: rule.count.and_then(|count| u32::try_from(count).ok()),
        by_day,
        by_month: rule
            .by_month
            .iter()
            .filter_map(|month| u32::try_from(*month).ok())
            .filter(|month| (1..=12).contains(month))
            .collect(),
        by_month_day: rule
            .by_month_day
            .iter()
            .copied()
            .filter(|day| *day != 0 && (-31..=31).contains(day))
            .collect(),
    };

    if let (None, Some(count)) = (normalized.end_date, normalized.count) {
        normalized.end_date = completion_date(&normalized, base_start, count);
        normalized.end_date_derived = true;
    }

    normalized
}

/// Generous estimate of the date of the `count`-th occurrence.
fn completion_date(
    rule: &NormalizedRule,
    base_start: DateTime<Utc>,
    count: u32,
) -> Option<DateTime<Utc>> {
    let interval = rule.interval;
    let filtered = match rule.frequency {
        Frequency::Daily => false,
        Frequency::Weekly => !rule.by_day.is_empty(),
        Frequency::Monthly => !rule.by_day.is_empty() || !rule.by_month_day.is_empty(),
        Frequency::Yearly => !rule.by_month.is_empty() || !rule.by_month_day.is_empty(),
    };

    // Periods needed if every period yielded its full share of candidates, plus slack for
    // periods where a filter matches nothing (e.g. the 31st in a 30-day month).
    let periods = if filtered {
        count
            .div_ceil(rule.entries_per_period())
            .saturating_mul(3)
            .saturating_add(1)
    } else {
        count.saturating_sub(1)
    };
    let steps = periods.saturating_mul(interval);

    match rule.frequency {
        Frequency::Daily => base_start.checked_add_signed(TimeDelta::try_days(i64::from(steps))?),
        Frequency::Weekly => {
            base_start.checked_add_signed(TimeDelta::try_weeks(i64::from(steps) + 1)?)
        }
        Frequency::Monthly => base_start.checked_add_months(Months::new(steps)),
        Frequency::Yearly => base_start.checked_add_months(Months::new(steps.saturating_mul(12))),
    }
}

/// ## Summary
/// Cheap closed-form estimate of how many occurrences a rule produces between its start
/// and `horizon_end` (or its own end, whichever is earlier).
#[must_use]
pub fn estimate_instance_count(
    rule: &RecurrenceRule,
    base_start: DateTime<Utc>,
    horizon_end: DateTime<Utc>,
) -> u64 {
    let normalized = normalize_recurrence_rule(rule, base_start);
    if let Some(count) = normalized.count {
        return u64::from(count);
    }

    let span_end = normalized
        .end_date
        .map_or(horizon_end, |end| end.min(horizon_end));
    let days = u64::try_from((span_end - base_start).num_days()).unwrap_or(0);
    let period_days = match normalized.frequency {
        Frequency::Daily => 1,
        Frequency::Weekly => 7,
        Frequency::Monthly => 30,
        Frequency::Yearly => 365,
    };

    (days / (period_days * u64::from(normalized.interval)) + 1)
        * u64::from(normalized.entries_per_period())
}

/// Rule fields parsed from RFC 5545 `RRULE` text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleParameters {
    pub frequency: Frequency,
    pub interval: i32,
    pub count: Option<i32>,
    pub until: Option<DateTime<Utc>>,
    pub by_day: Vec<String>,
    pub by_month: Vec<i32>,
    pub by_month_day: Vec<i32>,
}

impl RuleParameters {
    /// ## Summary
    /// Builds an insertable rule for a template.
    #[must_use]
    pub fn into_new_rule(
        self,
        base_recurring_event_id: Uuid,
        recurrence_start_date: DateTime<Utc>,
        original_series_id: Option<Uuid>,
    ) -> NewRecurrenceRule {
        NewRecurrenceRule {
            base_recurring_event_id,
            original_series_id,
            frequency: self.frequency,
            interval: self.interval,
            recurrence_start_date,
            recurrence_end_date: self.until,
            count: self.count,
            by_day: self.by_day,
            by_month: self.by_month,
            by_month_day: self.by_month_day,
        }
    }
}

/// ## Summary
/// Parses an `RRULE` line (with or without the `RRULE:` prefix) into rule parameters.
///
/// ## Errors
/// Returns an error if the text is not a valid rule for `dt_start`, or if it uses a
/// frequency finer than daily.
pub fn parse_rrule_text(text: &str, dt_start: DateTime<Utc>) -> ServiceResult<RuleParameters> {
    let body = text.trim();
    let body = body.strip_prefix("RRULE:").unwrap_or(body);
    let invalid = |reason: String| ServiceError::ValidationError(format!("invalid RRULE: {reason}"));

    let rrule = body
        .parse::<RRule<Unvalidated>>()
        .map_err(|err| invalid(err.to_string()))?;
    rrule
        .clone()
        .build(dt_start.with_timezone(&Tz::UTC))
        .map_err(|err| invalid(err.to_string()))?;

    let frequency = match rrule.get_freq() {
        rrule::Frequency::Daily => Frequency::Daily,
        rrule::Frequency::Weekly => Frequency::Weekly,
        rrule::Frequency::Monthly => Frequency::Monthly,
        rrule::Frequency::Yearly => Frequency::Yearly,
        other => return Err(invalid(format!("unsupported frequency {other:?}"))),
    };

    let by_day = rrule
        .get_by_weekday()
        .iter()
        .map(|weekday| match weekday {
            NWeekday::Every(day) => ByDayEntry::every(WeekdayCode::from_weekday(*day)).to_string(),
            NWeekday::Nth(n, day) => format!("{n}{}", WeekdayCode::from_weekday(*day)),
        })
        .collect();

    Ok(RuleParameters {
        frequency,
        interval: i32::from(rrule.get_interval()),
        count: rrule
            .get_count()
            .map(|count| i32::try_from(count).unwrap_or(i32::MAX)),
        until: rrule.get_until().map(|until| until.with_timezone(&Utc)),
        by_day,
        by_month: rrule.get_by_month().iter().map(|m| i32::from(*m)).collect(),
        by_month_day: rrule
            .get_by_month_day()
            .iter()
            .map(|d| i32::from(*d))
            .collect(),
    })
}
