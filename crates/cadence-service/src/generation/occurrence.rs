//! Expansion of a recurrence rule into concrete occurrences.
//!
//! ## Summary
//! Candidates are produced period by period (a day, a week, a month or a year, stepped by
//! the rule's interval from the base start) and filtered against the rule's bounds. Only
//! candidates inside `[window_start, window_end)` are emitted, except for yearly series
//! which are emitted whole. Sequence numbers count every accepted candidate from the base
//! start, inside the window or not.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Datelike, Months, NaiveDate, NaiveTime, TimeDelta, Utc, Weekday};

use cadence_core::constants::{MAX_ITERATIONS_BOUNDED, MAX_ITERATIONS_UNBOUNDED};
use cadence_core::types::ByDayEntry;
use cadence_db::db::enums::Frequency;
use cadence_db::model::exception::EventException;
use cadence_db::model::rule::RecurrenceRule;
use cadence_db::model::template::RecurringTemplate;

use super::rule::{NormalizedRule, normalize_recurrence_rule};

/// Inputs for one expansion.
#[derive(Debug, Clone, Copy)]
pub struct OccurrenceRequest<'a> {
    pub rule: &'a RecurrenceRule,
    pub template: &'a RecurringTemplate,
    pub window_start: DateTime<Utc>,
    /// Exclusive.
    pub window_end: DateTime<Utc>,
    pub exceptions: &'a [EventException],
}

/// One computed occurrence, exception-adjusted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalculatedOccurrence {
    pub original_start_time: DateTime<Utc>,
    pub actual_start_time: DateTime<Utc>,
    pub actual_end_time: DateTime<Utc>,
    pub is_cancelled: bool,
    /// 1-based position in the series.
    pub sequence_number: i32,
    /// Series length, `None` for never-ending series.
    pub total_count: Option<i32>,
}

/// ## Summary
/// Expands `request.rule` against the template's first occurrence and returns the
/// occurrences inside the window in ascending original start order.
///
/// A template without a start or end yields nothing. Hitting the iteration cap truncates
/// the output and logs a warning.
#[must_use]
pub fn calculate_occurrences(request: &OccurrenceRequest<'_>) -> Vec<CalculatedOccurrence> {
    let Some((base_start, base_end)) = request.template.first_occurrence() else {
        tracing::warn!(
            template_id = %request.template.id,
            "Template has no start or end time, skipping occurrence calculation"
        );
        return Vec::new();
    };

    let duration = base_end - base_start;
    let rule = normalize_recurrence_rule(request.rule, base_start);
    let max_iterations = if rule.is_never_ending() {
        MAX_ITERATIONS_UNBOUNDED
    } else {
        MAX_ITERATIONS_BOUNDED
    };

    let clip_to_window = rule.frequency != Frequency::Yearly;
    // A series bounded only by its end date learns its length by scanning to that end.
    let measure_series = rule.count.is_none() && rule.end_date.is_some();
    let scan_past_window = measure_series || (!clip_to_window && !rule.is_never_ending());

    let exceptions: HashMap<DateTime<Utc>, &EventException> = request
        .exceptions
        .iter()
        .map(|exception| (exception.original_instance_start_time, exception))
        .collect();

    let mut occurrences = Vec::new();
    let mut accepted: u32 = 0;
    let mut iterations = 0;
    let mut truncated = false;

    for candidate in Candidates::new(&rule, base_start) {
        iterations += 1;
        if iterations > max_iterations {
            truncated = true;
            break;
        }

        let Some(candidate) = candidate else {
            continue;
        };
        if candidate < base_start {
            continue;
        }
        // A count-derived end date is only an estimate; the count itself bounds the series.
        if !rule.end_date_derived && rule.end_date.is_some_and(|end| candidate > end) {
            break;
        }
        if !scan_past_window && candidate >= request.window_end {
            break;
        }
        if rule.count.is_some_and(|count| accepted >= count) {
            break;
        }

        accepted += 1;

        let in_window = candidate >= request.window_start && candidate < request.window_end;
        if clip_to_window && !in_window {
            continue;
        }

        occurrences.push(build_occurrence(
            candidate,
            duration,
            accepted,
            exceptions.get(&candidate).copied(),
        ));
    }

    if truncated {
        tracing::warn!(
            rule_id = %request.rule.id,
            template_id = %request.template.id,
            max_iterations,
            emitted = occurrences.len(),
            "Occurrence expansion hit the iteration cap; output truncated"
        );
    }

    let total_count = match (rule.count, measure_series) {
        (Some(count), _) => Some(count),
        (None, true) => Some(accepted),
        (None, false) => None,
    }
    .map(to_i32);

    for occurrence in &mut occurrences {
        occurrence.total_count = total_count;
    }

    occurrences
}

fn build_occurrence(
    original_start: DateTime<Utc>,
    duration: TimeDelta,
    sequence: u32,
    exception: Option<&EventException>,
) -> CalculatedOccurrence {
    let overrides = exception.map(|exception| &exception.overrides);

    let actual_start_time = overrides
        .and_then(|o| o.actual_start_time)
        .unwrap_or(original_start);
    // A moved start without an explicit end keeps the series duration.
    let actual_end_time = overrides
        .and_then(|o| o.actual_end_time)
        .unwrap_or(actual_start_time + duration);

    CalculatedOccurrence {
        original_start_time: original_start,
        actual_start_time,
        actual_end_time,
        is_cancelled: overrides.and_then(|o| o.is_cancelled).unwrap_or(false),
        sequence_number: to_i32(sequence),
        total_count: None,
    }
}

fn to_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

/// Candidate dates in ascending order. Each item is one unit of work for the iteration
/// cap: `Some(date)` is a candidate, `None` is a period where the filters matched nothing.
struct Candidates<'a> {
    rule: &'a NormalizedRule,
    base: DateTime<Utc>,
    time: NaiveTime,
    period: u32,
    pending: VecDeque<DateTime<Utc>>,
    exhausted: bool,
}

impl<'a> Candidates<'a> {
    fn new(rule: &'a NormalizedRule, base: DateTime<Utc>) -> Self {
        Self {
            rule,
            base,
            time: base.time(),
            period: 0,
            pending: VecDeque::new(),
            exhausted: false,
        }
    }

    /// Candidates of the current period, or `None` once dates overflow.
    fn next_period(&mut self) -> Option<Vec<DateTime<Utc>>> {
        let step = self.period.checked_mul(self.rule.interval)?;
        self.period = self.period.checked_add(1)?;

        let mut dates = match self.rule.frequency {
            Frequency::Daily => vec![self.base.checked_add_signed(TimeDelta::try_days(i64::from(step))?)?],
            Frequency::Weekly if self.rule.by_day.is_empty() => {
                vec![self.base.checked_add_signed(TimeDelta::try_weeks(i64::from(step))?)?]
            }
            Frequency::Weekly => self.weekly_by_day(step)?,
            Frequency::Monthly if self.rule.by_day.is_empty() && self.rule.by_month_day.is_empty() => {
                vec![self.base.checked_add_months(Months::new(step))?]
            }
            Frequency::Monthly => {
                let month = first_of_month(self.base.date_naive())?.checked_add_months(Months::new(step))?;
                self.month_candidates(month)
            }
            Frequency::Yearly if self.rule.by_month.is_empty() && self.rule.by_month_day.is_empty() => {
                vec![self.base.checked_add_months(Months::new(step.checked_mul(12)?))?]
            }
            Frequency::Yearly => self.yearly_filtered(step)?,
        };

        dates.sort_unstable();
        dates.dedup();
        Some(dates)
    }

    /// Days of the Monday-based week `step` weeks after the base week whose weekday is listed.
    fn weekly_by_day(&self, step: u32) -> Option<Vec<DateTime<Utc>>> {
        let base_date = self.base.date_naive();
        let week_start = base_date
            .checked_sub_signed(TimeDelta::try_days(i64::from(
                base_date.weekday().num_days_from_monday(),
            ))?)?
            .checked_add_signed(TimeDelta::try_weeks(i64::from(step))?)?;

        Some(
            week_start
                .iter_days()
                .take(7)
                .filter(|day| {
                    self.rule
                        .by_day
                        .iter()
                        .any(|entry| entry.weekday.to_weekday() == day.weekday())
                })
                .map(|day| self.at_base_time(day))
                .collect(),
        )
    }

    /// Candidates within the month starting at `month`.
    fn month_candidates(&self, month: NaiveDate) -> Vec<DateTime<Utc>> {
        let (year, month_number) = (month.year(), month.month());

        if self.rule.by_day.is_empty() {
            return self
                .rule
                .by_month_day
                .iter()
                .filter_map(|day| month_day(year, month_number, *day))
                .map(|day| self.at_base_time(day))
                .collect();
        }

        self.rule
            .by_day
            .iter()
            .flat_map(|entry| weekday_dates(year, month_number, *entry))
            .map(|day| self.at_base_time(day))
            .collect()
    }

    /// Candidates of the year `step` years after the base year, scanned month by month.
    fn yearly_filtered(&self, step: u32) -> Option<Vec<DateTime<Utc>>> {
        let year = self.base.year().checked_add(i32::try_from(step).ok()?)?;
        let base_day = i32::try_from(self.base.day()).ok()?;

        let mut dates = Vec::new();
        for month in 1..=12 {
            if !self.rule.by_month.is_empty() && !self.rule.by_month.contains(&month) {
                continue;
            }
            if self.rule.by_month_day.is_empty() {
                dates.extend(month_day(year, month, base_day).map(|day| self.at_base_time(day)));
            } else {
                dates.extend(
                    self.rule
                        .by_month_day
                        .iter()
                        .filter_map(|day| month_day(year, month, *day))
                        .map(|day| self.at_base_time(day)),
                );
            }
        }
        Some(dates)
    }

    fn at_base_time(&self, day: NaiveDate) -> DateTime<Utc> {
        day.and_time(self.time).and_utc()
    }
}

impl Iterator for Candidates<'_> {
    type Item = Option<DateTime<Utc>>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(date) = self.pending.pop_front() {
            return Some(Some(date));
        }
        if self.exhausted {
            return None;
        }

        match self.next_period() {
            Some(dates) if dates.is_empty() => Some(None),
            Some(dates) => {
                self.pending.extend(dates);
                self.pending.pop_front().map(Some)
            }
            None => {
                self.exhausted = true;
                None
            }
        }
    }
}

fn first_of_month(date: NaiveDate) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(date.year(), date.month(), 1)
}

fn last_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, 1)?
        .checked_add_months(Months::new(1))?
        .pred_opt()
}

/// Resolves a possibly negative day-of-month; `None` when the month is too short.
fn month_day(year: i32, month: u32, day: i32) -> Option<NaiveDate> {
    if day > 0 {
        return NaiveDate::from_ymd_opt(year, month, day.unsigned_abs());
    }

    let last = last_of_month(year, month)?;
    let back = day.unsigned_abs().checked_sub(1)?;
    let resolved = last.day().checked_sub(back).filter(|resolved| *resolved >= 1)?;
    NaiveDate::from_ymd_opt(year, month, resolved)
}

/// Dates in a month matching a `BYDAY` entry: the nth (or nth-from-last) weekday when an
/// ordinal is present, every such weekday otherwise.
fn weekday_dates(year: i32, month: u32, entry: ByDayEntry) -> Vec<NaiveDate> {
    let weekday = entry.weekday.to_weekday();
    match entry.ordinal {
        None => (1..=5u8)
            .filter_map(|n| NaiveDate::from_weekday_of_month_opt(year, month, weekday, n))
            .collect(),
        Some(n) if n > 0 => {
            NaiveDate::from_weekday_of_month_opt(year, month, weekday, n.unsigned_abs())
                .into_iter()
                .collect()
        }
        Some(n) => nth_last_weekday(year, month, weekday, n.unsigned_abs())
            .into_iter()
            .collect(),
    }
}

fn nth_last_weekday(year: i32, month: u32, weekday: Weekday, n: u8) -> Option<NaiveDate> {
    let last = last_of_month(year, month)?;
    let offset = (7 + last.weekday().num_days_from_monday() - weekday.num_days_from_monday()) % 7;
    let back = offset + u32::from(n.checked_sub(1)?) * 7;
    let day = last.day().checked_sub(back).filter(|day| *day >= 1)?;
    NaiveDate::from_ymd_opt(year, month, day)
}
