//! Calendar primitives shared by the rule model and the occurrence calculator.

use std::fmt;
use std::str::FromStr;

use chrono::Weekday;

use crate::error::CoreError;

/// Two-letter weekday code as used in `BYDAY` lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WeekdayCode {
    Su,
    Mo,
    Tu,
    We,
    Th,
    Fr,
    Sa,
}

impl WeekdayCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Su => "SU",
            Self::Mo => "MO",
            Self::Tu => "TU",
            Self::We => "WE",
            Self::Th => "TH",
            Self::Fr => "FR",
            Self::Sa => "SA",
        }
    }

    #[must_use]
    pub const fn to_weekday(self) -> Weekday {
        match self {
            Self::Su => Weekday::Sun,
            Self::Mo => Weekday::Mon,
            Self::Tu => Weekday::Tue,
            Self::We => Weekday::Wed,
            Self::Th => Weekday::Thu,
            Self::Fr => Weekday::Fri,
            Self::Sa => Weekday::Sat,
        }
    }

    #[must_use]
    pub const fn from_weekday(weekday: Weekday) -> Self {
        match weekday {
            Weekday::Sun => Self::Su,
            Weekday::Mon => Self::Mo,
            Weekday::Tue => Self::Tu,
            Weekday::Wed => Self::We,
            Weekday::Thu => Self::Th,
            Weekday::Fri => Self::Fr,
            Weekday::Sat => Self::Sa,
        }
    }
}

impl fmt::Display for WeekdayCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WeekdayCode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SU" => Ok(Self::Su),
            "MO" => Ok(Self::Mo),
            "TU" => Ok(Self::Tu),
            "WE" => Ok(Self::We),
            "TH" => Ok(Self::Th),
            "FR" => Ok(Self::Fr),
            "SA" => Ok(Self::Sa),
            _ => Err(CoreError::ParseError(format!("unknown weekday code `{s}`"))),
        }
    }
}

/// ## Summary
/// One `BYDAY` entry: a weekday, optionally prefixed by a signed ordinal.
///
/// `"FR"` is every Friday, `"1FR"` the first Friday of the month and `"-1FR"` the last one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ByDayEntry {
    pub ordinal: Option<i8>,
    pub weekday: WeekdayCode,
}

impl ByDayEntry {
    #[must_use]
    pub const fn every(weekday: WeekdayCode) -> Self {
        Self {
            ordinal: None,
            weekday,
        }
    }

    #[must_use]
    pub const fn nth(ordinal: i8, weekday: WeekdayCode) -> Self {
        Self {
            ordinal: Some(ordinal),
            weekday,
        }
    }
}

impl fmt::Display for ByDayEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ordinal) = self.ordinal {
            write!(f, "{ordinal}")?;
        }
        f.write_str(self.weekday.as_str())
    }
}

impl FromStr for ByDayEntry {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let split = trimmed
            .len()
            .checked_sub(2)
            .filter(|idx| trimmed.is_char_boundary(*idx))
            .ok_or_else(|| CoreError::ParseError(format!("invalid BYDAY entry `{s}`")))?;
        let (prefix, code) = trimmed.split_at(split);
        let weekday = code.parse::<WeekdayCode>()?;

        if prefix.is_empty() {
            return Ok(Self::every(weekday));
        }

        let ordinal = prefix
            .parse::<i8>()
            .map_err(|e| CoreError::ParseError(format!("invalid BYDAY ordinal `{prefix}`: {e}")))?;
        if ordinal == 0 || !(-5..=5).contains(&ordinal) {
            return Err(CoreError::ParseError(format!(
                "BYDAY ordinal out of range in `{s}`"
            )));
        }

        Ok(Self::nth(ordinal, weekday))
    }
}
