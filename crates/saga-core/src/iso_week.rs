//! ISO 8601 week arithmetic.
//!
//! Week 1 of an ISO year is the week containing January 4th. Weeks run
//! Monday 00:00:00 through Sunday 23:59:59 (UTC).

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use time::macros::time;
use time::{Date, Duration, Month, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};

use crate::error::{Error, Result};

/// Highest week number a label may carry.
pub const MAX_WEEK: u32 = 53;

/// An ISO (year, week) pair. Ordering is chronological.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IsoWeek {
    pub year: i32,
    pub week: u32,
}

fn label_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{4})-W(\d{2})$").expect("week label regex"))
}

impl IsoWeek {
    /// Build a week, rejecting week numbers outside 1..=53.
    pub fn new(year: i32, week: u32) -> Result<Self> {
        if week == 0 || week > MAX_WEEK {
            return Err(Error::InvalidWeek { year, week });
        }
        Ok(Self { year, week })
    }

    /// Parse `YYYY-Www` (e.g. `2024-W07`).
    pub fn parse(label: &str) -> Result<Self> {
        let format_err = |reason: &str| Error::WeekFormat {
            label: label.to_string(),
            reason: reason.to_string(),
        };
        let caps = label_re()
            .captures(label)
            .ok_or_else(|| format_err("expected YYYY-Www"))?;
        let year: i32 = caps[1]
            .parse()
            .map_err(|_| format_err("year is not a number"))?;
        let week: u32 = caps[2]
            .parse()
            .map_err(|_| format_err("week is not a number"))?;
        if week == 0 || week > MAX_WEEK {
            return Err(format_err("week must be between 01 and 53"));
        }
        Ok(Self { year, week })
    }

    /// `YYYY-Www`, week zero-padded to two digits.
    pub fn label(&self) -> String {
        format!("{:04}-W{:02}", self.year, self.week)
    }

    /// Inclusive bounds: Monday 00:00:00 through Sunday 23:59:59 UTC.
    ///
    /// Fails for week 53 of a year that only has 52 ISO weeks.
    pub fn bounds(&self) -> Result<(OffsetDateTime, OffsetDateTime)> {
        let invalid = || Error::InvalidWeek {
            year: self.year,
            week: self.week,
        };
        if self.week == 0 || self.week > u32::from(time::util::weeks_in_year(self.year)) {
            return Err(invalid());
        }
        let jan4 = Date::from_calendar_date(self.year, Month::January, 4).map_err(|_| invalid())?;
        let week1_monday =
            jan4 - Duration::days(i64::from(jan4.weekday().number_days_from_monday()));
        let monday = week1_monday + Duration::weeks(i64::from(self.week) - 1);
        let sunday = monday + Duration::days(6);

        let start = PrimitiveDateTime::new(monday, Time::MIDNIGHT).assume_utc();
        let end = PrimitiveDateTime::new(sunday, time!(23:59:59)).assume_utc();
        Ok((start, end))
    }

    /// The ISO week a timestamp falls in, evaluated in UTC.
    pub fn containing(ts: OffsetDateTime) -> Self {
        Self::of_date(ts.to_offset(UtcOffset::UTC).date())
    }

    pub fn of_date(date: Date) -> Self {
        let (year, week, _) = date.to_iso_week_date();
        Self {
            year,
            week: u32::from(week),
        }
    }

    /// The week before this one, rolling week 1 back into the last week of
    /// the previous ISO year.
    pub fn previous(&self) -> Self {
        if self.week <= 1 {
            let year = self.year - 1;
            Self {
                year,
                week: u32::from(time::util::weeks_in_year(year)),
            }
        } else {
            Self {
                year: self.year,
                week: self.week - 1,
            }
        }
    }
}

impl fmt::Display for IsoWeek {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

impl FromStr for IsoWeek {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Every ISO week whose span intersects `[start, end]`, oldest first, each once.
///
/// Steps a week at a time from the Monday on or before `start`.
pub fn weeks_in_range(start: Date, end: Date) -> Vec<IsoWeek> {
    if end < start {
        return Vec::new();
    }
    let mut cursor = start - Duration::days(i64::from(start.weekday().number_days_from_monday()));
    let mut weeks: Vec<IsoWeek> = Vec::new();
    while cursor <= end {
        let week = IsoWeek::of_date(cursor);
        if weeks.last() != Some(&week) {
            weeks.push(week);
        }
        match cursor.checked_add(Duration::weeks(1)) {
            Some(next) => cursor = next,
            None => break,
        }
    }
    weeks
}
