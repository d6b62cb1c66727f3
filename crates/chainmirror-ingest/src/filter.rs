//! Date-range selection of listing entries

use chainmirror_common::{CommonError, Result};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::listing::ListingEntry;

/// Which side of a range a bound closes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    Start,
    End,
}

/// Inclusive `[start, end]` publication window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    start: NaiveDateTime,
    end: NaiveDateTime,
}

impl DateRange {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Result<Self> {
        if start > end {
            return Err(CommonError::config(format!(
                "start of date range ({}) is after its end ({})",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    /// Build a range from operator input, see [`parse_bound`]
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        Self::new(parse_bound(start, Bound::Start)?, parse_bound(end, Bound::End)?)
    }

    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    pub fn end(&self) -> NaiveDateTime {
        self.end
    }

    /// Both endpoints are included
    pub fn contains(&self, ts: NaiveDateTime) -> bool {
        self.start <= ts && ts <= self.end
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// Parse one bound of a date range
///
/// Accepts `YYYY-MM-DD`, `YYYY-MM-DD HH:MM` and `YYYY-MM-DD HH:MM:SS`
/// (a `T` separator works too). A bare date opens at 00:00:00 when used as
/// a start and closes at 23:59:59 when used as an end.
pub fn parse_bound(text: &str, bound: Bound) -> Result<NaiveDateTime> {
    let text = text.trim();

    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(ts);
        }
    }

    let date = NaiveDate::parse_from_str(text, "%Y-%m-%d").map_err(|e| {
        CommonError::parse(format!(
            "invalid date '{}' (expected YYYY-MM-DD[ HH:MM[:SS]]): {}",
            text, e
        ))
    })?;

    let time = match bound {
        Bound::Start => NaiveTime::MIN,
        Bound::End => NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN),
    };
    Ok(date.and_time(time))
}

/// Keep entries published inside `range`, in listing order
///
/// Entries without a valid timestamp never match.
pub fn filter_by_date_range(entries: Vec<ListingEntry>, range: &DateRange) -> Vec<ListingEntry> {
    entries
        .into_iter()
        .filter(|entry| entry.published_at.is_some_and(|ts| range.contains(ts)))
        .collect()
}
