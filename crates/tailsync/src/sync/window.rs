//! Time-window utilities.
//!
//! Month arithmetic, validity checks against "now", sub-window partitioning
//! and page query construction. Everything here is a pure function of its
//! inputs; "now" is always passed in.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Months, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::error::SyncError;
use crate::source::{PAGE_SIZE, PageRequest};

/// A calendar month (UTC).
///
/// Serialized as `YYYY-MM`. Parsing also accepts a full `YYYY-MM-DD` date and
/// truncates it to its month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Month {
    /// Always the first day of the month.
    first_day: NaiveDate,
}

impl Month {
    /// Month of the given calendar date.
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            first_day: date.with_day(1).unwrap_or(date),
        }
    }

    /// Month containing the given instant.
    pub fn containing(instant: DateTime<Utc>) -> Self {
        Self::from_date(instant.date_naive())
    }

    pub fn new(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(|first_day| Self { first_day })
    }

    pub fn year(self) -> i32 {
        self.first_day.year()
    }

    pub fn month(self) -> u32 {
        self.first_day.month()
    }

    /// The following month.
    ///
    /// # Errors
    /// Returns [`SyncError::Validation`] past the end of chrono's calendar.
    pub fn next(self) -> Result<Self, SyncError> {
        self.first_day
            .checked_add_months(Months::new(1))
            .map(|first_day| Self { first_day })
            .ok_or_else(|| SyncError::Validation(format!("no month after {self}")))
    }

    /// Midnight UTC on the first day.
    pub fn start(self) -> DateTime<Utc> {
        Utc.from_utc_datetime(&self.first_day.and_time(chrono::NaiveTime::MIN))
    }

    /// Start of the following month, the exclusive end of this one.
    pub fn end(self) -> Result<DateTime<Utc>, SyncError> {
        self.next().map(Month::start)
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year(), self.month())
    }
}

impl FromStr for Month {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            return Ok(Self::from_date(date));
        }
        NaiveDate::parse_from_str(&format!("{s}-01"), "%Y-%m-%d")
            .map(Self::from_date)
            .map_err(|_| SyncError::Validation(format!("invalid month or date: {s:?}")))
    }
}

impl TryFrom<String> for Month {
    type Error = SyncError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Month> for String {
    fn from(month: Month) -> Self {
        month.to_string()
    }
}

/// Whether `month` may be assigned at `now`: no later than the current month.
pub fn is_assignable(month: Month, now: DateTime<Utc>) -> bool {
    month <= Month::containing(now)
}

/// Whether `month` is the month containing `now`.
pub fn is_current(month: Month, now: DateTime<Utc>) -> bool {
    month == Month::containing(now)
}

/// The month after `cursor`, if it is assignable at `now`.
///
/// # Errors
/// Returns [`SyncError::Validation`] when the next month lies in the future.
/// Callers treat this as "no further month", not as a failure.
pub fn next_assignable(cursor: Month, now: DateTime<Utc>) -> Result<Month, SyncError> {
    let next = cursor.next()?;
    if is_assignable(next, now) {
        Ok(next)
    } else {
        Err(SyncError::Validation(format!(
            "{next} is later than the current month {}",
            Month::containing(now)
        )))
    }
}

/// A worker's slice of a month.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubWindow {
    pub start: DateTime<Utc>,
    /// `None` for the open-ended slice of the current month.
    pub end: Option<DateTime<Utc>>,
}

impl SubWindow {
    pub fn is_open_ended(&self) -> bool {
        self.end.is_none()
    }
}

/// Split `month` into `workers` disjoint, equal-length sub-windows.
///
/// A past month is covered up to the start of the next month. For the month
/// containing `now` only the elapsed part is split and the last slice is
/// open-ended so it keeps following live data. Slices are whole seconds
/// (the upstream's timestamp resolution); when the span is too short for
/// `workers` slices, fewer are returned. At least one is always returned.
///
/// # Errors
/// Returns [`SyncError::Validation`] if `month` is later than `now`.
pub fn partition(
    month: Month,
    workers: usize,
    now: DateTime<Utc>,
) -> Result<Vec<SubWindow>, SyncError> {
    if !is_assignable(month, now) {
        return Err(SyncError::Validation(format!(
            "cannot partition {month}: later than {}",
            Month::containing(now)
        )));
    }

    let start = month.start();
    let current = is_current(month, now);
    let end = if current { now } else { month.end()? };

    let span = (end - start).num_seconds().max(0);
    let workers = (workers.max(1) as i64).min(span.max(1));
    let step = span / workers;

    let windows = (0..workers)
        .map(|i| {
            let window_start = start + chrono::Duration::seconds(step * i);
            let window_end = if i + 1 == workers {
                (!current).then_some(end)
            } else {
                Some(start + chrono::Duration::seconds(step * (i + 1)))
            };
            SubWindow {
                start: window_start,
                end: window_end,
            }
        })
        .collect();

    Ok(windows)
}

/// Build the query string for a page request.
///
/// Parameters are emitted in a fixed order: ordering, soft-delete inclusion,
/// page size, window bounds (unix seconds), continuation, then one `contract`
/// per allowed contract.
pub fn page_query(request: &PageRequest) -> String {
    let mut query = url::form_urlencoded::Serializer::new(String::new());
    query
        .append_pair("orderBy", "updated_at")
        .append_pair("sortDirection", "asc")
        .append_pair("includeDeleted", "true")
        .append_pair("limit", &PAGE_SIZE.to_string())
        .append_pair("startTimestamp", &request.start.timestamp().to_string());

    if let Some(end) = request.end {
        query.append_pair("endTimestamp", &end.timestamp().to_string());
    }
    if let Some(ref continuation) = request.continuation {
        query.append_pair("continuation", continuation);
    }
    for contract in &request.contracts {
        query.append_pair("contract", contract);
    }

    query.finish()
}
