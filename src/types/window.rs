// src/types/window.rs
//! Half-open time windows over the search domain.

use super::ValidationError;
use crate::constants::{GITHUB_LAUNCH_DATE, WINDOW_GRANULARITY_SECS};
use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// A half-open interval `[start, end)` of creation timestamps.
///
/// Both bounds sit on whole seconds and `start < end` always holds. Windows
/// produced by [`Window::split`] tile their parent exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "WindowBounds")]
pub struct Window {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

/// Unchecked wire form; deserialized windows go through [`Window::new`].
#[derive(Deserialize)]
struct WindowBounds {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TryFrom<WindowBounds> for Window {
    type Error = ValidationError;

    fn try_from(bounds: WindowBounds) -> Result<Self, Self::Error> {
        Self::new(bounds.start, bounds.end)
    }
}

impl Window {
    /// Creates a window, truncating both bounds to whole seconds.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, ValidationError> {
        let start = truncate_to_second(start);
        let end = truncate_to_second(end);
        if start >= end {
            return Err(ValidationError::EmptyWindow {
                start: start.format(TIMESTAMP_FORMAT).to_string(),
                end: end.format(TIMESTAMP_FORMAT).to_string(),
            });
        }
        Ok(Self { start, end })
    }

    /// Builds the top-level search window from calendar dates, both inclusive.
    ///
    /// The end date is advanced by one day so that repositories created on it
    /// are included. This is the only place that adjustment happens; windows
    /// derived by splitting keep their exclusive ends untouched.
    pub fn from_inclusive_dates(
        start: NaiveDate,
        end_inclusive: NaiveDate,
        today: NaiveDate,
    ) -> Result<Self, ValidationError> {
        let earliest = github_launch_date();
        for date in [start, end_inclusive] {
            if date < earliest || date > today {
                return Err(ValidationError::DateOutOfRange {
                    date: date.to_string(),
                    earliest: earliest.to_string(),
                    latest: today.to_string(),
                });
            }
        }

        let end_exclusive = end_inclusive
            .checked_add_days(Days::new(1))
            .ok_or_else(|| ValidationError::DateOutOfRange {
                date: end_inclusive.to_string(),
                earliest: earliest.to_string(),
                latest: today.to_string(),
            })?;

        Self::new(midnight(start), midnight(end_exclusive))
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// The last whole second inside the window, for inclusive range syntax.
    pub fn last_second(&self) -> DateTime<Utc> {
        self.end - chrono::Duration::seconds(WINDOW_GRANULARITY_SECS)
    }

    pub fn duration_secs(&self) -> i64 {
        (self.end - self.start).num_seconds()
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }

    /// Whether the window is wide enough to be divided at all.
    pub fn is_divisible(&self) -> bool {
        self.duration_secs() >= 2 * WINDOW_GRANULARITY_SECS
    }

    /// Splits the window into `parts` contiguous sub-windows of (nearly) equal
    /// length, in left-to-right order.
    ///
    /// Boundaries are computed from the timestamps alone, so the same window
    /// always yields the same tiling. When the window holds fewer whole
    /// seconds than `parts`, it is split into one-second windows instead.
    pub fn split(&self, parts: u32) -> Vec<Window> {
        let units = self.duration_secs() / WINDOW_GRANULARITY_SECS;
        let parts = i64::from(parts.max(1)).min(units).max(1);
        let span = self.duration_secs();

        let boundary = |i: i64| {
            let offset = (i128::from(span) * i128::from(i) / i128::from(parts)) as i64;
            let offset = offset - offset % WINDOW_GRANULARITY_SECS;
            self.start + chrono::Duration::seconds(offset)
        };

        (0..parts)
            .map(|i| {
                let end = if i + 1 == parts { self.end } else { boundary(i + 1) };
                Window {
                    start: boundary(i),
                    end,
                }
            })
            .collect()
    }

    /// Renders the window as an inclusive `created:` range for the search API.
    pub fn to_created_range(&self) -> String {
        format!(
            "{}..{}",
            self.start.format(TIMESTAMP_FORMAT),
            self.last_second().format(TIMESTAMP_FORMAT)
        )
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {})",
            self.start.format(TIMESTAMP_FORMAT),
            self.end.format(TIMESTAMP_FORMAT)
        )
    }
}

fn truncate_to_second(instant: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp(instant.timestamp(), 0).unwrap_or(instant)
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(0, 0, 0)
        .unwrap_or_default()
        .and_utc()
}

/// The first day anything can have been created on GitHub.
pub fn github_launch_date() -> NaiveDate {
    let (y, m, d) = GITHUB_LAUNCH_DATE;
    NaiveDate::from_ymd_opt(y, m, d).unwrap_or(NaiveDate::MIN)
}
