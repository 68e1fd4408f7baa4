use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

/// The longest period a report may look back.
pub const MAX_STATS_PERIOD: Duration = Duration::hours(24);

/// The period a report looks back if none is requested.
pub const DEFAULT_STATS_PERIOD: Duration = Duration::hours(1);

/// An error parsing a [`StatsPeriod`].
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("invalid stats period {0:?}, expected a number followed by one of s, m, h, d, w")]
pub struct ParseStatsPeriodError(String);

/// The look-back period of a report, at most [`MAX_STATS_PERIOD`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatsPeriod(Duration);

impl StatsPeriod {
    /// Creates a period from a duration, capped at [`MAX_STATS_PERIOD`].
    ///
    /// Negative durations are treated as zero.
    pub fn new(duration: Duration) -> Self {
        Self(duration.clamp(Duration::zero(), MAX_STATS_PERIOD))
    }

    /// Returns the duration of this period.
    pub fn duration(self) -> Duration {
        self.0
    }

    /// Returns the window of this period ending at `end`.
    pub fn window_ending(self, end: DateTime<Utc>) -> TimeWindow {
        TimeWindow {
            start: end - self.0,
            end,
        }
    }
}

impl Default for StatsPeriod {
    fn default() -> Self {
        Self(DEFAULT_STATS_PERIOD)
    }
}

impl FromStr for StatsPeriod {
    type Err = ParseStatsPeriodError;

    /// Parses periods such as `"30m"`, `"1h"`, or `"14d"`.
    ///
    /// Periods longer than [`MAX_STATS_PERIOD`] are capped.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let error = || ParseStatsPeriodError(s.to_owned());

        let s = s.trim();
        let unit_index = s
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(error)?;
        let (amount, unit) = s.split_at(unit_index);
        let amount: i64 = amount.parse().map_err(|_| error())?;

        let duration = match unit {
            "s" => Duration::try_seconds(amount),
            "m" => Duration::try_minutes(amount),
            "h" => Duration::try_hours(amount),
            "d" => Duration::try_days(amount),
            "w" => Duration::try_weeks(amount),
            _ => return Err(error()),
        };

        // Amounts too large to represent exceed the cap anyway.
        Ok(Self::new(duration.unwrap_or(MAX_STATS_PERIOD)))
    }
}

impl fmt::Display for StatsPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let seconds = self.0.num_seconds();
        if seconds % 3600 == 0 {
            write!(f, "{}h", seconds / 3600)
        } else if seconds % 60 == 0 {
            write!(f, "{}m", seconds / 60)
        } else {
            write!(f, "{seconds}s")
        }
    }
}

/// A half-open time range `[start, end)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeWindow {
    /// Inclusive start.
    pub start: DateTime<Utc>,
    /// Exclusive end.
    pub end: DateTime<Utc>,
}
