//! Time periods that bound recommendation windows

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{ValidationError, CONNECTION_ACTIVE_DAYS};

/// Named recommendation windows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimePeriod {
    All,
    Year,
    Month,
    Week,
    Day,
    Hour,
    Recent,
    LastVisit,
    LastVisitRestricted,
}

impl TimePeriod {
    pub const ALL_PERIODS: [TimePeriod; 9] = [
        TimePeriod::All,
        TimePeriod::Year,
        TimePeriod::Month,
        TimePeriod::Week,
        TimePeriod::Day,
        TimePeriod::Hour,
        TimePeriod::Recent,
        TimePeriod::LastVisit,
        TimePeriod::LastVisitRestricted,
    ];

    /// Length of the window; `None` means unbounded
    pub fn duration(&self) -> Option<Duration> {
        match self {
            TimePeriod::All => None,
            TimePeriod::Year => Some(Duration::days(365)),
            TimePeriod::Month => Some(Duration::days(31)),
            TimePeriod::Week => Some(Duration::weeks(1)),
            TimePeriod::Day => Some(Duration::days(1)),
            TimePeriod::Hour => Some(Duration::hours(1)),
            TimePeriod::Recent | TimePeriod::LastVisit | TimePeriod::LastVisitRestricted => {
                Some(Duration::zero())
            }
        }
    }

    /// Stable numeric code used as a storage key
    pub fn numeric(&self) -> u8 {
        match self {
            TimePeriod::All => 0,
            TimePeriod::Year => 1,
            TimePeriod::Month => 2,
            TimePeriod::Week => 3,
            TimePeriod::Day => 4,
            TimePeriod::Hour => 5,
            TimePeriod::Recent => 6,
            TimePeriod::LastVisit => 7,
            TimePeriod::LastVisitRestricted => 8,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TimePeriod::All => "ALL",
            TimePeriod::Year => "YEAR",
            TimePeriod::Month => "MONTH",
            TimePeriod::Week => "WEEK",
            TimePeriod::Day => "DAY",
            TimePeriod::Hour => "HOUR",
            TimePeriod::Recent => "RECENT",
            TimePeriod::LastVisit => "LAST_VISIT",
            TimePeriod::LastVisitRestricted => "LAST_VISIT_RESTRICTED",
        }
    }

    /// Absolute cutoff for this window; `None` means no cutoff
    pub fn since(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.duration().map(|d| now - d)
    }

    /// Smallest activity bucket covering this window, if any
    pub fn active_days_bucket(&self) -> Option<u32> {
        let window = self.duration()?;
        CONNECTION_ACTIVE_DAYS
            .iter()
            .copied()
            .find(|days| Duration::days(*days as i64) >= window)
    }
}

impl fmt::Display for TimePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TimePeriod {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        TimePeriod::ALL_PERIODS
            .iter()
            .copied()
            .find(|p| p.name() == upper)
            .ok_or_else(|| ValidationError::UnknownTimePeriod(s.to_string()))
    }
}
