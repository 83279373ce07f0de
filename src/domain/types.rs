/// Core identifier and scheduling types used throughout the domain layer
///
/// This module defines the opaque id newtypes for habits, completions and
/// users, the Frequency enum, and the DayWindow used to bucket completions
/// into a tracking period.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Local, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

/// Unique identifier for a habit.
///
/// Ids are assigned by the remote store at row creation and treated as opaque
/// strings on the client. The wrapper exists for type safety: a habit id can
/// never be passed where a completion id is expected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HabitId(String);

/// Unique identifier for a completion record, store-assigned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompletionId(String);

/// Stable identifier of an authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

macro_rules! opaque_id {
    ($name:ident) => {
        impl $name {
            /// Wrap a store-assigned id.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the raw id string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }
    };
}

opaque_id!(HabitId);
opaque_id!(CompletionId);
opaque_id!(UserId);

/// How often a habit is meant to be performed.
///
/// Stored on the habit row as a lowercase string and carried through
/// unchanged; streak derivation itself is day-based regardless of frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
}

impl Frequency {
    /// All frequencies a habit can be created with.
    pub const ALL: [Frequency; 3] = [Frequency::Daily, Frequency::Weekly, Frequency::Monthly];

    /// The lowercase wire form used in store rows.
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "daily" => Ok(Frequency::Daily),
            "weekly" => Ok(Frequency::Weekly),
            "monthly" => Ok(Frequency::Monthly),
            other => Err(DomainError::InvalidFrequency(other.to_string())),
        }
    }
}

/// A half-open `[start, end)` time range covering one tracking day.
///
/// The idempotency guard counts a habit as "already completed" when a
/// completion timestamp falls inside this window. The default window runs
/// from local midnight to the next local midnight, matching what a user
/// thinks of as "today" on their device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DayWindow {
    /// The window for today in the device-local timezone.
    pub fn today_local() -> Self {
        Self::for_local_date(Local::now().date_naive())
    }

    /// The window for today in UTC.
    pub fn today_utc() -> Self {
        Self::for_utc_date(Utc::now().date_naive())
    }

    /// The window covering `date` in the device-local timezone.
    pub fn for_local_date(date: NaiveDate) -> Self {
        let start = local_midnight(date);
        Self {
            start,
            end: start + Duration::days(1),
        }
    }

    /// The window covering `date` as a UTC calendar day.
    pub fn for_utc_date(date: NaiveDate) -> Self {
        let start = Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN));
        Self {
            start,
            end: start + Duration::days(1),
        }
    }

    /// Whether `t` falls inside the window.
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t < self.end
    }
}

fn local_midnight(date: NaiveDate) -> DateTime<Utc> {
    let naive = date.and_time(NaiveTime::MIN);
    match naive.and_local_timezone(Local) {
        LocalResult::Single(t) => t.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        // Midnight skipped by a DST jump; fall back to the UTC midnight of
        // the same calendar date.
        LocalResult::None => Utc.from_utc_datetime(&naive),
    }
}
