// libs/appointment-cell/src/services/time.rs
use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

pub const MINUTES_PER_DAY: u32 = 24 * 60;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimeParseError {
    #[error("time is empty")]
    Empty,

    #[error("time `{0}` is not in HH:MM format")]
    Malformed(String),

    #[error("time `{0}` is outside 00:00-23:59")]
    OutOfRange(String),
}

/// Wall-clock time of day with minute precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeOfDay(u16);

impl TimeOfDay {
    pub const MIDNIGHT: TimeOfDay = TimeOfDay(0);

    pub fn from_minutes(minutes: u32) -> Option<Self> {
        (minutes < MINUTES_PER_DAY).then(|| TimeOfDay(minutes as u16))
    }

    pub fn from_hm(hour: u32, minute: u32) -> Option<Self> {
        if hour < 24 && minute < 60 {
            Self::from_minutes(hour * 60 + minute)
        } else {
            None
        }
    }

    /// Accepts `HH:MM` and `HH:MM:SS` (seconds are dropped).
    pub fn parse(raw: &str) -> Result<Self, TimeParseError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(TimeParseError::Empty);
        }

        let mut parts = raw.split(':');
        let (hour, minute) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(h), Some(m), None, None) | (Some(h), Some(m), Some(_), None) => (h, m),
            _ => return Err(TimeParseError::Malformed(raw.to_string())),
        };

        let parse_field = |field: &str| -> Result<u32, TimeParseError> {
            if field.is_empty() || field.len() > 2 || !field.bytes().all(|b| b.is_ascii_digit()) {
                return Err(TimeParseError::Malformed(raw.to_string()));
            }
            field
                .parse::<u32>()
                .map_err(|_| TimeParseError::Malformed(raw.to_string()))
        };

        let hour = parse_field(hour)?;
        let minute = parse_field(minute)?;
        Self::from_hm(hour, minute).ok_or_else(|| TimeParseError::OutOfRange(raw.to_string()))
    }

    pub fn minutes(self) -> u32 {
        u32::from(self.0)
    }

    pub fn hour(self) -> u32 {
        self.minutes() / 60
    }

    pub fn minute(self) -> u32 {
        self.minutes() % 60
    }

    /// `None` when the result would cross midnight.
    pub fn add_minutes(self, duration: u32) -> Option<Self> {
        Self::from_minutes(self.minutes().checked_add(duration)?)
    }

    pub fn minutes_until(self, later: TimeOfDay) -> Option<u32> {
        later.minutes().checked_sub(self.minutes())
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

impl FromStr for TimeOfDay {
    type Err = TimeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for TimeOfDay {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimeOfDay {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        TimeOfDay::parse(&raw).map_err(de::Error::custom)
    }
}

// ==============================================================================
// LEGACY STRING HELPERS
// ==============================================================================

/// Permissive conversion kept for imported data: anything unparseable counts
/// as midnight. Scheduling paths use [`TimeOfDay::parse`] instead.
pub fn to_minutes(raw: &str) -> u32 {
    TimeOfDay::parse(raw).map(TimeOfDay::minutes).unwrap_or(0)
}

pub fn minutes_to_time(minutes: u32) -> String {
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

pub fn add_minutes(raw: &str, duration: u32) -> String {
    minutes_to_time(to_minutes(raw) + duration)
}

/// Half-open interval overlap: `[s1, e1)` and `[s2, e2)` share at least one instant.
pub fn overlaps<T: PartialOrd>(s1: T, e1: T, s2: T, e2: T) -> bool {
    s1 < e2 && s2 < e1
}
