//! Human-readable countdown breakdown.

use serde::Serialize;
use std::fmt;

const SECOND_MS: u64 = 1000;
const MINUTE_MS: u64 = 60 * SECOND_MS;
const HOUR_MS: u64 = 60 * MINUTE_MS;
const DAY_MS: u64 = 24 * HOUR_MS;

/// Days/hours/minutes/seconds left, truncated to whole seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct CountdownBreakdown {
    /// Whole days.
    pub days: u64,
    /// Hours past the last whole day (0-23).
    pub hours: u64,
    /// Minutes past the last whole hour (0-59).
    pub minutes: u64,
    /// Seconds past the last whole minute (0-59).
    pub seconds: u64,
}

impl CountdownBreakdown {
    /// Split a millisecond count.
    pub fn from_millis(remaining_ms: u64) -> Self {
        Self {
            days: remaining_ms / DAY_MS,
            hours: (remaining_ms % DAY_MS) / HOUR_MS,
            minutes: (remaining_ms % HOUR_MS) / MINUTE_MS,
            seconds: (remaining_ms % MINUTE_MS) / SECOND_MS,
        }
    }

    /// Total whole seconds represented.
    pub fn total_seconds(&self) -> u64 {
        self.days * 86_400 + self.hours * 3_600 + self.minutes * 60 + self.seconds
    }

    /// `HH:MM:SS`, with days folded into the hour count.
    pub fn clock_face(&self) -> String {
        format!(
            "{:02}:{:02}:{:02}",
            self.days * 24 + self.hours,
            self.minutes,
            self.seconds
        )
    }
}

/// `1d 2h 3m 4s`. Leading zero units are dropped; seconds always show.
impl fmt::Display for CountdownBreakdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.days > 0 {
            write!(f, "{}d ", self.days)?;
        }
        if self.days > 0 || self.hours > 0 {
            write!(f, "{}h ", self.hours)?;
        }
        if self.days > 0 || self.hours > 0 || self.minutes > 0 {
            write!(f, "{}m ", self.minutes)?;
        }
        write!(f, "{}s", self.seconds)
    }
}
