//! Urgency tiers derived from remaining time.

use serde::Serialize;
use std::fmt;

const MINUTE_MS: u64 = 60 * 1000;
const HOUR_MS: u64 = 60 * MINUTE_MS;

/// Upper bound (inclusive) of the `Critical` tier: 5 minutes.
pub const CRITICAL_MAX_MS: u64 = 5 * MINUTE_MS;

/// Upper bound (inclusive) of the `Urgent` tier: 30 minutes.
pub const URGENT_MAX_MS: u64 = 30 * MINUTE_MS;

/// Upper bound (inclusive) of the `Warning` tier: 1 hour.
pub const WARNING_MAX_MS: u64 = HOUR_MS;

/// Upper bound (inclusive) of the `Notice` tier: 6 hours.
pub const NOTICE_MAX_MS: u64 = 6 * HOUR_MS;

/// How close a countdown is to its target, most pressing first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UrgencyTier {
    /// Nothing left.
    Expired,
    /// Five minutes or less.
    Critical,
    /// Thirty minutes or less.
    Urgent,
    /// One hour or less.
    Warning,
    /// Six hours or less.
    Notice,
    /// More than six hours.
    Normal,
}

impl UrgencyTier {
    /// Stable lowercase name.
    pub fn label(self) -> &'static str {
        match self {
            UrgencyTier::Expired => "expired",
            UrgencyTier::Critical => "critical",
            UrgencyTier::Urgent => "urgent",
            UrgencyTier::Warning => "warning",
            UrgencyTier::Notice => "notice",
            UrgencyTier::Normal => "normal",
        }
    }

    /// Critical or Urgent.
    pub fn is_urgent(self) -> bool {
        matches!(self, UrgencyTier::Critical | UrgencyTier::Urgent)
    }
}

impl fmt::Display for UrgencyTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Map remaining milliseconds to a tier.
///
/// A value sitting exactly on a boundary belongs to the stricter tier.
pub fn classify(remaining_ms: u64) -> UrgencyTier {
    match remaining_ms {
        0 => UrgencyTier::Expired,
        ms if ms <= CRITICAL_MAX_MS => UrgencyTier::Critical,
        ms if ms <= URGENT_MAX_MS => UrgencyTier::Urgent,
        ms if ms <= WARNING_MAX_MS => UrgencyTier::Warning,
        ms if ms <= NOTICE_MAX_MS => UrgencyTier::Notice,
        _ => UrgencyTier::Normal,
    }
}
