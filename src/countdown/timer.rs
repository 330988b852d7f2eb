//! Single-target countdown state machine.
//!
//! ```text
//!   Running ──(remaining hits 0)──> Completed
//!      │                               │
//!      └──────────(dispose)────────────┴──> Disposed
//! ```
//!
//! The timer does no scheduling of its own. It publishes `next_tick_at()`
//! and its owner calls `tick()` when that time arrives, so one owner can
//! coalesce many timers onto a single wake-up.

use crate::clock::Clock;
use crate::config::CadenceConfig;
use crate::countdown::format::CountdownBreakdown;
use crate::policy::urgency::{classify, UrgencyTier};
use crate::FlashSaleError;
use chrono::{DateTime, Duration, Utc};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Invoked once when a timer reaches its target.
pub type CompletionCallback = Box<dyn FnMut() + Send>;

/// Lifecycle state of a [`CountdownTimer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerState {
    /// Counting down; ticks are scheduled.
    Running,
    /// Reached its target. No more ticks.
    Completed,
    /// Torn down by its owner. No more state changes.
    Disposed,
}

/// What a tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Still running with this much left.
    Pending {
        /// Milliseconds left after this tick.
        remaining_ms: u64,
    },
    /// This tick moved the timer to `Completed`.
    Completed,
    /// Timer was already completed or disposed; nothing changed.
    Inactive,
}

/// Countdown toward one target time.
pub struct CountdownTimer {
    target: DateTime<Utc>,
    remaining_ms: u64,
    state: TimerState,
    completed: bool,
    tick_interval_ms: u64,
    next_tick_at: Option<DateTime<Utc>>,
    cadence: CadenceConfig,
    clock: Arc<dyn Clock>,
    on_complete: Option<CompletionCallback>,
}

impl CountdownTimer {
    /// Start a countdown to `target_ms` (milliseconds since the Unix epoch).
    ///
    /// # Errors
    /// `InvalidTarget` if `target_ms` is not positive or is outside the
    /// representable date range.
    pub fn new(
        target_ms: i64,
        clock: Arc<dyn Clock>,
        cadence: CadenceConfig,
        on_complete: Option<CompletionCallback>,
    ) -> Result<Self, FlashSaleError> {
        let target = parse_target_millis(target_ms)?;
        Ok(Self::at(target, clock, cadence, on_complete))
    }

    /// Start a countdown to an RFC 3339 timestamp.
    ///
    /// # Errors
    /// `InvalidTarget` if the text does not parse.
    pub fn from_rfc3339(
        target: &str,
        clock: Arc<dyn Clock>,
        cadence: CadenceConfig,
        on_complete: Option<CompletionCallback>,
    ) -> Result<Self, FlashSaleError> {
        let target = DateTime::parse_from_rfc3339(target)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| FlashSaleError::InvalidTarget {
                value: format!("{:?} ({})", target, e),
            })?;
        Ok(Self::at(target, clock, cadence, on_complete))
    }

    /// Start a countdown to an already-valid time.
    ///
    /// If the target has already passed, the timer starts `Completed` and
    /// `on_complete` runs before this returns.
    pub fn at(
        target: DateTime<Utc>,
        clock: Arc<dyn Clock>,
        cadence: CadenceConfig,
        on_complete: Option<CompletionCallback>,
    ) -> Self {
        let now = clock.now_utc();
        let mut timer = Self {
            target,
            remaining_ms: remaining_between(target, now),
            state: TimerState::Running,
            completed: false,
            tick_interval_ms: 0,
            next_tick_at: None,
            cadence,
            clock,
            on_complete,
        };

        if timer.remaining_ms == 0 {
            timer.complete();
        } else {
            timer.schedule(now);
        }
        timer
    }

    /// Recompute remaining time from the clock.
    pub fn tick(&mut self) -> TickOutcome {
        let now = self.clock.now_utc();
        self.tick_at(now)
    }

    /// Recompute remaining time as of `now`.
    ///
    /// Remaining time never increases, even if `now` moves backwards.
    pub fn tick_at(&mut self, now: DateTime<Utc>) -> TickOutcome {
        if self.state != TimerState::Running {
            return TickOutcome::Inactive;
        }

        self.remaining_ms = self.remaining_ms.min(remaining_between(self.target, now));
        if self.remaining_ms == 0 {
            self.complete();
            return TickOutcome::Completed;
        }

        self.schedule(now);
        TickOutcome::Pending {
            remaining_ms: self.remaining_ms,
        }
    }

    /// Whether a tick is scheduled at or before `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        matches!(self.next_tick_at, Some(at) if at <= now)
    }

    /// Stop the timer. Safe to call repeatedly.
    pub fn dispose(&mut self) {
        if self.state == TimerState::Disposed {
            return;
        }
        self.state = TimerState::Disposed;
        self.next_tick_at = None;
        self.on_complete = None;
    }

    /// Target time.
    pub fn target(&self) -> DateTime<Utc> {
        self.target
    }

    /// Milliseconds left as of the last tick.
    pub fn remaining_ms(&self) -> u64 {
        self.remaining_ms
    }

    /// Lifecycle state.
    pub fn state(&self) -> TimerState {
        self.state
    }

    /// Whether the target was reached. Stays true once set.
    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Current tick cadence in milliseconds (0 once no longer running).
    pub fn tick_interval_ms(&self) -> u64 {
        self.tick_interval_ms
    }

    /// When the next tick is due, if one is scheduled.
    pub fn next_tick_at(&self) -> Option<DateTime<Utc>> {
        self.next_tick_at
    }

    /// Remaining time split into units.
    pub fn formatted(&self) -> CountdownBreakdown {
        CountdownBreakdown::from_millis(self.remaining_ms)
    }

    /// Urgency tier for the remaining time.
    pub fn urgency(&self) -> UrgencyTier {
        classify(self.remaining_ms)
    }

    fn schedule(&mut self, now: DateTime<Utc>) {
        self.tick_interval_ms = self.cadence.interval_for(self.remaining_ms);
        // Never sleep past the target.
        let wait = self.tick_interval_ms.min(self.remaining_ms);
        self.next_tick_at = Some(now + Duration::milliseconds(wait as i64));
    }

    fn complete(&mut self) {
        self.remaining_ms = 0;
        self.state = TimerState::Completed;
        self.completed = true;
        self.tick_interval_ms = 0;
        self.next_tick_at = None;
        debug!(target_time = %self.target, "countdown completed");

        if let Some(mut callback) = self.on_complete.take() {
            callback();
        }
    }
}

impl fmt::Debug for CountdownTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CountdownTimer")
            .field("target", &self.target)
            .field("remaining_ms", &self.remaining_ms)
            .field("state", &self.state)
            .field("tick_interval_ms", &self.tick_interval_ms)
            .field("next_tick_at", &self.next_tick_at)
            .finish_non_exhaustive()
    }
}

/// Validate an epoch-millisecond countdown target.
pub fn parse_target_millis(target_ms: i64) -> Result<DateTime<Utc>, FlashSaleError> {
    if target_ms <= 0 {
        return Err(FlashSaleError::InvalidTarget {
            value: target_ms.to_string(),
        });
    }
    DateTime::from_timestamp_millis(target_ms).ok_or_else(|| FlashSaleError::InvalidTarget {
        value: target_ms.to_string(),
    })
}

/// `max(0, target - now)` in milliseconds.
pub fn remaining_between(target: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    (target - now).num_milliseconds().max(0) as u64
}
