//! Sale lifecycle rules.
//!
//! This module owns the one definition of "running" used across the crate,
//! and the write-side checks applied to sale create/edit forms:
//! - Window ordering and allowed duration
//! - Discount range and cap
//! - Timing fields freeze once a sale has started
//!
//! Validators never fail; they return every violation found so a form can
//! show them all at once.

use crate::config::TimingRules;
use crate::sale::models::{Money, Sale};
use crate::FlashSaleError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Whether `sale` is on sale at `now`.
///
/// Active flag set, window opened at or before `now`, and not yet closed.
pub fn is_running(sale: &Sale, now: DateTime<Utc>) -> bool {
    is_running_window(sale.is_active, sale.start_time, sale.end_time, now)
}

/// [`is_running`] over raw fields.
pub fn is_running_window(
    is_active: bool,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    now: DateTime<Utc>,
) -> bool {
    is_active && start_time <= now && end_time > now
}

/// Where a sale is in its life, for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SaleStatus {
    /// Active, window not yet open.
    Scheduled,
    /// See [`is_running`].
    Running,
    /// Active, window closed.
    Ended,
    /// Switched off by an admin.
    Inactive,
}

/// Classify a sale at `now`.
pub fn sale_status(sale: &Sale, now: DateTime<Utc>) -> SaleStatus {
    if !sale.is_active {
        SaleStatus::Inactive
    } else if is_running(sale, now) {
        SaleStatus::Running
    } else if sale.start_time > now {
        SaleStatus::Scheduled
    } else {
        SaleStatus::Ended
    }
}

/// What rule a field broke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ViolationKind {
    /// End time is not after start time.
    EndNotAfterStart,
    /// Start time already passed.
    StartInPast,
    /// End time already passed.
    EndInPast,
    /// Window shorter than the minimum duration.
    DurationTooShort,
    /// Window longer than the maximum duration.
    DurationTooLong,
    /// Discount percentage outside `(0, 100]`.
    DiscountOutOfRange,
    /// Discount cap is zero or negative.
    MaxDiscountNotPositive,
    /// Timing edit on a sale that has already started.
    TimingLocked,
}

/// A single broken rule, tied to the form field that broke it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Violation {
    /// Field name as the API spells it.
    pub field: &'static str,
    /// The rule that was broken.
    pub kind: ViolationKind,
}

impl Violation {
    fn new(field: &'static str, kind: ViolationKind) -> Self {
        Self { field, kind }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self.kind {
            ViolationKind::EndNotAfterStart => "must be after the start time",
            ViolationKind::StartInPast => "cannot be in the past",
            ViolationKind::EndInPast => "must be in the future",
            ViolationKind::DurationTooShort => "sale is shorter than the minimum duration",
            ViolationKind::DurationTooLong => "sale is longer than the maximum duration",
            ViolationKind::DiscountOutOfRange => "must be greater than 0 and at most 100",
            ViolationKind::MaxDiscountNotPositive => "must be greater than 0",
            ViolationKind::TimingLocked => "cannot change after the sale has started",
        };
        write!(f, "{}: {}", self.field, message)
    }
}

/// Input for creating a sale.
#[derive(Debug, Clone, PartialEq)]
pub struct SaleDraft {
    /// Display name.
    pub name: String,
    /// Optional marketing copy.
    pub description: Option<String>,
    /// Window start.
    pub start_time: DateTime<Utc>,
    /// Window end.
    pub end_time: DateTime<Utc>,
    /// Headline discount.
    pub discount_percentage: f64,
    /// Optional per-item cap.
    pub max_discount_amount: Option<Money>,
    /// Tie-break rank.
    pub priority: i32,
    /// Administrative switch.
    pub is_active: bool,
}

/// Partial update to an existing sale. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SaleEdit {
    /// New display name.
    pub name: Option<String>,
    /// New marketing copy.
    pub description: Option<String>,
    /// New window start.
    pub start_time: Option<DateTime<Utc>>,
    /// New window end.
    pub end_time: Option<DateTime<Utc>>,
    /// New headline discount.
    pub discount_percentage: Option<f64>,
    /// New per-item cap.
    pub max_discount_amount: Option<Money>,
    /// New tie-break rank.
    pub priority: Option<i32>,
    /// New administrative switch.
    pub is_active: Option<bool>,
}

impl SaleEdit {
    fn changed_start(&self, current: &Sale) -> bool {
        matches!(self.start_time, Some(t) if t != current.start_time)
    }

    fn changed_end(&self, current: &Sale) -> bool {
        matches!(self.end_time, Some(t) if t != current.end_time)
    }
}

/// Check a sale window.
///
/// `scheduling` applies the rules for a window being (re)scheduled: the
/// start may not be in the past and the end must be in the future.
pub fn validate_timing(
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    now: DateTime<Utc>,
    rules: &TimingRules,
    scheduling: bool,
) -> Vec<Violation> {
    let mut violations = Vec::new();

    if scheduling {
        if start_time < now {
            violations.push(Violation::new("startTime", ViolationKind::StartInPast));
        }
        if end_time <= now {
            violations.push(Violation::new("endTime", ViolationKind::EndInPast));
        }
    }

    if end_time <= start_time {
        violations.push(Violation::new("endTime", ViolationKind::EndNotAfterStart));
    } else {
        let duration = end_time - start_time;
        if duration < rules.min_duration {
            violations.push(Violation::new("endTime", ViolationKind::DurationTooShort));
        } else if duration > rules.max_duration {
            violations.push(Violation::new("endTime", ViolationKind::DurationTooLong));
        }
    }

    violations
}

/// Check discount fields.
pub fn validate_discount(
    discount_percentage: f64,
    max_discount_amount: Option<Money>,
) -> Vec<Violation> {
    let mut violations = Vec::new();

    if !(discount_percentage > 0.0 && discount_percentage <= 100.0) {
        violations.push(Violation::new(
            "discountPercentage",
            ViolationKind::DiscountOutOfRange,
        ));
    }
    if matches!(max_discount_amount, Some(cap) if cap <= Money::zero()) {
        violations.push(Violation::new(
            "maxDiscountAmount",
            ViolationKind::MaxDiscountNotPositive,
        ));
    }

    violations
}

/// Check a sale about to be created.
pub fn validate_new_sale(
    draft: &SaleDraft,
    now: DateTime<Utc>,
    rules: &TimingRules,
) -> Vec<Violation> {
    let mut violations = validate_timing(draft.start_time, draft.end_time, now, rules, true);
    violations.extend(validate_discount(
        draft.discount_percentage,
        draft.max_discount_amount,
    ));
    violations
}

/// Check an edit against the sale it modifies.
///
/// Once `current` has started, any change to its start or end time is
/// rejected with `TimingLocked`. Other fields stay editable.
pub fn validate_edit(
    current: &Sale,
    edit: &SaleEdit,
    now: DateTime<Utc>,
    rules: &TimingRules,
) -> Vec<Violation> {
    let mut violations = Vec::new();
    let start_changed = edit.changed_start(current);
    let end_changed = edit.changed_end(current);

    if current.start_time <= now {
        if start_changed {
            violations.push(Violation::new("startTime", ViolationKind::TimingLocked));
        }
        if end_changed {
            violations.push(Violation::new("endTime", ViolationKind::TimingLocked));
        }
    } else if start_changed || end_changed {
        violations.extend(validate_timing(
            edit.start_time.unwrap_or(current.start_time),
            edit.end_time.unwrap_or(current.end_time),
            now,
            rules,
            true,
        ));
    }

    if edit.discount_percentage.is_some() || edit.max_discount_amount.is_some() {
        violations.extend(validate_discount(
            edit.discount_percentage
                .unwrap_or(current.discount_percentage),
            edit.max_discount_amount.or(current.max_discount_amount),
        ));
    }

    violations
}

/// Turn a violation list into a `Result`.
pub fn ensure_valid(violations: Vec<Violation>) -> Result<(), FlashSaleError> {
    if violations.is_empty() {
        Ok(())
    } else {
        Err(FlashSaleError::ValidationFailed(violations))
    }
}
