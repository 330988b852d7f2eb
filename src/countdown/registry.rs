//! Keyed set of countdown timers kept in step with the sale list.
//!
//! The registry owns one [`CountdownTimer`] per sale id. Callers hand it the
//! full list of `(id, target)` pairs whenever that list changes, and it
//! reconciles with as little churn as possible:
//! - new id: create a timer
//! - missing id: dispose and drop its timer
//! - same id, same target: leave the timer alone
//! - same id, new target: replace the timer
//!
//! Ticks are coalesced: [`CountdownRegistry::next_wake`] gives the earliest
//! time any timer needs attention and [`CountdownRegistry::poll`] ticks every
//! due timer against one clock reading.

use crate::clock::Clock;
use crate::config::CadenceConfig;
use crate::countdown::format::CountdownBreakdown;
use crate::countdown::timer::{parse_target_millis, CountdownTimer, TickOutcome, TimerState};
use crate::policy::urgency::UrgencyTier;
use crate::sale::models::{Sale, SaleId};
use crate::FlashSaleError;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Called with the sale id of every timer that completes.
pub type CompletionHook = Box<dyn FnMut(&SaleId) + Send>;

/// One countdown the registry should track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountdownEntry {
    /// Sale being counted down.
    pub id: SaleId,
    /// Target in milliseconds since the Unix epoch.
    pub target_ms: i64,
}

impl CountdownEntry {
    /// Build an entry from raw parts.
    pub fn new(id: impl Into<SaleId>, target_ms: i64) -> Self {
        Self {
            id: id.into(),
            target_ms,
        }
    }

    /// Count down to the sale's start if it has not opened yet, otherwise
    /// to its end.
    pub fn for_sale(sale: &Sale, now: DateTime<Utc>) -> Self {
        let target = if sale.start_time > now {
            sale.start_time
        } else {
            sale.end_time
        };
        Self::new(sale.id.clone(), target.timestamp_millis())
    }
}

/// What one reconciliation pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Ids that got a new timer.
    pub added: Vec<SaleId>,
    /// Ids whose timer was disposed.
    pub removed: Vec<SaleId>,
    /// Ids whose timer was replaced because the target moved.
    pub retargeted: Vec<SaleId>,
    /// Ids skipped because their target was invalid.
    pub rejected: Vec<SaleId>,
    /// Ids whose new timer was already complete on creation.
    pub completed: Vec<SaleId>,
}

impl ReconcileReport {
    /// Whether no timer was created or destroyed.
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.retargeted.is_empty()
    }
}

struct Tracked {
    instance: u64,
    timer: CountdownTimer,
}

/// Owner of all per-sale countdowns.
pub struct CountdownRegistry {
    timers: HashMap<SaleId, Tracked>,
    clock: Arc<dyn Clock>,
    cadence: CadenceConfig,
    on_any_complete: Option<CompletionHook>,
    pending: VecDeque<Vec<CountdownEntry>>,
    next_instance: u64,
    disposed: bool,
}

impl CountdownRegistry {
    /// Create an empty registry.
    pub fn new(clock: Arc<dyn Clock>, cadence: CadenceConfig) -> Self {
        Self {
            timers: HashMap::new(),
            clock,
            cadence,
            on_any_complete: None,
            pending: VecDeque::new(),
            next_instance: 0,
            disposed: false,
        }
    }

    /// Install the hook run whenever a tracked timer completes.
    pub fn set_on_any_complete(&mut self, hook: CompletionHook) {
        self.on_any_complete = Some(hook);
    }

    /// Queue a list for the next [`reconcile`](Self::reconcile) or
    /// [`process_queue`](Self::process_queue).
    pub fn enqueue(&mut self, entries: Vec<CountdownEntry>) {
        self.pending.push_back(entries);
    }

    /// Queue `entries`, then apply every queued list in order.
    ///
    /// Returns the report for `entries`.
    pub fn reconcile(&mut self, entries: Vec<CountdownEntry>) -> ReconcileReport {
        self.enqueue(entries);
        self.process_queue().pop().unwrap_or_default()
    }

    /// Apply every queued list in FIFO order, one full batch at a time.
    pub fn process_queue(&mut self) -> Vec<ReconcileReport> {
        let mut reports = Vec::with_capacity(self.pending.len());
        while let Some(entries) = self.pending.pop_front() {
            if self.disposed {
                warn!("reconcile requested on a disposed countdown registry");
                reports.push(ReconcileReport::default());
                continue;
            }
            let report = self.apply_batch(entries);
            // Hooks run only once the whole batch is in place.
            self.notify(&report.completed);
            reports.push(report);
        }
        reports
    }

    fn apply_batch(&mut self, entries: Vec<CountdownEntry>) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let mut wanted: Vec<(SaleId, DateTime<Utc>)> = Vec::with_capacity(entries.len());
        let mut seen = HashSet::new();

        for entry in entries {
            match parse_target_millis(entry.target_ms) {
                Ok(target) => {
                    if seen.insert(entry.id.clone()) {
                        wanted.push((entry.id, target));
                    } else {
                        warn!(sale_id = %entry.id, "duplicate countdown entry ignored");
                    }
                }
                Err(e) => {
                    warn!(sale_id = %entry.id, error = %e, "countdown entry rejected");
                    report.rejected.push(entry.id);
                }
            }
        }

        let mut stale: Vec<SaleId> = self
            .timers
            .keys()
            .filter(|id| !seen.contains(*id))
            .cloned()
            .collect();
        stale.sort();
        for id in stale {
            if let Some(mut tracked) = self.timers.remove(&id) {
                tracked.timer.dispose();
            }
            report.removed.push(id);
        }

        for (id, target) in wanted {
            match self.timers.get_mut(&id) {
                Some(tracked) if tracked.timer.target() == target => {}
                Some(tracked) => {
                    tracked.timer.dispose();
                    let fresh = self.start_timer(target);
                    if fresh.timer.is_completed() {
                        report.completed.push(id.clone());
                    }
                    self.timers.insert(id.clone(), fresh);
                    report.retargeted.push(id);
                }
                None => {
                    let fresh = self.start_timer(target);
                    if fresh.timer.is_completed() {
                        report.completed.push(id.clone());
                    }
                    self.timers.insert(id.clone(), fresh);
                    report.added.push(id);
                }
            }
        }

        if report.is_noop() {
            debug!(tracked = self.timers.len(), "countdown reconcile: no changes");
        } else {
            info!(
                added = report.added.len(),
                removed = report.removed.len(),
                retargeted = report.retargeted.len(),
                rejected = report.rejected.len(),
                tracked = self.timers.len(),
                "countdown registry reconciled"
            );
        }
        report
    }

    fn start_timer(&mut self, target: DateTime<Utc>) -> Tracked {
        self.next_instance += 1;
        Tracked {
            instance: self.next_instance,
            timer: CountdownTimer::at(target, self.clock.clone(), self.cadence, None),
        }
    }

    /// Tick every timer whose next tick is due.
    ///
    /// Returns the ids that completed on this poll, in id order.
    pub fn poll(&mut self) -> Vec<SaleId> {
        if self.disposed {
            return Vec::new();
        }
        let now = self.clock.now_utc();
        let mut completed: Vec<SaleId> = self
            .timers
            .iter_mut()
            .filter(|(_, tracked)| tracked.timer.is_due(now))
            .filter_map(|(id, tracked)| match tracked.timer.tick_at(now) {
                TickOutcome::Completed => Some(id.clone()),
                TickOutcome::Pending { .. } | TickOutcome::Inactive => None,
            })
            .collect();
        completed.sort();
        self.notify(&completed);
        completed
    }

    /// Earliest scheduled tick across all running timers.
    pub fn next_wake(&self) -> Option<DateTime<Utc>> {
        self.timers
            .values()
            .filter_map(|tracked| tracked.timer.next_tick_at())
            .min()
    }

    /// How long an owner loop should sleep before the next [`poll`](Self::poll).
    pub fn sleep_duration(&self) -> Option<Duration> {
        let wake = self.next_wake()?;
        Some((wake - self.clock.now_utc()).to_std().unwrap_or(Duration::ZERO))
    }

    fn notify(&mut self, completed: &[SaleId]) {
        for id in completed {
            info!(sale_id = %id, "flash sale countdown completed");
            if let Some(hook) = self.on_any_complete.as_mut() {
                hook(id);
            }
        }
    }

    /// Drop a completed timer once its owner has reacted to it.
    ///
    /// Returns whether the timer was removed; a still-running timer is kept.
    ///
    /// # Errors
    /// `UnknownSaleId` if the id is not tracked.
    pub fn acknowledge(&mut self, id: &SaleId) -> Result<bool, FlashSaleError> {
        let tracked = self
            .timers
            .get(id)
            .ok_or_else(|| FlashSaleError::UnknownSaleId(id.clone()))?;
        if !tracked.timer.is_completed() {
            return Ok(false);
        }
        if let Some(mut tracked) = self.timers.remove(id) {
            tracked.timer.dispose();
        }
        Ok(true)
    }

    /// Dispose every timer and refuse further work. Safe to call repeatedly.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        for tracked in self.timers.values_mut() {
            tracked.timer.dispose();
        }
        self.timers.clear();
        self.pending.clear();
        self.on_any_complete = None;
        self.disposed = true;
        debug!("countdown registry disposed");
    }

    /// Whether [`dispose`](Self::dispose) has run.
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Milliseconds left for `id`, or `None` if untracked.
    pub fn remaining_ms(&self, id: &SaleId) -> Option<u64> {
        self.timer(id).map(CountdownTimer::remaining_ms)
    }

    /// Breakdown for `id`, or `None` if untracked.
    pub fn formatted(&self, id: &SaleId) -> Option<CountdownBreakdown> {
        self.timer(id).map(CountdownTimer::formatted)
    }

    /// Completion flag for `id`, or `None` if untracked.
    pub fn is_completed(&self, id: &SaleId) -> Option<bool> {
        self.timer(id).map(CountdownTimer::is_completed)
    }

    /// Urgency tier for `id`, or `None` if untracked.
    pub fn urgency(&self, id: &SaleId) -> Option<UrgencyTier> {
        self.timer(id).map(CountdownTimer::urgency)
    }

    /// Lifecycle state for `id`, or `None` if untracked.
    pub fn state(&self, id: &SaleId) -> Option<TimerState> {
        self.timer(id).map(CountdownTimer::state)
    }

    /// Serial number of the timer instance tracking `id`.
    ///
    /// Changes only when the timer is replaced.
    pub fn instance_id(&self, id: &SaleId) -> Option<u64> {
        self.timers.get(id).map(|tracked| tracked.instance)
    }

    /// The timer tracking `id`.
    pub fn timer(&self, id: &SaleId) -> Option<&CountdownTimer> {
        self.timers.get(id).map(|tracked| &tracked.timer)
    }

    /// Ids currently tracked, sorted.
    pub fn tracked_ids(&self) -> Vec<SaleId> {
        let mut ids: Vec<SaleId> = self.timers.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of tracked timers.
    pub fn len(&self) -> usize {
        self.timers.len()
    }

    /// Whether nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}

impl fmt::Debug for CountdownRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CountdownRegistry")
            .field("tracked", &self.tracked_ids())
            .field("pending", &self.pending.len())
            .field("disposed", &self.disposed)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use std::sync::Mutex;

    fn setup() -> (Arc<MockClock>, CountdownRegistry, Arc<Mutex<Vec<SaleId>>>) {
        let clock = Arc::new(MockClock::from_rfc3339("2025-03-01T12:00:00Z"));
        let mut registry = CountdownRegistry::new(clock.clone(), CadenceConfig::default());
        let fired = Arc::new(Mutex::new(Vec::new()));
        let sink = fired.clone();
        registry.set_on_any_complete(Box::new(move |id: &SaleId| sink.lock().unwrap().push(id.clone())));
        (clock, registry, fired)
    }

    fn at(clock: &MockClock, id: &str, offset_ms: i64) -> CountdownEntry {
        CountdownEntry::new(id, clock.now_millis() + offset_ms)
    }

    fn ids(list: &[SaleId]) -> Vec<&str> {
        list.iter().map(SaleId::as_str).collect()
    }

    #[test]
    fn test_reconcile_adds_removes_and_keeps() {
        let (clock, mut registry, _) = setup();
        let a = at(&clock, "A", 10_000);
        let b = at(&clock, "B", 500_000);
        let first = registry.reconcile(vec![a, b.clone()]);
        assert_eq!(ids(&first.added), vec!["A", "B"]);

        let b_instance = registry.instance_id(&SaleId::new("B"));
        let report = registry.reconcile(vec![b, at(&clock, "C", 20_000)]);

        assert_eq!(ids(&report.removed), vec!["A"]);
        assert_eq!(ids(&report.added), vec!["C"]);
        assert!(report.retargeted.is_empty());
        assert_eq!(registry.instance_id(&SaleId::new("B")), b_instance);
        assert_eq!(registry.remaining_ms(&SaleId::new("A")), None);
        assert_eq!(registry.tracked_ids(), vec![SaleId::new("B"), SaleId::new("C")]);
    }

    #[test]
    fn test_reconcile_same_list_twice_is_noop() {
        let (clock, mut registry, _) = setup();
        let list = vec![at(&clock, "A", 10_000), at(&clock, "B", 20_000)];
        registry.reconcile(list.clone());
        let before = (
            registry.instance_id(&SaleId::new("A")),
            registry.instance_id(&SaleId::new("B")),
        );

        let second = registry.reconcile(list);
        assert!(second.is_noop());
        assert_eq!(
            before,
            (
                registry.instance_id(&SaleId::new("A")),
                registry.instance_id(&SaleId::new("B")),
            )
        );
    }

    #[test]
    fn test_progress_kept_across_unrelated_reconcile() {
        let (clock, mut registry, _) = setup();
        let a = at(&clock, "A", 60_000);
        registry.reconcile(vec![a.clone()]);

        clock.advance_millis(15_000);
        registry.poll();
        assert_eq!(registry.remaining_ms(&SaleId::new("A")), Some(45_000));

        registry.reconcile(vec![a, at(&clock, "B", 5_000)]);
        assert_eq!(registry.remaining_ms(&SaleId::new("A")), Some(45_000));
    }

    #[test]
    fn test_retarget_replaces_timer() {
        let (clock, mut registry, _) = setup();
        registry.reconcile(vec![at(&clock, "A", 10_000)]);
        let old = registry.instance_id(&SaleId::new("A"));

        let report = registry.reconcile(vec![at(&clock, "A", 90_000)]);
        assert_eq!(ids(&report.retargeted), vec!["A"]);
        assert_ne!(registry.instance_id(&SaleId::new("A")), old);
        assert_eq!(registry.remaining_ms(&SaleId::new("A")), Some(90_000));
    }

    #[test]
    fn test_invalid_entry_does_not_disturb_others() {
        let (clock, mut registry, _) = setup();
        let report = registry.reconcile(vec![
            CountdownEntry::new("bad", -42),
            at(&clock, "A", 10_000),
        ]);

        assert_eq!(ids(&report.rejected), vec!["bad"]);
        assert_eq!(ids(&report.added), vec!["A"]);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unknown_ids_return_none() {
        let (_, registry, _) = setup();
        let missing = SaleId::new("nope");
        assert_eq!(registry.remaining_ms(&missing), None);
        assert_eq!(registry.formatted(&missing), None);
        assert_eq!(registry.is_completed(&missing), None);
        assert_eq!(registry.urgency(&missing), None);
    }

    #[test]
    fn test_poll_fires_hook_once_per_completion() {
        let (clock, mut registry, fired) = setup();
        registry.reconcile(vec![at(&clock, "A", 2_000), at(&clock, "B", 4_000)]);

        clock.advance_millis(2_000);
        assert_eq!(ids(&registry.poll()), vec!["A"]);

        clock.advance_millis(2_000);
        assert_eq!(ids(&registry.poll()), vec!["B"]);

        clock.advance_millis(10_000);
        assert!(registry.poll().is_empty());
        assert_eq!(ids(&fired.lock().unwrap()), vec!["A", "B"]);
        assert_eq!(registry.is_completed(&SaleId::new("A")), Some(true));
    }

    #[test]
    fn test_poll_skips_timers_not_due() {
        let (clock, mut registry, _) = setup();
        registry.reconcile(vec![at(&clock, "far", 3 * 24 * 60 * 60 * 1000)]);
        let start = registry.remaining_ms(&SaleId::new("far")).unwrap();

        clock.advance_millis(30_000);
        registry.poll();
        assert_eq!(registry.remaining_ms(&SaleId::new("far")), Some(start));

        clock.advance_millis(30_000);
        registry.poll();
        assert_eq!(registry.remaining_ms(&SaleId::new("far")), Some(start - 60_000));
    }

    #[test]
    fn test_next_wake_is_earliest_tick() {
        let (clock, mut registry, _) = setup();
        assert_eq!(registry.next_wake(), None);

        registry.reconcile(vec![
            at(&clock, "slow", 3 * 24 * 60 * 60 * 1000),
            at(&clock, "soon", 400),
        ]);
        assert_eq!(
            registry.next_wake(),
            Some(clock.now_utc() + chrono::Duration::milliseconds(400))
        );
        assert_eq!(registry.sleep_duration(), Some(Duration::from_millis(400)));
    }

    #[test]
    fn test_already_expired_entry_fires_after_batch() {
        let (clock, mut registry, fired) = setup();
        let report = registry.reconcile(vec![at(&clock, "gone", -1_000), at(&clock, "A", 5_000)]);

        assert_eq!(ids(&report.completed), vec!["gone"]);
        assert_eq!(ids(&fired.lock().unwrap()), vec!["gone"]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_acknowledge() {
        let (clock, mut registry, _) = setup();
        registry.reconcile(vec![at(&clock, "A", 1_000), at(&clock, "B", 50_000)]);
        clock.advance_millis(1_000);
        registry.poll();

        assert!(registry.acknowledge(&SaleId::new("A")).unwrap());
        assert!(!registry.acknowledge(&SaleId::new("B")).unwrap());
        assert!(matches!(
            registry.acknowledge(&SaleId::new("A")),
            Err(FlashSaleError::UnknownSaleId(_))
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_queued_batches_apply_in_order() {
        let (clock, mut registry, _) = setup();
        registry.enqueue(vec![at(&clock, "A", 10_000)]);
        registry.enqueue(vec![at(&clock, "B", 10_000)]);
        let reports = registry.process_queue();

        assert_eq!(reports.len(), 2);
        assert_eq!(ids(&reports[0].added), vec!["A"]);
        assert_eq!(ids(&reports[1].removed), vec!["A"]);
        assert_eq!(registry.tracked_ids(), vec![SaleId::new("B")]);
    }

    #[test]
    fn test_dispose_cancels_pending_ticks() {
        let (clock, mut registry, fired) = setup();
        registry.reconcile(vec![at(&clock, "A", 1_000)]);

        registry.dispose();
        registry.dispose();
        clock.advance_millis(5_000);

        assert!(registry.poll().is_empty());
        assert!(fired.lock().unwrap().is_empty());
        assert!(registry.is_empty());
        assert!(registry.reconcile(vec![at(&clock, "B", 1_000)]).is_noop());
        assert!(registry.is_disposed());
    }

    #[test]
    fn test_entry_for_sale_targets() {
        let clock = MockClock::from_rfc3339("2025-03-01T12:00:00Z");
        let now = clock.now_utc();
        let mut sale = crate::sale::models::fixtures::sale("s", now);

        assert_eq!(
            CountdownEntry::for_sale(&sale, now).target_ms,
            sale.end_time.timestamp_millis()
        );

        sale.start_time = now + chrono::Duration::hours(1);
        sale.end_time = now + chrono::Duration::hours(3);
        assert_eq!(
            CountdownEntry::for_sale(&sale, now).target_ms,
            sale.start_time.timestamp_millis()
        );
    }
}
