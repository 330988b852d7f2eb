//! Flash-sale engine - the main public API.
//!
//! The `FlashSaleEngine` wires the pieces together:
//! - Catalog refresh from a [`SalesSource`]
//! - Countdown reconciliation for every active or upcoming sale
//! - Best-price resolution and urgency lookup
//! - Sale form validation against the configured timing rules

use crate::cache::file::SnapshotCache;
use crate::clock::{Clock, SystemClock};
use crate::config::FlashSaleConfig;
use crate::countdown::format::CountdownBreakdown;
use crate::countdown::registry::{CompletionHook, CountdownEntry, CountdownRegistry, ReconcileReport};
use crate::policy::lifecycle::{
    ensure_valid, sale_status, validate_edit, validate_new_sale, SaleDraft, SaleEdit, SaleStatus,
};
use crate::policy::urgency::UrgencyTier;
use crate::pricing::resolver::{PricingResolver, PricingResult};
use crate::sale::catalog::{CatalogSnapshot, SaleCatalog, SalesSource};
use crate::sale::models::{Money, ProductId, Sale, SaleId};
use crate::FlashSaleError;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Main entry point for storefront flash-sale logic.
///
/// Create one instance per storefront process and drive it from the event
/// loop: sleep for [`sleep_duration`](Self::sleep_duration), call
/// [`poll`](Self::poll), and [`refresh`](Self::refresh) when a sale completes.
pub struct FlashSaleEngine {
    config: FlashSaleConfig,
    clock: Arc<dyn Clock>,
    catalog: SaleCatalog,
    registry: CountdownRegistry,
    resolver: PricingResolver,
    cache: Option<SnapshotCache>,
}

impl FlashSaleEngine {
    /// Create an engine using the system clock.
    ///
    /// # Errors
    /// Returns `ConfigError` if configuration validation fails.
    pub fn new(config: FlashSaleConfig) -> Result<Self, FlashSaleError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create an engine reading time from `clock`.
    ///
    /// If `cache_namespace` is set and a cached snapshot exists, the catalog
    /// starts from it and countdowns are reconciled immediately.
    pub fn with_clock(
        config: FlashSaleConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, FlashSaleError> {
        config.validate()?;

        let cache = config
            .cache_namespace
            .as_deref()
            .and_then(|ns| match SnapshotCache::new(ns) {
                Ok(cache) => Some(cache),
                Err(e) => {
                    warn!(namespace = ns, error = %e, "snapshot cache unavailable");
                    None
                }
            });

        Ok(Self::assemble(config, clock, cache))
    }

    fn assemble(
        config: FlashSaleConfig,
        clock: Arc<dyn Clock>,
        cache: Option<SnapshotCache>,
    ) -> Self {
        let warm = cache.as_ref().and_then(|cache| match cache.load() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "ignoring unreadable snapshot cache");
                None
            }
        });

        let mut engine = Self {
            registry: CountdownRegistry::new(clock.clone(), config.cadence),
            resolver: PricingResolver::new(clock.clone()),
            catalog: warm.map(SaleCatalog::with_snapshot).unwrap_or_default(),
            config,
            clock,
            cache,
        };
        engine.sync_registry();
        engine
    }

    /// Reload sales from `source` and reconcile countdowns.
    ///
    /// # Errors
    /// `CatalogLoadFailed` if either load fails. The previous catalog and
    /// all countdowns are left untouched.
    pub fn refresh(&mut self, source: &dyn SalesSource) -> Result<ReconcileReport, FlashSaleError> {
        self.catalog.refresh(source, self.clock.now_utc())?;
        Ok(self.after_publish())
    }

    /// Publish lists fetched elsewhere (e.g. by an async HTTP layer).
    pub fn apply_loaded(&mut self, active: Vec<Sale>, upcoming: Vec<Sale>) -> ReconcileReport {
        self.catalog.apply_loaded(active, upcoming, self.clock.now_utc());
        self.after_publish()
    }

    /// Refetch one sale (e.g. after an admin edit) and reconcile.
    pub fn reload_sale(
        &mut self,
        source: &dyn SalesSource,
        id: &SaleId,
    ) -> Result<ReconcileReport, FlashSaleError> {
        self.catalog.reload_sale(source, id, self.clock.now_utc())?;
        Ok(self.after_publish())
    }

    fn after_publish(&mut self) -> ReconcileReport {
        let report = self.sync_registry();
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.save(&self.catalog.snapshot()) {
                warn!(error = %e, "failed to persist flash sale snapshot");
            }
        }
        report
    }

    fn sync_registry(&mut self) -> ReconcileReport {
        let now = self.clock.now_utc();
        let now_ms = now.timestamp_millis();
        // Sales already over get no new timer; tracked ones stay until acknowledged.
        let entries = countdown_entries(&self.catalog.snapshot(), now)
            .into_iter()
            .filter(|entry| entry.target_ms > now_ms || self.registry.timer(&entry.id).is_some())
            .collect();
        self.registry.reconcile(entries)
    }

    /// Tick due countdowns. Returns sale ids that just completed.
    ///
    /// A sale whose start countdown completes is retargeted to its end from
    /// the current catalog, without waiting for a refresh.
    pub fn poll(&mut self) -> Vec<SaleId> {
        let completed = self.registry.poll();
        if !completed.is_empty() {
            self.sync_registry();
        }
        completed
    }

    /// Drop a completed countdown once its owner has reacted to it.
    ///
    /// Returns `false` if the countdown is still running.
    ///
    /// # Errors
    /// `UnknownSaleId` if no countdown is tracked for `id`.
    pub fn acknowledge(&mut self, id: &SaleId) -> Result<bool, FlashSaleError> {
        self.registry.acknowledge(id)
    }

    /// Earliest time a countdown needs a tick.
    pub fn next_wake(&self) -> Option<DateTime<Utc>> {
        self.registry.next_wake()
    }

    /// Time until [`next_wake`](Self::next_wake).
    pub fn sleep_duration(&self) -> Option<Duration> {
        self.registry.sleep_duration()
    }

    /// Run `hook` for every completed countdown.
    pub fn on_any_complete(&mut self, hook: CompletionHook) {
        self.registry.set_on_any_complete(hook);
    }

    /// Price to show for a product right now.
    pub fn resolve_price(&self, product_id: &ProductId, original_price: Money) -> PricingResult {
        self.resolver
            .resolve(&self.catalog.snapshot(), product_id, original_price)
    }

    /// Countdown breakdown for a sale.
    pub fn countdown(&self, id: &SaleId) -> Option<CountdownBreakdown> {
        self.registry.formatted(id)
    }

    /// Milliseconds left on a sale's countdown.
    pub fn remaining_ms(&self, id: &SaleId) -> Option<u64> {
        self.registry.remaining_ms(id)
    }

    /// Urgency tier of a sale's countdown.
    pub fn urgency(&self, id: &SaleId) -> Option<UrgencyTier> {
        self.registry.urgency(id)
    }

    /// Lifecycle status of a known sale.
    pub fn sale_status(&self, id: &SaleId) -> Option<SaleStatus> {
        self.catalog
            .find_by_id(id)
            .map(|sale| sale_status(&sale, self.clock.now_utc()))
    }

    /// Validate a sale about to be created.
    ///
    /// # Errors
    /// `ValidationFailed` with every broken rule.
    pub fn validate_new_sale(&self, draft: &SaleDraft) -> Result<(), FlashSaleError> {
        ensure_valid(validate_new_sale(
            draft,
            self.clock.now_utc(),
            &self.config.timing,
        ))
    }

    /// Validate an edit to a known sale.
    ///
    /// # Errors
    /// `UnknownSaleId` if the sale is not in the catalog, otherwise
    /// `ValidationFailed` with every broken rule.
    pub fn validate_edit(&self, id: &SaleId, edit: &SaleEdit) -> Result<(), FlashSaleError> {
        let current = self.catalog.require(id)?;
        ensure_valid(validate_edit(
            &current,
            edit,
            self.clock.now_utc(),
            &self.config.timing,
        ))
    }

    /// The sale catalog.
    pub fn catalog(&self) -> &SaleCatalog {
        &self.catalog
    }

    /// The countdown registry.
    pub fn registry(&self) -> &CountdownRegistry {
        &self.registry
    }

    /// Get the current configuration.
    pub fn config(&self) -> &FlashSaleConfig {
        &self.config
    }

    /// Stop every countdown. The catalog stays readable.
    pub fn shutdown(&mut self) {
        self.registry.dispose();
    }
}

/// One countdown per active sale: to its start if upcoming, else its end.
pub fn countdown_entries(snapshot: &CatalogSnapshot, now: DateTime<Utc>) -> Vec<CountdownEntry> {
    snapshot
        .active
        .iter()
        .chain(snapshot.upcoming.iter())
        .filter(|sale| sale.is_active)
        .map(|sale| CountdownEntry::for_sale(sale, now))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::policy::lifecycle::ViolationKind;
    use crate::sale::models::fixtures::{entry, sale};
    use chrono::Duration as ChronoDuration;
    use tempfile::TempDir;

    struct StaticSource {
        active: Vec<Sale>,
        upcoming: Vec<Sale>,
    }

    impl SalesSource for StaticSource {
        fn load_active_sales(&self) -> Result<Vec<Sale>, FlashSaleError> {
            Ok(self.active.clone())
        }

        fn load_upcoming_sales(&self) -> Result<Vec<Sale>, FlashSaleError> {
            Ok(self.upcoming.clone())
        }

        fn get_sale_by_id(&self, id: &SaleId) -> Result<Sale, FlashSaleError> {
            self.active
                .iter()
                .chain(self.upcoming.iter())
                .find(|s| &s.id == id)
                .cloned()
                .ok_or_else(|| FlashSaleError::UnknownSaleId(id.clone()))
        }
    }

    struct FailingSource;

    impl SalesSource for FailingSource {
        fn load_active_sales(&self) -> Result<Vec<Sale>, FlashSaleError> {
            Err(FlashSaleError::ApiTransport("connection refused".to_string()))
        }

        fn load_upcoming_sales(&self) -> Result<Vec<Sale>, FlashSaleError> {
            Ok(Vec::new())
        }

        fn get_sale_by_id(&self, id: &SaleId) -> Result<Sale, FlashSaleError> {
            Err(FlashSaleError::UnknownSaleId(id.clone()))
        }
    }

    fn engine() -> (Arc<MockClock>, FlashSaleEngine) {
        let clock = Arc::new(MockClock::from_rfc3339("2025-03-01T12:00:00Z"));
        let engine = FlashSaleEngine::with_clock(FlashSaleConfig::default(), clock.clone()).unwrap();
        (clock, engine)
    }

    fn source(clock: &MockClock) -> StaticSource {
        let now = clock.now_utc();
        let mut running = sale("run", now);
        running.products.push(entry("p1", 100_000, 75_000));
        let mut later = sale("later", now);
        later.start_time = now + ChronoDuration::hours(2);
        later.end_time = now + ChronoDuration::hours(6);
        StaticSource {
            active: vec![running],
            upcoming: vec![later],
        }
    }

    #[test]
    fn test_engine_creation() {
        let engine = FlashSaleEngine::new(FlashSaleConfig::default());
        assert!(engine.is_ok());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = FlashSaleConfig {
            api_base_url: String::new(),
            ..FlashSaleConfig::default()
        };
        assert!(matches!(
            FlashSaleEngine::new(config),
            Err(FlashSaleError::ConfigError(_))
        ));
    }

    #[test]
    fn test_refresh_tracks_active_and_upcoming() {
        let (clock, mut engine) = engine();
        let report = engine.refresh(&source(&clock)).unwrap();

        assert_eq!(report.added.len(), 2);
        assert_eq!(engine.remaining_ms(&SaleId::new("run")), Some(5 * 60 * 60 * 1000));
        assert_eq!(engine.remaining_ms(&SaleId::new("later")), Some(2 * 60 * 60 * 1000));
        assert_eq!(engine.sale_status(&SaleId::new("later")), Some(SaleStatus::Scheduled));
        assert_eq!(engine.urgency(&SaleId::new("run")), Some(UrgencyTier::Notice));
    }

    #[test]
    fn test_failed_refresh_keeps_countdowns() {
        let (clock, mut engine) = engine();
        engine.refresh(&source(&clock)).unwrap();

        let result = engine.refresh(&FailingSource);
        assert!(matches!(result, Err(FlashSaleError::CatalogLoadFailed(_))));
        assert_eq!(engine.registry().len(), 2);
        assert!(engine
            .resolve_price(&ProductId::new("p1"), Money::new(100_000))
            .is_discounted);
    }

    #[test]
    fn test_resolve_price_through_engine() {
        let (clock, mut engine) = engine();
        engine.refresh(&source(&clock)).unwrap();

        let result = engine.resolve_price(&ProductId::new("p1"), Money::new(100_000));
        assert_eq!(result.price, Money::new(75_000));
        assert_eq!(result.discount_pct, 25);

        clock.advance(ChronoDuration::hours(5));
        let result = engine.resolve_price(&ProductId::new("p1"), Money::new(100_000));
        assert!(!result.is_discounted);
    }

    #[test]
    fn test_validate_edit_unknown_and_locked() {
        let (clock, mut engine) = engine();
        engine.refresh(&source(&clock)).unwrap();

        let edit = SaleEdit {
            start_time: Some(clock.now_utc()),
            ..SaleEdit::default()
        };
        assert!(matches!(
            engine.validate_edit(&SaleId::new("ghost"), &edit),
            Err(FlashSaleError::UnknownSaleId(_))
        ));
        match engine.validate_edit(&SaleId::new("run"), &edit) {
            Err(FlashSaleError::ValidationFailed(v)) => {
                assert_eq!(v[0].kind, ViolationKind::TimingLocked)
            }
            other => panic!("expected ValidationFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_new_sale_uses_clock() {
        let (clock, engine) = engine();
        let draft = SaleDraft {
            name: "Flash Friday".to_string(),
            description: None,
            start_time: clock.now_utc() + ChronoDuration::minutes(5),
            end_time: clock.now_utc() + ChronoDuration::hours(3),
            discount_percentage: 40.0,
            max_discount_amount: Some(Money::new(200_000)),
            priority: 0,
            is_active: true,
        };
        assert!(engine.validate_new_sale(&draft).is_ok());

        clock.advance(ChronoDuration::minutes(10));
        assert!(matches!(
            engine.validate_new_sale(&draft),
            Err(FlashSaleError::ValidationFailed(_))
        ));
    }

    #[test]
    fn test_snapshot_cache_warms_engine() {
        let temp_dir = TempDir::new().unwrap();
        let clock = Arc::new(MockClock::from_rfc3339("2025-03-01T12:00:00Z"));

        let cache = SnapshotCache::with_path(temp_dir.path().to_path_buf()).unwrap();
        let src = source(&clock);
        let snapshot = CatalogSnapshot::from_lists(src.active, src.upcoming, clock.now_utc());
        cache.save(&snapshot).unwrap();

        let engine = FlashSaleEngine::assemble(FlashSaleConfig::default(), clock, Some(cache));

        assert_eq!(engine.registry().len(), 2);
        assert!(engine.catalog().find_by_id(&SaleId::new("run")).is_some());
    }

    #[test]
    fn test_malformed_cached_sale_is_not_priced() {
        let temp_dir = TempDir::new().unwrap();
        let clock = Arc::new(MockClock::from_rfc3339("2025-03-01T12:00:00Z"));
        let now = clock.now_utc();

        let mut tampered = sale("tampered", now);
        tampered.discount_percentage = 250.0;
        tampered.products.push(entry("p1", 100_000, -5_000));
        let cache = SnapshotCache::with_path(temp_dir.path().to_path_buf()).unwrap();
        cache
            .save(&CatalogSnapshot::from_lists(vec![tampered], Vec::new(), now))
            .unwrap();

        let engine = FlashSaleEngine::assemble(FlashSaleConfig::default(), clock, Some(cache));

        let result = engine.resolve_price(&ProductId::new("p1"), Money::new(100_000));
        assert_eq!(result.price, Money::new(100_000));
        assert!(!result.is_discounted);
        assert!(engine.registry().is_empty());
    }

    #[test]
    fn test_started_sale_counts_down_to_end_without_refresh() {
        let (clock, mut engine) = engine();
        engine.refresh(&source(&clock)).unwrap();
        let id = SaleId::new("later");

        clock.advance(ChronoDuration::hours(2));
        let done = engine.poll();
        let refresh = engine.refresh(&FailingSource);

        assert_eq!(done, vec![id.clone()]);
        assert!(refresh.is_err());
        assert_eq!(engine.sale_status(&id), Some(SaleStatus::Running));
        assert_eq!(engine.remaining_ms(&id), Some(4 * 60 * 60 * 1000));
        assert_eq!(engine.urgency(&id), Some(UrgencyTier::Notice));
    }

    #[test]
    fn test_acknowledge_drops_completed_countdown() {
        let (clock, mut engine) = engine();
        let src = source(&clock);
        engine.refresh(&src).unwrap();
        let id = SaleId::new("run");

        assert!(!engine.acknowledge(&id).unwrap());

        clock.advance(ChronoDuration::hours(5));
        assert!(engine.poll().contains(&id));
        assert!(engine.acknowledge(&id).unwrap());
        assert_eq!(engine.remaining_ms(&id), None);

        // The source still lists the ended sale; no timer comes back.
        engine.refresh(&src).unwrap();
        assert_eq!(engine.remaining_ms(&id), None);
        assert!(matches!(
            engine.acknowledge(&id),
            Err(FlashSaleError::UnknownSaleId(_))
        ));
    }

    #[test]
    fn test_shutdown_stops_polling() {
        let (clock, mut engine) = engine();
        engine.refresh(&source(&clock)).unwrap();
        engine.shutdown();

        clock.advance(ChronoDuration::hours(10));
        assert!(engine.poll().is_empty());
        assert_eq!(engine.next_wake(), None);
    }

    #[test]
    fn test_countdown_entries_skip_inactive() {
        let clock = MockClock::from_rfc3339("2025-03-01T12:00:00Z");
        let now = clock.now_utc();
        let mut off = sale("off", now);
        off.is_active = false;
        let snapshot = CatalogSnapshot::from_lists(vec![off, sale("on", now)], Vec::new(), now);

        let entries = countdown_entries(&snapshot, now);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id.as_str(), "on");
    }
}
