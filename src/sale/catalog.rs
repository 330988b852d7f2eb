//! Authoritative, snapshot-published list of flash sales.
//!
//! The catalog never mutates a published snapshot. Every refresh builds a
//! new [`CatalogSnapshot`] and swaps it in through a `tokio::sync::watch`
//! channel, so a reader holding an `Arc<CatalogSnapshot>` always sees one
//! consistent generation of data.

use crate::sale::models::{FlashSaleProductEntry, ProductId, Sale, SaleId};
use crate::FlashSaleError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Where sales come from.
///
/// The production implementation is [`crate::client::http::SalesApiClient`];
/// tests supply in-memory fakes.
pub trait SalesSource {
    /// Sales currently running.
    fn load_active_sales(&self) -> Result<Vec<Sale>, FlashSaleError>;

    /// Sales scheduled to start later.
    fn load_upcoming_sales(&self) -> Result<Vec<Sale>, FlashSaleError>;

    /// A single sale by id.
    fn get_sale_by_id(&self, id: &SaleId) -> Result<Sale, FlashSaleError>;
}

/// One immutable generation of catalog data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogSnapshot {
    /// Sales the API reported as running.
    pub active: Vec<Sale>,

    /// Sales the API reported as upcoming.
    pub upcoming: Vec<Sale>,

    /// Every known sale, in catalog order.
    pub all: Vec<Sale>,

    /// When this generation was built.
    pub refreshed_at: Option<DateTime<Utc>>,
}

impl CatalogSnapshot {
    /// Build a snapshot from active and upcoming lists.
    ///
    /// `all` becomes the id-deduplicated union, active first.
    pub fn from_lists(active: Vec<Sale>, upcoming: Vec<Sale>, now: DateTime<Utc>) -> Self {
        let all = union(&[&active, &upcoming]);
        Self {
            active,
            upcoming,
            all,
            refreshed_at: Some(now),
        }
    }

    /// Look up a sale by id.
    pub fn find_by_id(&self, id: &SaleId) -> Option<&Sale> {
        self.all.iter().find(|s| &s.id == id)
    }

    /// Every `(sale, entry)` pair that prices `product_id`, in catalog order.
    pub fn sales_containing_product<'a>(
        &'a self,
        product_id: &'a ProductId,
    ) -> impl Iterator<Item = (&'a Sale, &'a FlashSaleProductEntry)> + 'a {
        self.all
            .iter()
            .filter_map(move |sale| sale.entry_for(product_id).map(|entry| (sale, entry)))
    }

    /// Whether the snapshot holds no sales at all.
    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }
}

/// Holder of the currently published [`CatalogSnapshot`].
pub struct SaleCatalog {
    tx: watch::Sender<Arc<CatalogSnapshot>>,
}

impl SaleCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::with_snapshot(CatalogSnapshot::default())
    }

    /// Create a catalog that starts out publishing `snapshot`.
    ///
    /// The snapshot may come from outside the process (e.g. the on-disk
    /// cache), so every list goes through the same checks as a refresh.
    pub fn with_snapshot(snapshot: CatalogSnapshot) -> Self {
        let snapshot = CatalogSnapshot {
            active: admit(snapshot.active, "active"),
            upcoming: admit(snapshot.upcoming, "upcoming"),
            all: admit(snapshot.all, "all"),
            refreshed_at: snapshot.refreshed_at,
        };
        let (tx, _rx) = watch::channel(Arc::new(snapshot));
        Self { tx }
    }

    /// The currently published snapshot.
    pub fn snapshot(&self) -> Arc<CatalogSnapshot> {
        self.tx.borrow().clone()
    }

    /// Receive every future publish.
    pub fn subscribe(&self) -> watch::Receiver<Arc<CatalogSnapshot>> {
        self.tx.subscribe()
    }

    /// Look up a sale by id in the current snapshot.
    pub fn find_by_id(&self, id: &SaleId) -> Option<Sale> {
        self.tx.borrow().find_by_id(id).cloned()
    }

    /// Like [`find_by_id`](Self::find_by_id), but an unknown id is an error.
    pub fn require(&self, id: &SaleId) -> Result<Sale, FlashSaleError> {
        self.find_by_id(id)
            .ok_or_else(|| FlashSaleError::UnknownSaleId(id.clone()))
    }

    /// Reload active and upcoming sales from `source`.
    ///
    /// Both loads must succeed. On any failure the current snapshot stays
    /// published and the error is returned as `CatalogLoadFailed`.
    pub fn refresh(
        &self,
        source: &dyn SalesSource,
        now: DateTime<Utc>,
    ) -> Result<Arc<CatalogSnapshot>, FlashSaleError> {
        let active = source.load_active_sales().map_err(load_failed("active"))?;
        let upcoming = source
            .load_upcoming_sales()
            .map_err(load_failed("upcoming"))?;

        Ok(self.apply_loaded(active, upcoming, now))
    }

    /// Publish freshly loaded lists.
    ///
    /// This is the single point where external data enters the catalog.
    /// Malformed records are dropped here.
    pub fn apply_loaded(
        &self,
        active: Vec<Sale>,
        upcoming: Vec<Sale>,
        now: DateTime<Utc>,
    ) -> Arc<CatalogSnapshot> {
        let active = admit(active, "active");
        let upcoming = admit(upcoming, "upcoming");
        let snapshot = CatalogSnapshot::from_lists(active, upcoming, now);

        info!(
            active = snapshot.active.len(),
            upcoming = snapshot.upcoming.len(),
            "flash sale catalog refreshed"
        );
        self.publish(snapshot)
    }

    /// Replace the `all` list (e.g. the admin view of every sale).
    ///
    /// `active` and `upcoming` are carried over from the current snapshot.
    pub fn replace_all(&self, sales: Vec<Sale>, now: DateTime<Utc>) -> Arc<CatalogSnapshot> {
        let current = self.snapshot();
        let snapshot = CatalogSnapshot {
            active: current.active.clone(),
            upcoming: current.upcoming.clone(),
            all: admit(sales, "all"),
            refreshed_at: Some(now),
        };
        self.publish(snapshot)
    }

    /// Fetch one sale from `source` and upsert it.
    pub fn reload_sale(
        &self,
        source: &dyn SalesSource,
        id: &SaleId,
        now: DateTime<Utc>,
    ) -> Result<Arc<CatalogSnapshot>, FlashSaleError> {
        let sale = source.get_sale_by_id(id).map_err(load_failed("sale"))?;
        if sale.id != *id {
            return Err(FlashSaleError::CatalogLoadFailed(format!(
                "requested sale {} but received {}",
                id, sale.id
            )));
        }
        self.apply_sale(sale, now)
    }

    /// Upsert a single sale into a new snapshot.
    ///
    /// The sale is filed under `active` or `upcoming` by its window at
    /// `now`, or under neither. A sale already in `all` keeps its position
    /// there; a new one is appended.
    pub fn apply_sale(
        &self,
        sale: Sale,
        now: DateTime<Utc>,
    ) -> Result<Arc<CatalogSnapshot>, FlashSaleError> {
        let issues = sale.integrity_issues();
        if !issues.is_empty() {
            return Err(FlashSaleError::CatalogLoadFailed(format!(
                "sale {} is malformed: {}",
                sale.id,
                issues.join("; ")
            )));
        }

        let mut next = (*self.snapshot()).clone();
        next.active.retain(|s| s.id != sale.id);
        next.upcoming.retain(|s| s.id != sale.id);

        // Re-file by window at `now`; a known sale may have opened since.
        if sale.is_running_at(now) {
            next.active.push(sale.clone());
        } else if sale.is_active && sale.start_time > now {
            next.upcoming.push(sale.clone());
        }

        let known = match next.all.iter_mut().find(|s| s.id == sale.id) {
            Some(slot) => {
                *slot = sale.clone();
                true
            }
            None => {
                next.all.push(sale.clone());
                false
            }
        };
        next.refreshed_at = Some(now);

        debug!(sale_id = %sale.id, known, "sale upserted into catalog");
        Ok(self.publish(next))
    }

    fn publish(&self, snapshot: CatalogSnapshot) -> Arc<CatalogSnapshot> {
        let snapshot = Arc::new(snapshot);
        self.tx.send_replace(snapshot.clone());
        snapshot
    }
}

impl Default for SaleCatalog {
    fn default() -> Self {
        Self::new()
    }
}

fn load_failed(what: &'static str) -> impl Fn(FlashSaleError) -> FlashSaleError {
    move |e| {
        warn!(list = what, error = %e, "flash sale load rejected; keeping previous snapshot");
        match e {
            FlashSaleError::CatalogLoadFailed(msg) => FlashSaleError::CatalogLoadFailed(msg),
            other => FlashSaleError::CatalogLoadFailed(format!("{} sales: {}", what, other)),
        }
    }
}

/// Drop malformed and duplicate records.
fn admit(sales: Vec<Sale>, list: &str) -> Vec<Sale> {
    let mut seen = HashSet::new();
    sales
        .into_iter()
        .filter(|sale| {
            let issues = sale.integrity_issues();
            if !issues.is_empty() {
                warn!(list, sale_id = %sale.id, issues = ?issues, "dropping malformed sale");
                return false;
            }
            if !seen.insert(sale.id.clone()) {
                warn!(list, sale_id = %sale.id, "dropping duplicate sale id");
                return false;
            }
            true
        })
        .collect()
}

fn union(lists: &[&Vec<Sale>]) -> Vec<Sale> {
    let mut seen = HashSet::new();
    lists
        .iter()
        .flat_map(|list| list.iter())
        .filter(|sale| seen.insert(sale.id.clone()))
        .cloned()
        .collect()
}
