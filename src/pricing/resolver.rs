//! Best-price resolution across overlapping flash sales.
//!
//! A product can sit in several sales at once. The price shown is the
//! lowest effective flash price among running sales whose entry is not sold
//! out. Equal prices go to the higher `priority`, then the earlier
//! `start_time`, then catalog order.

use crate::clock::Clock;
use crate::sale::catalog::CatalogSnapshot;
use crate::sale::models::{FlashSaleProductEntry, Money, ProductId, Sale, SaleId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp::{Ordering, Reverse};
use std::sync::Arc;

/// Price to show for a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingResult {
    /// Price the customer pays.
    pub price: Money,
    /// Regular price supplied by the caller.
    pub original_price: Money,
    /// Discount in whole percent.
    pub discount_pct: u8,
    /// `original_price - price`, never negative.
    pub savings: Money,
    /// Sale that supplied the price, if any.
    pub source_sale: Option<SaleId>,
    /// Whether a flash price is in effect.
    pub is_discounted: bool,
}

impl PricingResult {
    /// Regular price, no sale applied.
    pub fn regular(original_price: Money) -> Self {
        Self {
            price: original_price,
            original_price,
            discount_pct: 0,
            savings: Money::zero(),
            source_sale: None,
            is_discounted: false,
        }
    }

    fn discounted(original_price: Money, price: Money, sale: &SaleId) -> Self {
        let savings = original_price.saturating_sub(price);
        Self {
            price,
            original_price,
            discount_pct: discount_pct(original_price, savings),
            savings,
            source_sale: Some(sale.clone()),
            is_discounted: true,
        }
    }
}

/// The winning entry for a product.
#[derive(Debug, Clone, Copy)]
pub struct BestOffer<'a> {
    /// Sale offering the price.
    pub sale: &'a Sale,
    /// Entry within that sale.
    pub entry: &'a FlashSaleProductEntry,
    /// Effective price after the sale's discount cap.
    pub price: Money,
}

/// Pick the best eligible offer for `product_id` at `now`.
pub fn best_offer<'a>(
    snapshot: &'a CatalogSnapshot,
    product_id: &'a ProductId,
    now: DateTime<Utc>,
) -> Option<BestOffer<'a>> {
    snapshot
        .sales_containing_product(product_id)
        .filter(|(sale, entry)| sale.is_running_at(now) && !entry.is_sold_out())
        .map(|(sale, entry)| BestOffer {
            sale,
            entry,
            price: sale.effective_price(entry),
        })
        .min_by(compare_offers)
}

fn compare_offers(a: &BestOffer<'_>, b: &BestOffer<'_>) -> Ordering {
    (a.price, Reverse(a.sale.priority), a.sale.start_time).cmp(&(
        b.price,
        Reverse(b.sale.priority),
        b.sale.start_time,
    ))
}

/// Resolve the price of `product_id` against a snapshot at `now`.
///
/// Pure: the same inputs always give the same result.
pub fn resolve_at(
    snapshot: &CatalogSnapshot,
    product_id: &ProductId,
    original_price: Money,
    now: DateTime<Utc>,
) -> PricingResult {
    match best_offer(snapshot, product_id, now) {
        // A flash price at or above the caller's regular price is no discount.
        Some(offer) if offer.price < original_price => {
            PricingResult::discounted(original_price, offer.price, &offer.sale.id)
        }
        _ => PricingResult::regular(original_price),
    }
}

/// Flash price for an item given the sale's headline discount and cap.
///
/// `original - min(original * pct / 100, cap)`, rounded to the shilling.
pub fn compute_flash_price(
    original_price: Money,
    discount_percentage: f64,
    max_discount_amount: Option<Money>,
) -> Money {
    let mut discount = original_price.percentage_of(discount_percentage);
    if let Some(cap) = max_discount_amount {
        discount = discount.min(cap);
    }
    original_price.saturating_sub(discount)
}

fn discount_pct(original_price: Money, savings: Money) -> u8 {
    if original_price.amount() <= 0 {
        return 0;
    }
    let pct = (savings.amount() as f64 * 100.0 / original_price.amount() as f64).round();
    pct.clamp(0.0, 100.0) as u8
}

/// Clock-bound resolver.
#[derive(Clone)]
pub struct PricingResolver {
    clock: Arc<dyn Clock>,
}

impl PricingResolver {
    /// Create a resolver reading time from `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Resolve against `snapshot` at the current time.
    pub fn resolve(
        &self,
        snapshot: &CatalogSnapshot,
        product_id: &ProductId,
        original_price: Money,
    ) -> PricingResult {
        resolve_at(snapshot, product_id, original_price, self.clock.now_utc())
    }
}
