//! Sale records as delivered by the Sales API, plus the identifier and money
//! newtypes they are built from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create an id from a string.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Get the id as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

define_id!(
    /// Identifier of a flash sale, unique within a catalog snapshot.
    SaleId
);
define_id!(
    /// Opaque key into the external product catalog.
    ProductId
);

/// An amount in Ugandan shillings.
///
/// UGX has no minor unit in circulation, so amounts are whole shillings.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Create an amount from whole shillings.
    pub const fn new(shillings: i64) -> Self {
        Self(shillings)
    }

    /// Zero shillings.
    pub const fn zero() -> Self {
        Self(0)
    }

    /// The raw amount.
    pub const fn amount(self) -> i64 {
        self.0
    }

    /// `self - other`, floored at zero.
    pub fn saturating_sub(self, other: Money) -> Money {
        Money(self.0.saturating_sub(other.0).max(0))
    }

    /// `percent`% of this amount, rounded to the nearest shilling.
    pub fn percentage_of(self, percent: f64) -> Money {
        Money((self.0 as f64 * percent / 100.0).round() as i64)
    }

    /// Whether the amount is negative.
    pub fn is_negative(self) -> bool {
        self.0 < 0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.0.unsigned_abs().to_string();
        let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
        for (i, ch) in digits.chars().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                grouped.push(',');
            }
            grouped.push(ch);
        }
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "UGX {}{}", sign, grouped)
    }
}

/// One product's flash pricing inside a sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlashSaleProductEntry {
    /// Product this entry prices.
    #[serde(alias = "product")]
    pub product_id: ProductId,

    /// Regular price at the time the sale was created.
    pub original_price: Money,

    /// Discounted price during the sale.
    pub flash_price: Money,

    /// Maximum units sold at the flash price (None = unlimited).
    #[serde(default)]
    pub stock_limit: Option<u64>,

    /// Units sold so far. Only ever grows.
    #[serde(default)]
    pub sold_quantity: u64,
}

impl FlashSaleProductEntry {
    /// Whether the stock limit has been reached.
    pub fn is_sold_out(&self) -> bool {
        matches!(self.stock_limit, Some(limit) if self.sold_quantity >= limit)
    }

    /// Units still available at the flash price (None = unlimited).
    pub fn remaining_stock(&self) -> Option<u64> {
        self.stock_limit
            .map(|limit| limit.saturating_sub(self.sold_quantity))
    }

    /// Sold share of the stock limit in whole percent, capped at 100.
    pub fn sold_percentage(&self) -> Option<u8> {
        match self.stock_limit {
            Some(0) => Some(100),
            Some(limit) => Some(((self.sold_quantity.min(limit) * 100) / limit) as u8),
            None => None,
        }
    }
}

/// A time-boxed promotion over a set of products.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sale {
    /// Unique sale identifier.
    #[serde(alias = "_id")]
    pub id: SaleId,

    /// Display name.
    pub name: String,

    /// Optional marketing copy.
    #[serde(default)]
    pub description: Option<String>,

    /// When the sale opens.
    pub start_time: DateTime<Utc>,

    /// When the sale closes. Always after `start_time`.
    pub end_time: DateTime<Utc>,

    /// Headline discount in `(0, 100]`.
    pub discount_percentage: f64,

    /// Per-item cap on the discount amount.
    #[serde(default)]
    pub max_discount_amount: Option<Money>,

    /// Tie-break rank when two sales offer the same price. Higher wins.
    #[serde(default)]
    pub priority: i32,

    /// Administrative switch, independent of the time window.
    #[serde(default = "default_active")]
    pub is_active: bool,

    /// Priced products, in the order the API returned them.
    #[serde(default)]
    pub products: Vec<FlashSaleProductEntry>,
}

fn default_active() -> bool {
    true
}

impl Sale {
    /// Whether the sale is running at `now`.
    pub fn is_running_at(&self, now: DateTime<Utc>) -> bool {
        crate::policy::lifecycle::is_running(self, now)
    }

    /// The entry for a product, if this sale prices it.
    pub fn entry_for(&self, product_id: &ProductId) -> Option<&FlashSaleProductEntry> {
        self.products.iter().find(|e| &e.product_id == product_id)
    }

    /// Price an entry actually sells at, honoring `max_discount_amount`.
    pub fn effective_price(&self, entry: &FlashSaleProductEntry) -> Money {
        match self.max_discount_amount {
            Some(cap) => entry.flash_price.max(entry.original_price.saturating_sub(cap)),
            None => entry.flash_price,
        }
    }

    /// Structural problems that make this record unusable.
    ///
    /// An empty list means the record is safe to feed into pricing and
    /// countdown math.
    pub fn integrity_issues(&self) -> Vec<String> {
        let mut issues = Vec::new();

        if self.id.as_str().is_empty() {
            issues.push("id is empty".to_string());
        }
        if self.start_time >= self.end_time {
            issues.push(format!(
                "startTime {} is not before endTime {}",
                self.start_time, self.end_time
            ));
        }
        if !(self.discount_percentage > 0.0 && self.discount_percentage <= 100.0) {
            issues.push(format!(
                "discountPercentage {} outside (0, 100]",
                self.discount_percentage
            ));
        }
        if matches!(self.max_discount_amount, Some(cap) if cap <= Money::zero()) {
            issues.push("maxDiscountAmount must be positive".to_string());
        }
        let mut priced = HashSet::new();
        for entry in &self.products {
            if !priced.insert(&entry.product_id) {
                issues.push(format!("product {} is listed more than once", entry.product_id));
            }
            if entry.original_price.is_negative() || entry.flash_price.is_negative() {
                issues.push(format!("product {} has a negative price", entry.product_id));
            }
            if entry.flash_price > entry.original_price {
                issues.push(format!(
                    "product {} flashPrice {} exceeds originalPrice {}",
                    entry.product_id, entry.flash_price, entry.original_price
                ));
            }
        }

        issues
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use chrono::Duration;

    /// A running, active sale around `now` with no products.
    pub fn sale(id: &str, now: DateTime<Utc>) -> Sale {
        Sale {
            id: SaleId::new(id),
            name: format!("Sale {}", id),
            description: None,
            start_time: now - Duration::hours(1),
            end_time: now + Duration::hours(5),
            discount_percentage: 20.0,
            max_discount_amount: None,
            priority: 0,
            is_active: true,
            products: Vec::new(),
        }
    }

    pub fn entry(product: &str, original: i64, flash: i64) -> FlashSaleProductEntry {
        FlashSaleProductEntry {
            product_id: ProductId::new(product),
            original_price: Money::new(original),
            flash_price: Money::new(flash),
            stock_limit: None,
            sold_quantity: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::{entry, sale};
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_money_display_groups_thousands() {
        assert_eq!(Money::new(80_000).to_string(), "UGX 80,000");
        assert_eq!(Money::new(1_250_500).to_string(), "UGX 1,250,500");
        assert_eq!(Money::new(999).to_string(), "UGX 999");
        assert_eq!(Money::new(-5_000).to_string(), "UGX -5,000");
    }

    #[test]
    fn test_money_saturating_sub_floors_at_zero() {
        assert_eq!(Money::new(100).saturating_sub(Money::new(30)), Money::new(70));
        assert_eq!(Money::new(30).saturating_sub(Money::new(100)), Money::zero());
    }

    #[test]
    fn test_money_percentage_rounds() {
        assert_eq!(Money::new(99_999).percentage_of(15.0), Money::new(15_000));
    }

    #[test]
    fn test_sold_out_requires_limit() {
        let mut e = entry("p1", 100, 80);
        e.sold_quantity = 1_000;
        assert!(!e.is_sold_out());
        assert_eq!(e.remaining_stock(), None);

        e.stock_limit = Some(10);
        assert!(e.is_sold_out());
        assert_eq!(e.remaining_stock(), Some(0));
        assert_eq!(e.sold_percentage(), Some(100));
    }

    #[test]
    fn test_stock_progress() {
        let mut e = entry("p1", 100, 80);
        e.stock_limit = Some(40);
        e.sold_quantity = 10;
        assert!(!e.is_sold_out());
        assert_eq!(e.remaining_stock(), Some(30));
        assert_eq!(e.sold_percentage(), Some(25));
    }

    #[test]
    fn test_effective_price_applies_cap() {
        let mut s = sale("s1", now());
        let e = entry("p1", 100_000, 50_000);
        assert_eq!(s.effective_price(&e), Money::new(50_000));

        s.max_discount_amount = Some(Money::new(30_000));
        assert_eq!(s.effective_price(&e), Money::new(70_000));
    }

    #[test]
    fn test_integrity_accepts_well_formed_sale() {
        let mut s = sale("s1", now());
        s.products.push(entry("p1", 100, 80));
        assert!(s.integrity_issues().is_empty());
    }

    #[test]
    fn test_integrity_flags_inverted_window_and_bad_prices() {
        let mut s = sale("s1", now());
        s.end_time = s.start_time;
        s.discount_percentage = 0.0;
        s.products.push(entry("p1", 80, 100));
        assert_eq!(s.integrity_issues().len(), 3);
    }

    #[test]
    fn test_integrity_flags_repeated_product() {
        let mut s = sale("s1", now());
        let mut sold_out = entry("p1", 100, 60);
        sold_out.stock_limit = Some(5);
        sold_out.sold_quantity = 5;
        s.products.push(sold_out);
        s.products.push(entry("p1", 100, 80));

        let issues = s.integrity_issues();
        assert_eq!(issues.len(), 1);
        assert!(issues[0].contains("more than once"));
    }

    #[test]
    fn test_integrity_flags_nan_discount() {
        let mut s = sale("s1", now());
        s.discount_percentage = f64::NAN;
        assert_eq!(s.integrity_issues().len(), 1);
    }

    #[test]
    fn test_deserialize_api_shape() {
        let json = r#"{
            "_id": "65f1c0",
            "name": "Weekend Blast",
            "startTime": "2025-03-01T08:00:00Z",
            "endTime": "2025-03-02T20:00:00Z",
            "discountPercentage": 25,
            "maxDiscountAmount": 50000,
            "priority": 3,
            "products": [
                { "product": "p-42", "originalPrice": 120000, "flashPrice": 90000, "stockLimit": 15, "soldQuantity": 4 }
            ]
        }"#;

        let s: Sale = serde_json::from_str(json).unwrap();
        assert_eq!(s.id.as_str(), "65f1c0");
        assert!(s.is_active);
        assert_eq!(s.priority, 3);
        assert_eq!(s.max_discount_amount, Some(Money::new(50_000)));
        assert_eq!(s.products[0].product_id.as_str(), "p-42");
        assert_eq!(s.products[0].remaining_stock(), Some(11));
        assert!(s.entry_for(&ProductId::new("p-42")).is_some());
        assert!(s.entry_for(&ProductId::new("p-43")).is_none());
    }
}
