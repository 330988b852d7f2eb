//! # flashsale
//!
//! **Countdown and pricing engine for storefront flash sales.**
//!
//! flashsale keeps a published catalog of active and upcoming sales, runs
//! one countdown per sale, and answers the two questions every product page
//! asks: *what does this cost right now* and *how long is left*.
//!
//! ## Features
//!
//! - **Adaptive countdowns**: 1s ticks in the final hour, coarser before that
//! - **Pull-based scheduling**: the host loop asks for the next wake time
//! - **Best-price resolution**: lowest price wins, then priority, then start time
//! - **Sold-out fall-through**: exhausted entries never win a price
//! - **Lifecycle validation**: timing and discount rules for sale forms
//! - **Last-known-good cache**: the catalog survives a Sales API outage
//!
//! ## Quickstart
//!
//! ```no_run
//! use flashsale::{FlashSaleConfig, FlashSaleEngine, Money, ProductId, SalesApiClient};
//!
//! fn main() -> Result<(), flashsale::FlashSaleError> {
//!     let config = FlashSaleConfig {
//!         api_base_url: "https://shop.example.ug/api".to_string(),
//!         cache_namespace: Some("storefront".to_string()),
//!         ..FlashSaleConfig::default()
//!     };
//!
//!     let client = SalesApiClient::new(&config)?;
//!     let mut engine = FlashSaleEngine::new(config)?;
//!     engine.refresh(&client)?;
//!
//!     let price = engine.resolve_price(&ProductId::new("phone-1"), Money::new(850_000));
//!     println!("{} ({}% off)", price.price, price.discount_pct);
//!
//!     loop {
//!         if let Some(wait) = engine.sleep_duration() {
//!             std::thread::sleep(wait);
//!         }
//!         if !engine.poll().is_empty() {
//!             engine.refresh(&client)?;
//!         }
//!     }
//! }
//! ```
//!
//! ## Configuration
//!
//! - `cadence`: tick intervals and the thresholds between them
//! - `timing`: minimum and maximum sale duration
//! - `api_base_url`: Sales API root
//! - `cache_namespace`: enables the on-disk snapshot cache
//!
//! See [`FlashSaleConfig`] for full documentation.

#![deny(missing_docs)]
#![doc(html_root_url = "https://docs.rs/flashsale/0.1.0")]

// Core modules
pub mod clock;
pub mod config;
pub mod errors;

// Domain layer
pub mod sale;

// Countdown layer
pub mod countdown;

// Pricing layer
pub mod pricing;

// Policy layer
pub mod policy;

// Client layer
pub mod client;

// Cache layer
pub mod cache;

// Manager (main public API)
pub mod manager;

// Re-exports for public API
pub use cache::file::SnapshotCache;
pub use client::http::SalesApiClient;
pub use clock::{Clock, SystemClock};
pub use config::{CadenceConfig, FlashSaleConfig, TimingRules};
pub use countdown::format::CountdownBreakdown;
pub use countdown::registry::{CountdownEntry, CountdownRegistry, ReconcileReport};
pub use countdown::timer::{CountdownTimer, TickOutcome, TimerState};
pub use errors::FlashSaleError;
pub use manager::FlashSaleEngine;
pub use policy::lifecycle::{SaleDraft, SaleEdit, SaleStatus, Violation, ViolationKind};
pub use policy::urgency::UrgencyTier;
pub use pricing::resolver::{PricingResolver, PricingResult};
pub use sale::catalog::{CatalogSnapshot, SaleCatalog, SalesSource};
pub use sale::models::{FlashSaleProductEntry, Money, ProductId, Sale, SaleId};

#[cfg(any(test, feature = "test-seams"))]
pub use clock::MockClock;
