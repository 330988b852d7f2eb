//! Flash-sale engine configuration.

use chrono::Duration as ChronoDuration;
use std::time::Duration;

/// Tick cadence bands for countdown timers.
///
/// A timer ticks every `fine_interval` once it is within `fine_threshold` of
/// its target, every `coarse_interval` while more than `coarse_threshold`
/// remains, and every `medium_interval` in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CadenceConfig {
    /// Interval used near expiry.
    pub fine_interval: Duration,
    /// Interval between the two thresholds.
    pub medium_interval: Duration,
    /// Interval used far from expiry.
    pub coarse_interval: Duration,
    /// Remaining time at or below which the fine interval applies.
    pub fine_threshold: Duration,
    /// Remaining time above which the coarse interval applies.
    pub coarse_threshold: Duration,
}

impl Default for CadenceConfig {
    fn default() -> Self {
        Self {
            fine_interval: Duration::from_secs(1),
            medium_interval: Duration::from_secs(30),
            coarse_interval: Duration::from_secs(60),
            fine_threshold: Duration::from_secs(60 * 60),
            coarse_threshold: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl CadenceConfig {
    /// Pick the tick interval in milliseconds for the given remaining time.
    pub fn interval_for(&self, remaining_ms: u64) -> u64 {
        let remaining = Duration::from_millis(remaining_ms);
        let interval = if remaining <= self.fine_threshold {
            self.fine_interval
        } else if remaining > self.coarse_threshold {
            self.coarse_interval
        } else {
            self.medium_interval
        };
        interval.as_millis() as u64
    }
}

/// Business rules for sale windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingRules {
    /// Shortest allowed sale.
    pub min_duration: ChronoDuration,
    /// Longest allowed sale.
    pub max_duration: ChronoDuration,
}

impl Default for TimingRules {
    fn default() -> Self {
        Self {
            min_duration: ChronoDuration::hours(1),
            max_duration: ChronoDuration::days(30),
        }
    }
}

/// Configuration for the flash-sale engine.
#[derive(Debug, Clone)]
pub struct FlashSaleConfig {
    /// Countdown tick cadence.
    pub cadence: CadenceConfig,

    /// Sale window rules used by lifecycle validation.
    pub timing: TimingRules,

    /// Base URL of the Sales API (e.g. "https://shop.example.ug/api").
    pub api_base_url: String,

    /// Per-request timeout for the Sales API client.
    pub request_timeout: Duration,

    /// User-Agent product identifier sent to the Sales API.
    pub user_agent_product: String,

    /// Namespace for the last-known-good snapshot cache.
    /// `None` disables persistence.
    pub cache_namespace: Option<String>,
}

impl Default for FlashSaleConfig {
    fn default() -> Self {
        Self {
            cadence: CadenceConfig::default(),
            timing: TimingRules::default(),
            api_base_url: "http://localhost:5000/api".to_string(),
            request_timeout: Duration::from_secs(30),
            user_agent_product: "storefront".to_string(),
            cache_namespace: None,
        }
    }
}

impl FlashSaleConfig {
    /// Validate configuration for obvious errors.
    pub fn validate(&self) -> Result<(), crate::FlashSaleError> {
        let c = &self.cadence;
        if c.fine_interval.is_zero() {
            return Err(crate::FlashSaleError::ConfigError(
                "cadence.fine_interval must be greater than zero".to_string(),
            ));
        }
        if c.fine_interval > c.medium_interval || c.medium_interval > c.coarse_interval {
            return Err(crate::FlashSaleError::ConfigError(format!(
                "cadence intervals must be ordered fine <= medium <= coarse, got {:?}/{:?}/{:?}",
                c.fine_interval, c.medium_interval, c.coarse_interval
            )));
        }
        if c.fine_threshold >= c.coarse_threshold {
            return Err(crate::FlashSaleError::ConfigError(
                "cadence.fine_threshold must be below cadence.coarse_threshold".to_string(),
            ));
        }
        if self.timing.min_duration >= self.timing.max_duration {
            return Err(crate::FlashSaleError::ConfigError(
                "timing.min_duration must be below timing.max_duration".to_string(),
            ));
        }
        if self.api_base_url.is_empty() {
            return Err(crate::FlashSaleError::ConfigError(
                "api_base_url cannot be empty".to_string(),
            ));
        }
        if matches!(&self.cache_namespace, Some(ns) if ns.is_empty()) {
            return Err(crate::FlashSaleError::ConfigError(
                "cache_namespace cannot be empty when set".to_string(),
            ));
        }
        Ok(())
    }
}
