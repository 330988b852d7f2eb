//! Flash-sale error types.

use crate::policy::lifecycle::Violation;
use crate::sale::models::SaleId;
use thiserror::Error;

/// Errors that can occur in the flash-sale core.
#[derive(Debug, Error)]
pub enum FlashSaleError {
    /// Configuration is invalid.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Countdown target is not a usable timestamp.
    #[error("Invalid countdown target: {value}")]
    InvalidTarget {
        /// The rejected input, rendered for display.
        value: String,
    },

    /// Sale input broke one or more business rules.
    #[error("Validation failed with {} violation(s)", .0.len())]
    ValidationFailed(Vec<Violation>),

    /// A sales load was rejected; the previous snapshot is still published.
    #[error("Catalog load failed: {0}")]
    CatalogLoadFailed(String),

    /// No sale with this id is currently known.
    #[error("Unknown sale id: {0}")]
    UnknownSaleId(SaleId),

    /// HTTP transport error talking to the Sales API.
    #[error("Sales API transport error: {0}")]
    ApiTransport(String),

    /// Sales API returned a body we could not decode.
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// Snapshot cache I/O error.
    #[error("Cache I/O error: {0}")]
    CacheIO(String),
}
