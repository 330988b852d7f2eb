//! Reqwest-based HTTP client for the storefront Sales API.
//!
//! The API wraps every payload in `{ "success": bool, "data": ... }`. This
//! client unwraps it and hands back typed [`Sale`] records; ingestion
//! checks happen later, in the catalog.

use crate::config::FlashSaleConfig;
use crate::sale::catalog::SalesSource;
use crate::sale::models::{Sale, SaleId};
use crate::FlashSaleError;
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, USER_AGENT};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Response envelope used by the Sales API.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope<T> {
    /// Whether the server handled the request.
    #[serde(default = "default_success")]
    pub success: bool,

    /// Error text when `success` is false.
    #[serde(default)]
    pub message: Option<String>,

    /// Payload.
    pub data: Option<T>,
}

fn default_success() -> bool {
    true
}

impl<T> ApiEnvelope<T> {
    /// Unwrap the payload, turning a failed envelope into an error.
    pub fn into_data(self) -> Result<T, FlashSaleError> {
        if !self.success {
            return Err(FlashSaleError::ApiTransport(
                self.message
                    .unwrap_or_else(|| "request was not successful".to_string()),
            ));
        }
        self.data
            .ok_or_else(|| FlashSaleError::ProtocolError("response has no data".to_string()))
    }
}

/// Decode a Sales API body.
pub fn parse_envelope<T: DeserializeOwned>(body: &[u8]) -> Result<T, FlashSaleError> {
    let envelope: ApiEnvelope<T> = serde_json::from_slice(body).map_err(|e| {
        FlashSaleError::ProtocolError(format!("Failed to parse Sales API response: {}", e))
    })?;
    envelope.into_data()
}

/// Sales API HTTP client.
pub struct SalesApiClient {
    client: Client,
    base_url: String,
    user_agent: String,
}

impl SalesApiClient {
    /// Create a new client from config.
    pub fn new(config: &FlashSaleConfig) -> Result<Self, FlashSaleError> {
        let client = build_client(config.request_timeout)?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            user_agent: build_user_agent(config),
        })
    }

    /// The configured base URL, without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Full URL for an API path.
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, FlashSaleError> {
        let url = self.url(path);
        debug!(%url, "sales api request");

        let response = self
            .client
            .get(&url)
            .header(USER_AGENT, &self.user_agent)
            .header(ACCEPT, "application/json")
            .send()
            .map_err(|e| FlashSaleError::ApiTransport(format!("Request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .bytes()
            .map_err(|e| FlashSaleError::ApiTransport(format!("Failed to read body: {}", e)))?;

        if !status.is_success() {
            return Err(FlashSaleError::ApiTransport(format!(
                "GET {} returned {}",
                path, status
            )));
        }

        parse_envelope(&body)
    }
}

impl SalesSource for SalesApiClient {
    fn load_active_sales(&self) -> Result<Vec<Sale>, FlashSaleError> {
        self.get("flash-sales/active")
    }

    fn load_upcoming_sales(&self) -> Result<Vec<Sale>, FlashSaleError> {
        self.get("flash-sales/upcoming")
    }

    fn get_sale_by_id(&self, id: &SaleId) -> Result<Sale, FlashSaleError> {
        self.get(&format!("flash-sales/{}", id))
    }
}

fn build_client(timeout: Duration) -> Result<Client, FlashSaleError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| FlashSaleError::ConfigError(format!("Failed to build HTTP client: {}", e)))
}

/// Build a User-Agent string from config.
///
/// Format: `<product> flashsale/<version>`
pub fn build_user_agent(config: &FlashSaleConfig) -> String {
    format!(
        "{} flashsale/{}",
        config.user_agent_product,
        env!("CARGO_PKG_VERSION")
    )
}
