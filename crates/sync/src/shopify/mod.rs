//! Shopify Admin REST API access for the order sync.
//!
//! # Security
//!
//! Shop access tokens grant full Admin API access to a store. They are held
//! as [`SecretString`] and only exposed when building the request header.
//!
//! # Architecture
//!
//! - [`ShopApi`] is the seam the sync engine talks to; tests substitute an
//!   in-memory implementation
//! - [`ShopifyRestClient`] implements it over `GET /admin/api/{version}/orders.json`
//!   with cursor pagination through the `Link` header
//! - [`types`] holds the wire types, [`conversions`] turns them into
//!   [`storelink_core::Order`]
//!
//! # Example
//!
//! ```rust,ignore
//! use storelink_sync::shopify::{OrderListOptions, ShopApi, ShopifyRestClient};
//!
//! let client = ShopifyRestClient::new(&config.shopify)?;
//! let page = client
//!     .list_orders_page(&shop, &token, &OrderListOptions::first_page(250, watermark))
//!     .await?;
//! ```

mod client;
pub mod conversions;
pub mod types;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use storelink_core::ShopName;
use thiserror::Error;

pub use client::ShopifyRestClient;
pub use conversions::ConversionError;
pub use types::{RemoteCustomer, RemoteOrder, RemoteOrderPage};

/// Errors that can occur when talking to a shop.
#[derive(Debug, Error)]
pub enum ShopApiError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Rate limited by Shopify.
    #[error("rate limited by shop{}", retry_after_suffix(.0))]
    RateLimited(Option<u64>),

    /// The access token was rejected.
    #[error("unauthorized: invalid or revoked access token")]
    Unauthorized,

    /// Any other non-success HTTP status.
    #[error("unexpected status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, truncated.
        body: String,
    },

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// The request URL could not be built from the shop name.
    #[error("invalid request URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// A returned order could not be normalized.
    #[error("invalid order: {0}")]
    Conversion(#[from] ConversionError),
}

impl ShopApiError {
    /// Whether this error is the remote asking the caller to slow down.
    #[must_use]
    pub const fn is_throttled(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }
}

#[allow(clippy::ref_option)]
fn retry_after_suffix(retry_after: &Option<u64>) -> String {
    retry_after.map_or_else(String::new, |secs| format!(", retry after {secs} seconds"))
}

/// Parameters of one order listing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderListOptions {
    /// Page size.
    pub limit: usize,
    /// `page_info` cursor of the page to fetch; `None` for the first page.
    pub cursor: Option<String>,
    /// Only return orders updated at or after this instant.
    pub updated_at_min: Option<DateTime<Utc>>,
    /// Order status filter.
    pub status: String,
    /// Sort order; cursor pages keep the order of the first page.
    pub order: String,
}

/// Oldest change first, so the stored watermark never passes an order that
/// a run has not committed yet.
pub const ASCENDING_UPDATED_AT: &str = "updated_at asc";

impl OrderListOptions {
    /// Options for the first page of a sync run.
    ///
    /// The `updated_at_min` filter is only set when the watermark is after
    /// the Unix epoch, so a shop with no stored orders gets a full pull.
    #[must_use]
    pub fn first_page(limit: usize, watermark: DateTime<Utc>) -> Self {
        Self {
            limit,
            cursor: None,
            updated_at_min: (watermark > DateTime::UNIX_EPOCH).then_some(watermark),
            status: "any".to_string(),
            order: ASCENDING_UPDATED_AT.to_string(),
        }
    }

    /// Options for the page after `cursor`, keeping the original filters.
    #[must_use]
    pub fn next_page(&self, cursor: String) -> Self {
        Self {
            cursor: Some(cursor),
            ..self.clone()
        }
    }
}

/// Remote order source.
#[async_trait]
pub trait ShopApi: Send + Sync {
    /// Fetch one page of orders.
    async fn list_orders_page(
        &self,
        shop: &ShopName,
        access_token: &SecretString,
        options: &OrderListOptions,
    ) -> Result<RemoteOrderPage, ShopApiError>;
}
