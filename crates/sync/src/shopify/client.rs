//! Shopify Admin REST client for order listing.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, LINK, RETRY_AFTER};
use secrecy::{ExposeSecret, SecretString};
use storelink_core::ShopName;
use tracing::{debug, instrument};
use url::Url;

use crate::config::ShopifyConfig;

use super::types::{OrdersResponse, RemoteOrderPage};
use super::{OrderListOptions, ShopApi, ShopApiError};

/// Request timeout for a single page.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Longest response body kept in a [`ShopApiError::Status`].
const MAX_ERROR_BODY: usize = 512;

/// Shopify Admin REST API client.
///
/// Cheap to clone; all clones share one connection pool.
#[derive(Clone)]
pub struct ShopifyRestClient {
    inner: Arc<ShopifyRestClientInner>,
}

struct ShopifyRestClientInner {
    client: reqwest::Client,
    api_version: String,
}

impl ShopifyRestClient {
    /// Create a new REST client.
    ///
    /// # Errors
    ///
    /// Returns `ShopApiError::Http` if the HTTP client cannot be built.
    pub fn new(config: &ShopifyConfig) -> Result<Self, ShopApiError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            inner: Arc::new(ShopifyRestClientInner {
                client,
                api_version: config.api_version.clone(),
            }),
        })
    }

    /// Get the Admin API version requests are sent to.
    #[must_use]
    pub fn api_version(&self) -> &str {
        &self.inner.api_version
    }

    fn orders_url(&self, shop: &ShopName, options: &OrderListOptions) -> Result<Url, ShopApiError> {
        let mut url = Url::parse(&format!(
            "https://{}/admin/api/{}/orders.json",
            shop.api_host(),
            self.inner.api_version
        ))?;
        url.query_pairs_mut().extend_pairs(query_pairs(options));
        Ok(url)
    }
}

#[async_trait]
impl ShopApi for ShopifyRestClient {
    #[instrument(skip(self, access_token, options), fields(shop = %shop, cursor = options.cursor.is_some()))]
    async fn list_orders_page(
        &self,
        shop: &ShopName,
        access_token: &SecretString,
        options: &OrderListOptions,
    ) -> Result<RemoteOrderPage, ShopApiError> {
        let url = self.orders_url(shop, options)?;

        let response = self
            .inner
            .client
            .get(url)
            .header("X-Shopify-Access-Token", access_token.expose_secret())
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = response.status();

        // Check for rate limiting
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ShopApiError::RateLimited(retry_after(response.headers())));
        }

        // Check for unauthorized
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ShopApiError::Unauthorized);
        }

        let next_cursor = next_page_cursor(response.headers());
        let body = response.text().await?;

        if !status.is_success() {
            return Err(ShopApiError::Status {
                status: status.as_u16(),
                body: truncate(body, MAX_ERROR_BODY),
            });
        }

        let parsed: OrdersResponse = serde_json::from_str(&body)?;
        debug!(
            orders = parsed.orders.len(),
            has_next = next_cursor.is_some(),
            "Fetched order page"
        );

        Ok(RemoteOrderPage {
            orders: parsed.orders,
            next_cursor,
        })
    }
}

// =============================================================================
// Request / response helpers
// =============================================================================

/// Query parameters for an order listing.
///
/// Shopify rejects filters alongside `page_info`, so a cursor request only
/// carries `limit` and `page_info`.
fn query_pairs(options: &OrderListOptions) -> Vec<(&'static str, String)> {
    let mut pairs = vec![("limit", options.limit.to_string())];

    if let Some(cursor) = &options.cursor {
        pairs.push(("page_info", cursor.clone()));
        return pairs;
    }

    pairs.push(("status", options.status.clone()));
    pairs.push(("order", options.order.clone()));
    if let Some(updated_at_min) = options.updated_at_min {
        pairs.push(("updated_at_min", updated_at_min.to_rfc3339()));
    }
    pairs
}

/// Seconds from a `Retry-After` header. Shopify sends fractional values
/// such as `2.0`; the whole part is kept.
fn retry_after(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().split('.').next())
        .and_then(|s| s.parse().ok())
}

fn next_page_cursor(headers: &HeaderMap) -> Option<String> {
    headers
        .get(LINK)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_next_link)
}

/// Extract the `page_info` of the `rel="next"` entry of a `Link` header.
///
/// ```text
/// <https://shop.myshopify.com/admin/api/2025-01/orders.json?limit=250&page_info=abc>; rel="next"
/// ```
fn parse_next_link(header: &str) -> Option<String> {
    header.split(',').find_map(|entry| {
        let mut parts = entry.split(';');
        let target = parts.next()?.trim();
        let is_next = parts.any(|p| {
            let p = p.trim();
            p == "rel=\"next\"" || p == "rel=next"
        });
        if !is_next {
            return None;
        }

        let target = target.strip_prefix('<')?.strip_suffix('>')?;
        let url = Url::parse(target).ok()?;
        url.query_pairs()
            .find(|(key, _)| key == "page_info")
            .map(|(_, value)| value.into_owned())
    })
}

fn truncate(mut body: String, max: usize) -> String {
    if body.len() > max {
        let mut end = max;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
    }
    body
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{DateTime, TimeZone, Utc};
    use reqwest::header::HeaderValue;

    use super::*;

    fn client() -> ShopifyRestClient {
        ShopifyRestClient::new(&ShopifyConfig::default()).unwrap()
    }

    #[test]
    fn test_first_page_query() {
        let watermark = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let options = OrderListOptions::first_page(250, watermark);
        let pairs = query_pairs(&options);

        assert_eq!(
            pairs,
            vec![
                ("limit", "250".to_string()),
                ("status", "any".to_string()),
                ("order", "updated_at asc".to_string()),
                ("updated_at_min", "2024-05-01T12:00:00+00:00".to_string()),
            ]
        );
    }

    #[test]
    fn test_full_pull_query_has_no_updated_at_min() {
        let options = OrderListOptions::first_page(250, DateTime::UNIX_EPOCH);
        let pairs = query_pairs(&options);
        assert!(pairs.iter().all(|(key, _)| *key != "updated_at_min"));
    }

    #[test]
    fn test_first_page_requests_oldest_change_first() {
        let options = OrderListOptions::first_page(250, DateTime::UNIX_EPOCH);
        let pairs = query_pairs(&options);
        assert!(pairs.contains(&("order", "updated_at asc".to_string())));
    }

    #[test]
    fn test_cursor_query_only_sends_limit_and_page_info() {
        let watermark = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let options = OrderListOptions::first_page(250, watermark).next_page("xyz".to_string());

        assert_eq!(
            query_pairs(&options),
            vec![
                ("limit", "250".to_string()),
                ("page_info", "xyz".to_string()),
            ]
        );
    }

    #[test]
    fn test_orders_url_uses_api_host_and_version() {
        let shop = ShopName::parse("shop-a").unwrap();
        let options = OrderListOptions::first_page(50, DateTime::UNIX_EPOCH);
        let url = client().orders_url(&shop, &options).unwrap();

        assert_eq!(
            url.as_str(),
            "https://shop-a.myshopify.com/admin/api/2025-01/orders.json?limit=50&status=any&order=updated_at+asc"
        );
    }

    #[test]
    fn test_parse_next_link() {
        let header = "<https://shop-a.myshopify.com/admin/api/2025-01/orders.json?limit=250&page_info=prev123>; rel=\"previous\", \
                      <https://shop-a.myshopify.com/admin/api/2025-01/orders.json?limit=250&page_info=next456>; rel=\"next\"";
        assert_eq!(parse_next_link(header).as_deref(), Some("next456"));
    }

    #[test]
    fn test_parse_next_link_last_page() {
        let header = "<https://shop-a.myshopify.com/admin/api/2025-01/orders.json?limit=250&page_info=prev123>; rel=\"previous\"";
        assert_eq!(parse_next_link(header), None);
    }

    #[test]
    fn test_retry_after_accepts_fractional_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("2.0"));
        assert_eq!(retry_after(&headers), Some(2));
        assert_eq!(retry_after(&HeaderMap::new()), None);
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo".to_string(), 2), "h");
        assert_eq!(truncate("short".to_string(), 512), "short");
    }
}
