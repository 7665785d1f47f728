//! Integration tests for Storelink order synchronization.
//!
//! # Running Tests
//!
//! ```bash
//! # Engine scenarios (in-memory collaborators, no services needed)
//! cargo test -p storelink-integration-tests
//!
//! # PostgreSQL store tests
//! DATABASE_URL=postgres://... cargo test -p storelink-integration-tests -- --ignored
//! ```
//!
//! # Test Categories
//!
//! - `sync_scenarios` - End-to-end account syncs
//! - `sync_failures` - Throttling, failing shops and batches, panics
//! - `sync_deadlines` - Shop and caller deadlines
//! - `postgres_store` - `PgOrderStore` / `PgCredentialStore` against a database
//!
//! The in-memory collaborators below stand in for `PostgreSQL` and the
//! Shopify API.

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use secrecy::SecretString;
use storelink_core::{AccountId, Order, ShopName};
use storelink_sync::db::{
    BatchOutcome, CredentialStore, OrderStore, RepositoryError, ShopCredential,
};
use storelink_sync::shopify::{
    ASCENDING_UPDATED_AT, OrderListOptions, RemoteOrder, RemoteOrderPage, ShopApi, ShopApiError,
};
use storelink_sync::{SyncCoordinator, SyncSettings};

// =============================================================================
// Fixtures
// =============================================================================

/// The account used by most scenarios.
#[must_use]
pub fn account() -> AccountId {
    AccountId::parse("acct-1").unwrap()
}

/// Base instant for generated orders.
#[must_use]
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

/// A remote order updated `id` minutes after [`base_time`].
#[must_use]
pub fn remote_order(id: i64) -> RemoteOrder {
    RemoteOrder {
        id,
        name: Some(format!("#{}", 1000 + id)),
        email: Some(format!("buyer{id}@example.com")),
        created_at: Some(base_time()),
        updated_at: Some(base_time() + chrono::Duration::minutes(id)),
        currency: Some("USD".to_string()),
        total_price: Some("25.50".to_string()),
        subtotal_price: Some("24.00".to_string()),
        total_tax: Some("1.50".to_string()),
        financial_status: Some("paid".to_string()),
        order_number: Some(1000 + id),
        ..RemoteOrder::default()
    }
}

/// Remote orders with IDs `1..=count`.
#[must_use]
pub fn remote_orders(count: i64) -> Vec<RemoteOrder> {
    (1..=count).map(remote_order).collect()
}

/// A coordinator over the given in-memory collaborators.
#[must_use]
pub fn coordinator(
    credentials: &Arc<InMemoryCredentialStore>,
    api: &Arc<FakeShopApi>,
    store: &Arc<InMemoryOrderStore>,
    settings: SyncSettings,
) -> SyncCoordinator {
    SyncCoordinator::new(
        Arc::clone(credentials) as Arc<dyn CredentialStore>,
        Arc::clone(api) as Arc<dyn ShopApi>,
        Arc::clone(store) as Arc<dyn OrderStore>,
        settings,
    )
}

// =============================================================================
// Credential store
// =============================================================================

/// Credentials held in memory.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    credentials: Mutex<Vec<ShopCredential>>,
    fail: bool,
}

impl InMemoryCredentialStore {
    /// Store holding one credential per shop name, all for [`account`].
    #[must_use]
    pub fn with_shops(shops: &[&str]) -> Self {
        let credentials = shops
            .iter()
            .map(|shop| ShopCredential::new(*shop, account(), format!("shpat_{shop}")))
            .collect();
        Self {
            credentials: Mutex::new(credentials),
            fail: false,
        }
    }

    /// Store whose listing always fails.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            credentials: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    /// Add a raw credential, possibly malformed.
    pub fn push(&self, credential: ShopCredential) {
        self.credentials.lock().unwrap().push(credential);
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn list_shop_credentials(
        &self,
        account_id: &AccountId,
    ) -> Result<Vec<ShopCredential>, RepositoryError> {
        if self.fail {
            return Err(RepositoryError::DataCorruption(
                "credential table unavailable".to_string(),
            ));
        }
        Ok(self
            .credentials
            .lock()
            .unwrap()
            .iter()
            .filter(|c| &c.account_id == account_id)
            .cloned()
            .collect())
    }

    async fn save_shop_credential(
        &self,
        shop: &ShopName,
        account_id: &AccountId,
        access_token: &SecretString,
    ) -> Result<(), RepositoryError> {
        let mut credentials = self.credentials.lock().unwrap();
        credentials.retain(|c| !(c.shop == shop.as_str() && &c.account_id == account_id));
        credentials.push(ShopCredential {
            shop: shop.to_string(),
            account_id: account_id.clone(),
            access_token: access_token.clone(),
        });
        Ok(())
    }
}

// =============================================================================
// Order store
// =============================================================================

#[derive(Default)]
struct StoreState {
    rows: HashMap<(String, i64), (AccountId, Order)>,
    batches: HashMap<String, Vec<usize>>,
    fail_on_batch: HashMap<String, usize>,
}

/// Orders held in memory with the same upsert rules as `PgOrderStore`.
#[derive(Default)]
pub struct InMemoryOrderStore {
    state: Mutex<StoreState>,
}

impl InMemoryOrderStore {
    /// Fail the next write for `shop` once `nth - 1` batches are committed.
    ///
    /// The failure fires once.
    pub fn fail_batch(&self, shop: &str, nth: usize) {
        self.state
            .lock()
            .unwrap()
            .fail_on_batch
            .insert(shop.to_string(), nth);
    }

    /// Sizes of the committed batches for `shop`, in commit order.
    #[must_use]
    pub fn batch_sizes(&self, shop: &str) -> Vec<usize> {
        self.state
            .lock()
            .unwrap()
            .batches
            .get(shop)
            .cloned()
            .unwrap_or_default()
    }

    /// Stored orders for `shop`, sorted by ID.
    #[must_use]
    pub fn orders(&self, shop: &str) -> Vec<Order> {
        let state = self.state.lock().unwrap();
        let mut orders: Vec<Order> = state
            .rows
            .iter()
            .filter(|((s, _), _)| s == shop)
            .map(|(_, (_, order))| order.clone())
            .collect();
        orders.sort_by_key(|o| o.id);
        orders
    }

    /// Account holding the stored order, if any.
    #[must_use]
    pub fn owner(&self, shop: &str, id: i64) -> Option<AccountId> {
        self.state
            .lock()
            .unwrap()
            .rows
            .get(&(shop.to_string(), id))
            .map(|(owner, _)| owner.clone())
    }

    /// Latest stored `updated_at` for `shop`, if any.
    #[must_use]
    pub fn watermark(&self, shop: &str) -> Option<DateTime<Utc>> {
        self.orders(shop).iter().map(|o| o.updated_at).max()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn upsert_order_batch(
        &self,
        orders: &[Order],
        shop: &ShopName,
        account_id: &AccountId,
    ) -> Result<BatchOutcome, RepositoryError> {
        let mut state = self.state.lock().unwrap();
        let attempt = state.batches.get(shop.as_str()).map_or(0, Vec::len) + 1;
        if state.fail_on_batch.get(shop.as_str()) == Some(&attempt) {
            state.fail_on_batch.remove(shop.as_str());
            return Err(RepositoryError::Conflict(format!(
                "simulated failure on batch {attempt}"
            )));
        }

        let mut outcome = BatchOutcome {
            committed: true,
            ..BatchOutcome::default()
        };
        for order in orders {
            let key = (shop.to_string(), order.id);
            let is_current = state
                .rows
                .get(&key)
                .is_some_and(|(owner, existing)| {
                    owner == account_id && existing.updated_at >= order.updated_at
                });
            if is_current {
                outcome.unchanged += 1;
            } else {
                state.rows.insert(key, (account_id.clone(), order.clone()));
                outcome.written += 1;
            }
        }
        state
            .batches
            .entry(shop.to_string())
            .or_default()
            .push(orders.len());
        Ok(outcome)
    }

    async fn latest_order_timestamp(
        &self,
        shop: &ShopName,
        account_id: &AccountId,
    ) -> Result<DateTime<Utc>, RepositoryError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .rows
            .iter()
            .filter(|((s, _), (a, _))| s == shop.as_str() && a == account_id)
            .map(|(_, (_, order))| order.updated_at)
            .max()
            .unwrap_or(DateTime::UNIX_EPOCH))
    }
}

// =============================================================================
// Shop API
// =============================================================================

/// Behavior of one fake shop.
#[derive(Debug, Clone, Default)]
pub struct FakeShop {
    /// Orders the shop holds, in listing order.
    pub orders: Vec<RemoteOrder>,
    /// Respond with `429` to this many requests before serving pages.
    pub throttle_first: u32,
    /// Respond with this status to every request.
    pub fail_status: Option<u16>,
    /// Panic on the first request.
    pub panic: bool,
    /// Time each request takes.
    pub latency: Option<Duration>,
}

impl FakeShop {
    /// A well-behaved shop holding `orders`.
    #[must_use]
    pub fn with_orders(orders: Vec<RemoteOrder>) -> Self {
        Self {
            orders,
            ..Self::default()
        }
    }
}

/// Serves orders from in-memory shops with cursor pagination.
///
/// Orders are listed newest first unless the first request asks for
/// `updated_at asc`. The cursor encodes the offset, the `updated_at_min`
/// filter and the direction, mirroring Shopify where follow-up requests
/// carry only `page_info`.
#[derive(Default)]
pub struct FakeShopApi {
    shops: Mutex<HashMap<String, FakeShop>>,
    requests: Mutex<HashMap<String, VecDeque<OrderListOptions>>>,
}

impl FakeShopApi {
    /// Register or replace a shop.
    pub fn add_shop(&self, shop: &str, fake: FakeShop) {
        self.shops.lock().unwrap().insert(shop.to_string(), fake);
    }

    /// Apply a change to a registered shop.
    pub fn update_shop(&self, shop: &str, change: impl FnOnce(&mut FakeShop)) {
        if let Some(fake) = self.shops.lock().unwrap().get_mut(shop) {
            change(fake);
        }
    }

    /// Requests received for `shop`, oldest first.
    #[must_use]
    pub fn requests(&self, shop: &str) -> Vec<OrderListOptions> {
        self.requests
            .lock()
            .unwrap()
            .get(shop)
            .map(|r| r.iter().cloned().collect())
            .unwrap_or_default()
    }
}

/// Listing position carried by the fake cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Cursor {
    offset: usize,
    updated_at_min: Option<DateTime<Utc>>,
    ascending: bool,
}

fn encode_cursor(cursor: Cursor) -> String {
    let min = cursor
        .updated_at_min
        .map_or_else(String::new, |t| t.timestamp_millis().to_string());
    let direction = if cursor.ascending { "asc" } else { "desc" };
    format!("{}:{min}:{direction}", cursor.offset)
}

fn decode_cursor(cursor: &str) -> Cursor {
    let mut parts = cursor.split(':');
    let offset = parts.next().unwrap().parse().unwrap();
    let min = parts.next().unwrap();
    let updated_at_min = (!min.is_empty())
        .then(|| DateTime::from_timestamp_millis(min.parse().unwrap()).unwrap());
    Cursor {
        offset,
        updated_at_min,
        ascending: parts.next() == Some("asc"),
    }
}

#[async_trait]
impl ShopApi for FakeShopApi {
    async fn list_orders_page(
        &self,
        shop: &ShopName,
        _access_token: &SecretString,
        options: &OrderListOptions,
    ) -> Result<RemoteOrderPage, ShopApiError> {
        self.requests
            .lock()
            .unwrap()
            .entry(shop.to_string())
            .or_default()
            .push_back(options.clone());

        // The lock is released before panicking so other shops keep working.
        let (panic, latency) = {
            let mut shops = self.shops.lock().unwrap();
            let fake = shops
                .get_mut(shop.as_str())
                .ok_or(ShopApiError::Unauthorized)?;
            if fake.panic {
                (true, None)
            } else if fake.throttle_first > 0 {
                fake.throttle_first -= 1;
                return Err(ShopApiError::RateLimited(Some(1)));
            } else if let Some(status) = fake.fail_status {
                return Err(ShopApiError::Status {
                    status,
                    body: "simulated outage".to_string(),
                });
            } else {
                (false, fake.latency)
            }
        };
        assert!(!panic, "simulated fault in {shop}");
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let cursor = options.cursor.as_deref().map_or_else(
            || Cursor {
                offset: 0,
                updated_at_min: options.updated_at_min,
                ascending: options.order == ASCENDING_UPDATED_AT,
            },
            decode_cursor,
        );

        let shops = self.shops.lock().unwrap();
        let fake = shops.get(shop.as_str()).ok_or(ShopApiError::Unauthorized)?;
        let mut matching: Vec<&RemoteOrder> = fake
            .orders
            .iter()
            .filter(|o| {
                cursor
                    .updated_at_min
                    .is_none_or(|min| o.updated_at.is_some_and(|u| u >= min))
            })
            .collect();
        // Without an explicit order Shopify lists newest first.
        matching.sort_by_key(|o| (o.updated_at, o.id));
        if !cursor.ascending {
            matching.reverse();
        }

        let end = (cursor.offset + options.limit).min(matching.len());
        let orders = matching
            .get(cursor.offset..end)
            .unwrap_or_default()
            .iter()
            .map(|o| (*o).clone())
            .collect();
        let next_cursor = (end < matching.len()).then(|| {
            encode_cursor(Cursor {
                offset: end,
                ..cursor
            })
        });

        Ok(RemoteOrderPage {
            orders,
            next_cursor,
        })
    }
}
