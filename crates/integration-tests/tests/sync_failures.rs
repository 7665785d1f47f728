//! Failure handling: throttling, broken shops, failed batches and panics.
//!
//! A failure in one shop must never affect the others.

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;
use storelink_core::{ShopName, SyncOutcome, SyncReport};
use storelink_integration_tests::{
    FakeShop, FakeShopApi, InMemoryCredentialStore, InMemoryOrderStore, account, base_time,
    coordinator, remote_orders,
};
use storelink_sync::db::{CredentialStore, OrderStore};
use storelink_sync::shopify::{OrderListOptions, RemoteOrderPage, ShopApi, ShopApiError};
use storelink_sync::{SyncCoordinator, SyncError, SyncSettings};

async fn sync(
    credentials: &Arc<InMemoryCredentialStore>,
    api: &Arc<FakeShopApi>,
    store: &Arc<InMemoryOrderStore>,
) -> SyncReport {
    coordinator(credentials, api, store, SyncSettings::default())
        .sync_account(&account(), None)
        .await
        .unwrap()
}

fn two_shops(shop_a: FakeShop, shop_b: FakeShop) -> Arc<FakeShopApi> {
    let api = FakeShopApi::default();
    api.add_shop("shop-a", shop_a);
    api.add_shop("shop-b", shop_b);
    Arc::new(api)
}

fn error_of<'a>(report: &'a SyncReport, shop: &str) -> &'a str {
    report
        .get(shop)
        .unwrap()
        .error_message
        .as_deref()
        .unwrap()
}

// ============================================================================
// Throttling
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_throttled_shop_recovers() {
    let credentials = Arc::new(InMemoryCredentialStore::with_shops(&["shop-a"]));
    let api = Arc::new(FakeShopApi::default());
    api.add_shop(
        "shop-a",
        FakeShop {
            throttle_first: 3,
            ..FakeShop::with_orders(remote_orders(300))
        },
    );
    let store = Arc::new(InMemoryOrderStore::default());

    let report = sync(&credentials, &api, &store).await;

    let result = report.get("shop-a").unwrap();
    assert_eq!(result.outcome, SyncOutcome::Succeeded);
    assert_eq!(result.orders_synced, 300);
    // Two pages plus three throttled attempts.
    assert_eq!(api.requests("shop-a").len(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_throttling_beyond_retry_budget_fails_only_that_shop() {
    let credentials = Arc::new(InMemoryCredentialStore::with_shops(&["shop-a", "shop-b"]));
    let api = two_shops(
        FakeShop {
            throttle_first: 10,
            ..FakeShop::with_orders(remote_orders(10))
        },
        FakeShop::with_orders(remote_orders(10)),
    );
    let store = Arc::new(InMemoryOrderStore::default());

    let report = sync(&credentials, &api, &store).await;

    assert_eq!(report.get("shop-a").unwrap().outcome, SyncOutcome::Failed);
    assert_eq!(report.get("shop-a").unwrap().orders_synced, 0);
    assert!(error_of(&report, "shop-a").contains("after 5 retries"));
    // The first attempt plus five retries.
    assert_eq!(api.requests("shop-a").len(), 6);

    assert!(report.get("shop-b").unwrap().is_success());
    assert_eq!(report.get("shop-b").unwrap().orders_synced, 10);
    assert_eq!(report.unsuccessful_shops(), vec!["shop-a"]);
}

// ============================================================================
// Broken shops
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_server_error_is_isolated() {
    let credentials = Arc::new(InMemoryCredentialStore::with_shops(&["shop-a", "shop-b"]));
    let api = two_shops(
        FakeShop {
            fail_status: Some(500),
            ..FakeShop::with_orders(remote_orders(10))
        },
        FakeShop::with_orders(remote_orders(260)),
    );
    let store = Arc::new(InMemoryOrderStore::default());

    let report = sync(&credentials, &api, &store).await;

    assert_eq!(report.get("shop-a").unwrap().outcome, SyncOutcome::Failed);
    assert!(error_of(&report, "shop-a").contains("500"));
    // Non-throttle errors are not retried.
    assert_eq!(api.requests("shop-a").len(), 1);
    assert!(store.orders("shop-a").is_empty());

    assert_eq!(report.get("shop-b").unwrap().orders_synced, 260);
    assert_eq!(store.batch_sizes("shop-b"), vec![250, 10]);
}

#[tokio::test(start_paused = true)]
async fn test_panicking_shop_is_contained() {
    let credentials = Arc::new(InMemoryCredentialStore::with_shops(&["shop-a", "shop-b"]));
    let api = two_shops(
        FakeShop {
            panic: true,
            ..FakeShop::default()
        },
        FakeShop::with_orders(remote_orders(30)),
    );
    let store = Arc::new(InMemoryOrderStore::default());

    let report = sync(&credentials, &api, &store).await;

    assert_eq!(report.len(), 2);
    let failed = report.get("shop-a").unwrap();
    assert_eq!(failed.outcome, SyncOutcome::Failed);
    assert_eq!(failed.orders_synced, 0);
    assert!(
        error_of(&report, "shop-a").starts_with("internal fault: simulated fault in shop-a"),
        "unexpected message: {}",
        error_of(&report, "shop-a")
    );

    assert!(report.get("shop-b").unwrap().is_success());
    assert_eq!(store.orders("shop-b").len(), 30);
}

// ============================================================================
// Batch failures
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_failed_batch_keeps_earlier_commits() {
    let credentials = Arc::new(InMemoryCredentialStore::with_shops(&["shop-a", "shop-b"]));
    let api = two_shops(
        FakeShop::with_orders(remote_orders(600)),
        FakeShop::with_orders(remote_orders(5)),
    );
    let store = Arc::new(InMemoryOrderStore::default());
    store.fail_batch("shop-a", 2);

    let report = sync(&credentials, &api, &store).await;

    let result = report.get("shop-a").unwrap();
    assert_eq!(result.outcome, SyncOutcome::Failed);
    assert_eq!(result.orders_synced, 250);
    assert!(error_of(&report, "shop-a").starts_with("batch write failed"));
    assert_eq!(store.batch_sizes("shop-a"), vec![250]);
    assert_eq!(store.orders("shop-a").len(), 250);

    assert_eq!(report.get("shop-b").unwrap().orders_synced, 5);
}

#[tokio::test(start_paused = true)]
async fn test_failed_shop_resumes_from_watermark() {
    let credentials = Arc::new(InMemoryCredentialStore::with_shops(&["shop-a"]));
    let api = Arc::new(FakeShopApi::default());
    api.add_shop("shop-a", FakeShop::with_orders(remote_orders(600)));
    let store = Arc::new(InMemoryOrderStore::default());
    store.fail_batch("shop-a", 2);

    let first = sync(&credentials, &api, &store).await;
    assert_eq!(first.get("shop-a").unwrap().orders_synced, 250);

    // Order 250 sits on the watermark and is re-read unchanged.
    let second = sync(&credentials, &api, &store).await;
    let result = second.get("shop-a").unwrap();
    assert!(result.is_success());
    assert_eq!(result.orders_synced, 350);
    assert_eq!(store.orders("shop-a").len(), 600);
}

#[tokio::test(start_paused = true)]
async fn test_resume_keeps_orders_listed_out_of_update_order() {
    let credentials = Arc::new(InMemoryCredentialStore::with_shops(&["shop-a"]));
    let api = Arc::new(FakeShopApi::default());
    let mut orders = remote_orders(260);
    orders.reverse();
    api.add_shop("shop-a", FakeShop::with_orders(orders));
    let store = Arc::new(InMemoryOrderStore::default());
    store.fail_batch("shop-a", 2);

    let first = sync(&credentials, &api, &store).await;
    assert_eq!(first.get("shop-a").unwrap().outcome, SyncOutcome::Failed);
    assert_eq!(first.get("shop-a").unwrap().orders_synced, 250);
    // Only the oldest changes were committed.
    assert_eq!(
        store.watermark("shop-a"),
        Some(base_time() + chrono::Duration::minutes(250))
    );

    let second = sync(&credentials, &api, &store).await;
    let result = second.get("shop-a").unwrap();
    assert!(result.is_success());
    assert_eq!(result.orders_synced, 10);
    assert_eq!(store.orders("shop-a").len(), 260);
}

/// Forwards to the fake API without the requested sort order.
struct UnsortedListing(Arc<FakeShopApi>);

#[async_trait]
impl ShopApi for UnsortedListing {
    async fn list_orders_page(
        &self,
        shop: &ShopName,
        access_token: &SecretString,
        options: &OrderListOptions,
    ) -> Result<RemoteOrderPage, ShopApiError> {
        let options = OrderListOptions {
            order: String::new(),
            ..options.clone()
        };
        self.0.list_orders_page(shop, access_token, &options).await
    }
}

#[tokio::test(start_paused = true)]
async fn test_newest_first_listing_never_advances_watermark() {
    let credentials = Arc::new(InMemoryCredentialStore::with_shops(&["shop-a", "shop-b"]));
    let api = two_shops(
        FakeShop::with_orders(remote_orders(260)),
        FakeShop::default(),
    );
    let store = Arc::new(InMemoryOrderStore::default());
    let coordinator = SyncCoordinator::new(
        Arc::clone(&credentials) as Arc<dyn CredentialStore>,
        Arc::new(UnsortedListing(Arc::clone(&api))),
        Arc::clone(&store) as Arc<dyn OrderStore>,
        SyncSettings::default(),
    );

    let report = coordinator.sync_account(&account(), None).await.unwrap();

    let result = report.get("shop-a").unwrap();
    assert_eq!(result.outcome, SyncOutcome::Failed);
    assert_eq!(result.orders_synced, 0);
    assert!(error_of(&report, "shop-a").contains("not sorted by updated_at"));
    assert!(store.batch_sizes("shop-a").is_empty());
    assert_eq!(store.watermark("shop-a"), None);
    assert!(report.get("shop-b").unwrap().is_success());
}

// ============================================================================
// Credentials
// ============================================================================

#[tokio::test]
async fn test_credential_listing_failure_aborts_account_sync() {
    let credentials = Arc::new(InMemoryCredentialStore::failing());
    let api = Arc::new(FakeShopApi::default());
    let store = Arc::new(InMemoryOrderStore::default());

    let err = coordinator(&credentials, &api, &store, SyncSettings::default())
        .sync_account(&account(), None)
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Credentials(_)));
}
