//! Synced order inspection commands.
//!
//! # Usage
//!
//! ```bash
//! storelink orders list --account acct-1 --page 2 --page-size 25
//! storelink orders get --shop acme --id 450789469
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use storelink_core::{AccountId, NameError, Order, ShopName};
use storelink_sync::SyncConfig;
use storelink_sync::db::{PgOrderStore, RepositoryError, StoredOrder};
use thiserror::Error;

/// Errors that can occur while reading orders.
#[derive(Debug, Error)]
pub enum OrdersError {
    /// Invalid account identifier or shop name.
    #[error("Invalid identifier: {0}")]
    InvalidName(#[from] NameError),

    /// Database connection error.
    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),

    /// Query failed.
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// Output could not be serialized.
    #[error("Failed to serialize output: {0}")]
    Serialize(#[from] serde_json::Error),

    /// No such order.
    #[error("Order {id} not found in shop {shop}")]
    NotFound {
        /// Shop name.
        shop: String,
        /// Remote order ID.
        id: i64,
    },
}

#[derive(Debug, Serialize)]
struct OrderView<'a> {
    shop: &'a ShopName,
    account_id: &'a AccountId,
    synced_at: DateTime<Utc>,
    #[serde(flatten)]
    order: &'a Order,
}

impl<'a> From<&'a StoredOrder> for OrderView<'a> {
    fn from(stored: &'a StoredOrder) -> Self {
        Self {
            shop: &stored.shop,
            account_id: &stored.account_id,
            synced_at: stored.synced_at,
            order: &stored.order,
        }
    }
}

#[derive(Debug, Serialize)]
struct OrderPage<'a> {
    page: i64,
    page_size: i64,
    total: i64,
    orders: Vec<OrderView<'a>>,
}

/// Print one page of an account's orders as JSON.
pub async fn list(
    config: &SyncConfig,
    account: &str,
    page: i64,
    page_size: i64,
) -> Result<(), OrdersError> {
    let account = AccountId::parse(account)?;

    let pool = super::connect(config).await?;
    let (orders, total) = PgOrderStore::new(pool)
        .get_account_orders(&account, page, page_size)
        .await?;

    let output = OrderPage {
        page: page.max(1),
        page_size: if page_size < 1 { 50 } else { page_size },
        total,
        orders: orders.iter().map(OrderView::from).collect(),
    };

    #[allow(clippy::print_stdout)]
    {
        println!("{}", serde_json::to_string_pretty(&output)?);
    }
    Ok(())
}

/// Print one order as JSON.
pub async fn get(config: &SyncConfig, shop: &str, id: i64) -> Result<(), OrdersError> {
    let shop = ShopName::parse(shop)?;

    let pool = super::connect(config).await?;
    let stored = PgOrderStore::new(pool)
        .get_order(&shop, id)
        .await?
        .ok_or_else(|| OrdersError::NotFound {
            shop: shop.to_string(),
            id,
        })?;

    #[allow(clippy::print_stdout)]
    {
        println!("{}", serde_json::to_string_pretty(&OrderView::from(&stored))?);
    }
    Ok(())
}
