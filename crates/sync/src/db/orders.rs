//! Order repository.
//!
//! Orders are upserted in batches: one transaction per batch, one savepoint
//! per order. An existing `(shop_name, id)` row is only touched when the
//! incoming `updated_at` is newer, so replaying a page never regresses a row
//! and never counts as a write.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{Connection, PgConnection, PgPool};
use storelink_core::{AccountId, Customer, Order, ShopName};
use tracing::{instrument, warn};

use super::RepositoryError;

// =============================================================================
// Types
// =============================================================================

/// Result of one committed batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Whether the batch transaction committed.
    pub committed: bool,
    /// Orders inserted or advanced to a newer `updated_at`.
    pub written: u64,
    /// Orders already stored at the same or a newer `updated_at`.
    pub unchanged: u64,
    /// Orders rejected by a uniqueness constraint other than `(shop_name, id)`.
    pub duplicates_skipped: u64,
}

impl BatchOutcome {
    /// Number of orders the batch accounted for.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.written + self.unchanged + self.duplicates_skipped
    }
}

/// An order together with its owning shop and account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredOrder {
    /// Shop the order belongs to.
    pub shop: ShopName,
    /// Account the shop belongs to.
    pub account_id: AccountId,
    /// The order itself.
    pub order: Order,
    /// When the row was last written by a sync run.
    pub synced_at: DateTime<Utc>,
}

/// Internal row type for `PostgreSQL` queries.
#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    shop_name: ShopName,
    account_id: AccountId,
    id: i64,
    name: String,
    email: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    cancelled_at: Option<DateTime<Utc>>,
    closed_at: Option<DateTime<Utc>>,
    processed_at: Option<DateTime<Utc>>,
    currency: String,
    total_price: Decimal,
    subtotal_price: Decimal,
    total_discounts: Decimal,
    total_tax: Decimal,
    taxes_included: bool,
    financial_status: String,
    fulfillment_status: String,
    order_number: i64,
    test: bool,
    confirmed: bool,
    tags: String,
    cancel_reason: String,
    gateway: String,
    browser_ip: String,
    contact_email: String,
    phone: String,
    customer_id: Option<i64>,
    customer_email: Option<String>,
    customer_first_name: Option<String>,
    customer_last_name: Option<String>,
    customer_phone: Option<String>,
    synced_at: DateTime<Utc>,
}

impl From<OrderRow> for StoredOrder {
    fn from(row: OrderRow) -> Self {
        let customer = Customer {
            id: row.customer_id,
            email: row.customer_email.unwrap_or_default(),
            first_name: row.customer_first_name.unwrap_or_default(),
            last_name: row.customer_last_name.unwrap_or_default(),
            phone: row.customer_phone.unwrap_or_default(),
        };

        Self {
            shop: row.shop_name,
            account_id: row.account_id,
            order: Order {
                id: row.id,
                name: row.name,
                email: row.email,
                created_at: row.created_at,
                updated_at: row.updated_at,
                cancelled_at: row.cancelled_at,
                closed_at: row.closed_at,
                processed_at: row.processed_at,
                currency: row.currency,
                total_price: row.total_price,
                subtotal_price: row.subtotal_price,
                total_discounts: row.total_discounts,
                total_tax: row.total_tax,
                taxes_included: row.taxes_included,
                financial_status: row.financial_status,
                fulfillment_status: row.fulfillment_status,
                order_number: row.order_number,
                test: row.test,
                confirmed: row.confirmed,
                tags: row.tags,
                cancel_reason: row.cancel_reason,
                gateway: row.gateway,
                browser_ip: row.browser_ip,
                contact_email: row.contact_email,
                phone: row.phone,
                customer,
            },
            synced_at: row.synced_at,
        }
    }
}

const ORDER_COLUMNS: &str = r"
    shop_name, account_id, id, name, email, created_at, updated_at,
    cancelled_at, closed_at, processed_at, currency, total_price,
    subtotal_price, total_discounts, total_tax, taxes_included,
    financial_status, fulfillment_status, order_number, test, confirmed,
    tags, cancel_reason, gateway, browser_ip, contact_email, phone,
    customer_id, customer_email, customer_first_name, customer_last_name,
    customer_phone, synced_at
";

// =============================================================================
// Store
// =============================================================================

/// Durable order storage used by the sync engine.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Upsert a batch of orders for one shop in a single transaction.
    ///
    /// Either every order of the batch is visible afterwards or none is.
    async fn upsert_order_batch(
        &self,
        orders: &[Order],
        shop: &ShopName,
        account_id: &AccountId,
    ) -> Result<BatchOutcome, RepositoryError>;

    /// Latest `updated_at` stored for a shop, or the Unix epoch if the shop
    /// has no orders yet.
    async fn latest_order_timestamp(
        &self,
        shop: &ShopName,
        account_id: &AccountId,
    ) -> Result<DateTime<Utc>, RepositoryError>;
}

/// `PostgreSQL` order store.
#[derive(Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    /// Create a new order store.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// List an account's orders across all of its shops, newest first.
    ///
    /// `page` is 1-based; values below 1 are treated as 1, and a `page_size`
    /// below 1 falls back to 50. Returns the page together with the total
    /// number of orders for the account.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    #[instrument(skip(self), fields(account_id = %account_id))]
    pub async fn get_account_orders(
        &self,
        account_id: &AccountId,
        page: i64,
        page_size: i64,
    ) -> Result<(Vec<StoredOrder>, i64), RepositoryError> {
        let page = page.max(1);
        let page_size = if page_size < 1 { 50 } else { page_size };
        let offset = (page - 1) * page_size;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE account_id = $1")
            .bind(account_id)
            .fetch_one(&self.pool)
            .await?;

        let query = format!(
            r"
            SELECT {ORDER_COLUMNS}
            FROM orders
            WHERE account_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "
        );
        let rows = sqlx::query_as::<_, OrderRow>(&query)
            .bind(account_id)
            .bind(page_size)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        Ok((rows.into_iter().map(StoredOrder::from).collect(), total))
    }

    /// Get one order by shop and remote ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self), fields(shop = %shop))]
    pub async fn get_order(
        &self,
        shop: &ShopName,
        order_id: i64,
    ) -> Result<Option<StoredOrder>, RepositoryError> {
        let query = format!(
            r"
            SELECT {ORDER_COLUMNS}
            FROM orders
            WHERE shop_name = $1 AND id = $2
            "
        );
        let row = sqlx::query_as::<_, OrderRow>(&query)
            .bind(shop)
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(StoredOrder::from))
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    #[instrument(skip(self, orders), fields(shop = %shop, batch_len = orders.len()))]
    async fn upsert_order_batch(
        &self,
        orders: &[Order],
        shop: &ShopName,
        account_id: &AccountId,
    ) -> Result<BatchOutcome, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL READ COMMITTED")
            .execute(&mut *tx)
            .await?;

        let mut outcome = BatchOutcome::default();
        for order in orders {
            // Savepoint per order: a rejected row must not abort the batch.
            let mut savepoint = (&mut *tx).begin().await?;
            match upsert_order(&mut savepoint, order, shop, account_id).await {
                Ok(0) => {
                    savepoint.commit().await?;
                    outcome.unchanged += 1;
                }
                Ok(_) => {
                    savepoint.commit().await?;
                    outcome.written += 1;
                }
                Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                    savepoint.rollback().await?;
                    warn!(
                        order_id = order.id,
                        constraint = db_err.constraint().unwrap_or("unknown"),
                        "Skipping order that conflicts with an existing row"
                    );
                    outcome.duplicates_skipped += 1;
                }
                // Dropping `tx` rolls the whole batch back.
                Err(e) => return Err(e.into()),
            }
        }

        tx.commit().await?;
        outcome.committed = true;
        Ok(outcome)
    }

    #[instrument(skip(self), fields(shop = %shop, account_id = %account_id))]
    async fn latest_order_timestamp(
        &self,
        shop: &ShopName,
        account_id: &AccountId,
    ) -> Result<DateTime<Utc>, RepositoryError> {
        let latest: Option<DateTime<Utc>> = sqlx::query_scalar(
            r"
            SELECT MAX(updated_at)
            FROM orders
            WHERE shop_name = $1 AND account_id = $2
            ",
        )
        .bind(shop)
        .bind(account_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(latest.unwrap_or(DateTime::UNIX_EPOCH))
    }
}

/// Insert one order, or advance the stored row if the incoming copy is newer.
///
/// A row held by another account is taken over by `account_id`, so a shop
/// reconnected under a new account moves its orders along on the first
/// full pull. Returns the number of rows affected (0 when the stored row is
/// current).
async fn upsert_order(
    conn: &mut PgConnection,
    order: &Order,
    shop: &ShopName,
    account_id: &AccountId,
) -> Result<u64, sqlx::Error> {
    let customer = order.customer.is_present().then_some(&order.customer);

    let result = sqlx::query(
        r"
        INSERT INTO orders (
            shop_name, account_id, id, name, email, created_at, updated_at,
            cancelled_at, closed_at, processed_at, currency, total_price,
            subtotal_price, total_discounts, total_tax, taxes_included,
            financial_status, fulfillment_status, order_number, test, confirmed,
            tags, cancel_reason, gateway, browser_ip, contact_email, phone,
            customer_id, customer_email, customer_first_name, customer_last_name,
            customer_phone
        ) VALUES (
            $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
            $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28, $29, $30,
            $31, $32
        )
        ON CONFLICT (shop_name, id) DO UPDATE SET
            account_id = EXCLUDED.account_id,
            updated_at = EXCLUDED.updated_at,
            cancelled_at = EXCLUDED.cancelled_at,
            closed_at = EXCLUDED.closed_at,
            processed_at = EXCLUDED.processed_at,
            total_price = EXCLUDED.total_price,
            subtotal_price = EXCLUDED.subtotal_price,
            total_discounts = EXCLUDED.total_discounts,
            total_tax = EXCLUDED.total_tax,
            financial_status = EXCLUDED.financial_status,
            fulfillment_status = EXCLUDED.fulfillment_status,
            tags = EXCLUDED.tags,
            gateway = EXCLUDED.gateway,
            synced_at = NOW()
        WHERE orders.updated_at < EXCLUDED.updated_at
           OR orders.account_id <> EXCLUDED.account_id
        ",
    )
    .bind(shop)
    .bind(account_id)
    .bind(order.id)
    .bind(&order.name)
    .bind(&order.email)
    .bind(order.created_at)
    .bind(order.updated_at)
    .bind(order.cancelled_at)
    .bind(order.closed_at)
    .bind(order.processed_at)
    .bind(&order.currency)
    .bind(order.total_price)
    .bind(order.subtotal_price)
    .bind(order.total_discounts)
    .bind(order.total_tax)
    .bind(order.taxes_included)
    .bind(&order.financial_status)
    .bind(&order.fulfillment_status)
    .bind(order.order_number)
    .bind(order.test)
    .bind(order.confirmed)
    .bind(&order.tags)
    .bind(&order.cancel_reason)
    .bind(&order.gateway)
    .bind(&order.browser_ip)
    .bind(&order.contact_email)
    .bind(&order.phone)
    .bind(customer.and_then(|c| c.id))
    .bind(customer.map(|c| c.email.as_str()))
    .bind(customer.map(|c| c.first_name.as_str()))
    .bind(customer.map(|c| c.last_name.as_str()))
    .bind(customer.map(|c| c.phone.as_str()))
    .execute(conn)
    .await?;

    Ok(result.rows_affected())
}
