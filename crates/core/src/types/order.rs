//! Normalized order record.
//!
//! Orders are stored exactly as they are pulled from the remote shop, minus
//! line items and addresses. Monetary amounts are [`Decimal`] so totals never
//! pick up binary floating point drift.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Snapshot of the customer attached to an order.
///
/// Orders placed without a customer carry the zero value (`id == None`,
/// empty strings).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    /// Remote customer ID.
    pub id: Option<i64>,
    /// Customer email.
    pub email: String,
    /// Customer first name.
    pub first_name: String,
    /// Customer last name.
    pub last_name: String,
    /// Customer phone.
    pub phone: String,
}

impl Customer {
    /// Whether this snapshot refers to a real customer.
    #[must_use]
    pub const fn is_present(&self) -> bool {
        self.id.is_some()
    }
}

/// A normalized order.
///
/// Identity is `(shop, id)`: `id` is assigned by the remote shop and is only
/// unique within that shop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Remote order ID.
    pub id: i64,
    /// Display name (e.g., "#1001").
    pub name: String,
    /// Order email.
    pub email: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp. Drives the sync watermark.
    pub updated_at: DateTime<Utc>,
    /// When the order was cancelled.
    pub cancelled_at: Option<DateTime<Utc>>,
    /// When the order was closed.
    pub closed_at: Option<DateTime<Utc>>,
    /// When the order was processed.
    pub processed_at: Option<DateTime<Utc>>,
    /// ISO 4217 currency code.
    pub currency: String,
    /// Order total.
    pub total_price: Decimal,
    /// Subtotal before shipping and tax.
    pub subtotal_price: Decimal,
    /// Sum of applied discounts.
    pub total_discounts: Decimal,
    /// Total tax.
    pub total_tax: Decimal,
    /// Whether taxes are included in the prices.
    pub taxes_included: bool,
    /// Financial status (e.g., "paid").
    pub financial_status: String,
    /// Fulfillment status (e.g., "fulfilled"); empty when unfulfilled.
    pub fulfillment_status: String,
    /// Sequential order number.
    pub order_number: i64,
    /// Whether this is a test order.
    pub test: bool,
    /// Whether inventory has been reserved.
    pub confirmed: bool,
    /// Comma-separated tags.
    pub tags: String,
    /// Cancellation reason.
    pub cancel_reason: String,
    /// Payment gateway.
    pub gateway: String,
    /// Browser IP of the buyer.
    pub browser_ip: String,
    /// Contact email.
    pub contact_email: String,
    /// Phone number.
    pub phone: String,
    /// Customer snapshot.
    pub customer: Customer,
}

impl Order {
    /// Whether the order has been cancelled.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        self.cancelled_at.is_some()
    }
}
