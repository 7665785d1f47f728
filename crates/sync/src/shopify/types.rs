//! Wire types for the Shopify Admin REST orders endpoint.
//!
//! Only the fields the sync engine persists are modelled. Shopify sends
//! `null` for many string fields, so nearly everything is optional here and
//! normalized in [`super::conversions`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Body of `GET /admin/api/{version}/orders.json`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrdersResponse {
    /// Orders on this page.
    #[serde(default)]
    pub orders: Vec<RemoteOrder>,
}

/// An order as returned by the REST API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteOrder {
    pub id: i64,
    pub name: Option<String>,
    pub email: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
    pub currency: Option<String>,
    /// Money fields arrive as decimal strings (e.g., "19.99").
    pub total_price: Option<String>,
    pub subtotal_price: Option<String>,
    pub total_discounts: Option<String>,
    pub total_tax: Option<String>,
    pub taxes_included: Option<bool>,
    pub financial_status: Option<String>,
    pub fulfillment_status: Option<String>,
    pub order_number: Option<i64>,
    pub test: Option<bool>,
    pub confirmed: Option<bool>,
    pub tags: Option<String>,
    pub cancel_reason: Option<String>,
    pub gateway: Option<String>,
    pub browser_ip: Option<String>,
    pub contact_email: Option<String>,
    pub phone: Option<String>,
    pub customer: Option<RemoteCustomer>,
}

/// Customer snapshot embedded in a [`RemoteOrder`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteCustomer {
    pub id: i64,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
}

/// One page of remote orders plus the cursor of the next page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteOrderPage {
    /// Orders on this page, in API order.
    pub orders: Vec<RemoteOrder>,
    /// `page_info` cursor of the next page; `None` on the last page.
    pub next_cursor: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_rest_order_with_nulls() {
        let json = r##"{
            "orders": [{
                "id": 450789469,
                "name": "#1001",
                "email": null,
                "created_at": "2024-03-01T10:15:00-05:00",
                "updated_at": "2024-03-02T08:00:00-05:00",
                "cancelled_at": null,
                "currency": "USD",
                "total_price": "598.94",
                "subtotal_price": "597.00",
                "total_discounts": "10.00",
                "total_tax": "11.94",
                "taxes_included": false,
                "financial_status": "paid",
                "fulfillment_status": null,
                "order_number": 1001,
                "test": false,
                "confirmed": true,
                "tags": "imported, vip",
                "line_items": [],
                "customer": {"id": 207119551, "email": "bob@example.com", "first_name": "Bob", "last_name": null}
            }]
        }"##;

        let response: OrdersResponse = serde_json::from_str(json).unwrap();
        let order = &response.orders[0];

        assert_eq!(order.id, 450_789_469);
        assert_eq!(order.email, None);
        assert_eq!(order.fulfillment_status, None);
        assert_eq!(
            order.created_at.unwrap().to_rfc3339(),
            "2024-03-01T15:15:00+00:00"
        );
        let customer = order.customer.as_ref().unwrap();
        assert_eq!(customer.id, 207_119_551);
        assert_eq!(customer.last_name, None);
    }

    #[test]
    fn test_deserialize_empty_body() {
        let response: OrdersResponse = serde_json::from_str("{}").unwrap();
        assert!(response.orders.is_empty());
    }
}
