//! Conversion from REST wire types to the normalized [`Order`].

use std::str::FromStr;

use rust_decimal::Decimal;
use storelink_core::{Customer, Order};
use thiserror::Error;

use super::types::{RemoteCustomer, RemoteOrder};

/// A remote order that cannot be normalized.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConversionError {
    /// A field required for identity or the watermark is absent.
    #[error("order {order_id} is missing {field}")]
    MissingField {
        /// Remote order ID (0 when the ID itself is missing).
        order_id: i64,
        /// Name of the missing field.
        field: &'static str,
    },
    /// A money field is not a decimal number.
    #[error("order {order_id} has invalid {field}: {value:?}")]
    InvalidAmount {
        /// Remote order ID.
        order_id: i64,
        /// Name of the money field.
        field: &'static str,
        /// Raw value as received.
        value: String,
    },
}

impl TryFrom<RemoteOrder> for Order {
    type Error = ConversionError;

    fn try_from(remote: RemoteOrder) -> Result<Self, Self::Error> {
        let order_id = remote.id;
        if order_id == 0 {
            return Err(ConversionError::MissingField {
                order_id,
                field: "id",
            });
        }
        let created_at = remote.created_at.ok_or(ConversionError::MissingField {
            order_id,
            field: "created_at",
        })?;
        let updated_at = remote.updated_at.ok_or(ConversionError::MissingField {
            order_id,
            field: "updated_at",
        })?;

        Ok(Self {
            id: order_id,
            name: remote.name.unwrap_or_default(),
            email: remote.email.unwrap_or_default(),
            created_at,
            updated_at,
            cancelled_at: remote.cancelled_at,
            closed_at: remote.closed_at,
            processed_at: remote.processed_at,
            currency: remote.currency.unwrap_or_default(),
            total_price: parse_amount(order_id, "total_price", remote.total_price)?,
            subtotal_price: parse_amount(order_id, "subtotal_price", remote.subtotal_price)?,
            total_discounts: parse_amount(order_id, "total_discounts", remote.total_discounts)?,
            total_tax: parse_amount(order_id, "total_tax", remote.total_tax)?,
            taxes_included: remote.taxes_included.unwrap_or(false),
            financial_status: remote.financial_status.unwrap_or_default(),
            fulfillment_status: remote.fulfillment_status.unwrap_or_default(),
            order_number: remote.order_number.unwrap_or_default(),
            test: remote.test.unwrap_or(false),
            confirmed: remote.confirmed.unwrap_or(false),
            tags: remote.tags.unwrap_or_default(),
            cancel_reason: remote.cancel_reason.unwrap_or_default(),
            gateway: remote.gateway.unwrap_or_default(),
            browser_ip: remote.browser_ip.unwrap_or_default(),
            contact_email: remote.contact_email.unwrap_or_default(),
            phone: remote.phone.unwrap_or_default(),
            customer: remote.customer.map(convert_customer).unwrap_or_default(),
        })
    }
}

fn convert_customer(customer: RemoteCustomer) -> Customer {
    Customer {
        id: (customer.id != 0).then_some(customer.id),
        email: customer.email.unwrap_or_default(),
        first_name: customer.first_name.unwrap_or_default(),
        last_name: customer.last_name.unwrap_or_default(),
        phone: customer.phone.unwrap_or_default(),
    }
}

/// Parse a money string; absent or blank means zero.
fn parse_amount(
    order_id: i64,
    field: &'static str,
    raw: Option<String>,
) -> Result<Decimal, ConversionError> {
    let Some(raw) = raw else {
        return Ok(Decimal::ZERO);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Decimal::ZERO);
    }
    Decimal::from_str(trimmed).map_err(|_| ConversionError::InvalidAmount {
        order_id,
        field,
        value: raw,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{DateTime, TimeZone, Utc};

    use super::*;

    fn remote(id: i64) -> RemoteOrder {
        RemoteOrder {
            id,
            name: Some("#1001".to_string()),
            created_at: Some(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()),
            updated_at: Some(Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap()),
            total_price: Some("19.99".to_string()),
            ..RemoteOrder::default()
        }
    }

    #[test]
    fn test_missing_amounts_become_zero() {
        let order = Order::try_from(remote(1)).unwrap();
        assert_eq!(order.total_price, Decimal::new(1999, 2));
        assert_eq!(order.subtotal_price, Decimal::ZERO);
        assert_eq!(order.total_tax, Decimal::ZERO);
    }

    #[test]
    fn test_optional_timestamps_stay_optional() {
        let mut input = remote(1);
        input.cancelled_at = Some(DateTime::UNIX_EPOCH);
        let order = Order::try_from(input).unwrap();
        assert!(order.is_cancelled());
        assert_eq!(order.closed_at, None);
        assert_eq!(order.processed_at, None);
    }

    #[test]
    fn test_absent_customer_is_zero_value() {
        let order = Order::try_from(remote(1)).unwrap();
        assert_eq!(order.customer, Customer::default());
    }

    #[test]
    fn test_customer_snapshot_is_extracted() {
        let mut input = remote(1);
        input.customer = Some(RemoteCustomer {
            id: 42,
            email: Some("ada@example.com".to_string()),
            first_name: Some("Ada".to_string()),
            last_name: None,
            phone: None,
        });
        let order = Order::try_from(input).unwrap();
        assert_eq!(order.customer.id, Some(42));
        assert_eq!(order.customer.first_name, "Ada");
        assert_eq!(order.customer.last_name, "");
    }

    #[test]
    fn test_missing_updated_at_is_rejected() {
        let mut input = remote(7);
        input.updated_at = None;
        assert_eq!(
            Order::try_from(input).unwrap_err(),
            ConversionError::MissingField {
                order_id: 7,
                field: "updated_at"
            }
        );
    }

    #[test]
    fn test_invalid_amount_is_rejected() {
        let mut input = remote(7);
        input.total_tax = Some("twelve".to_string());
        let err = Order::try_from(input).unwrap_err();
        assert_eq!(err.to_string(), "order 7 has invalid total_tax: \"twelve\"");
    }
}
