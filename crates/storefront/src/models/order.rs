//! Order domain types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use fiat_parts_core::{OrderId, OrderItemId, OrderStatus, PartId, UserId};

use super::null_as_default;

/// A placed order (`orders` row with `order_items` embedded).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub status: OrderStatus,
    pub total_amount: Decimal,
    pub customer_name: String,
    pub customer_email: String,
    #[serde(default)]
    pub customer_phone: Option<String>,
    pub shipping_address: String,
    pub shipping_city: String,
    pub shipping_postal_code: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(
        default,
        rename = "order_items",
        deserialize_with = "null_as_default",
        skip_serializing
    )]
    pub items: Vec<OrderItem>,
}

/// One line of an order (`order_items` row).
///
/// Name and unit price are captured when the order is placed so later catalog
/// edits don't rewrite order history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    /// `None` once the part has been deleted from the catalog.
    #[serde(default)]
    pub part_id: Option<PartId>,
    pub part_name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
}

impl OrderItem {
    /// `unit_price * quantity`.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

impl Order {
    /// Total number of units across all items.
    #[must_use]
    pub fn item_count(&self) -> u64 {
        self.items.iter().map(|item| u64::from(item.quantity)).sum()
    }
}
