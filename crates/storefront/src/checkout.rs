//! Order placement and order history.

use fiat_parts_core::{Email, EmailError, OrderId, OrderStatus, PartId, UserId};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use tracing::instrument;

use crate::backend::{BackendClient, BackendError, Direction, Query};
use crate::cart::CartService;
use crate::error::add_breadcrumb;
use crate::models::{Order, OrderItem};

/// Errors that can occur while placing an order.
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("Your cart is empty")]
    EmptyCart,
    #[error("Missing required field: {0}")]
    MissingField(&'static str),
    #[error("Invalid email: {0}")]
    InvalidEmail(#[from] EmailError),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Customer and delivery details entered at checkout.
#[derive(Debug, Clone, Default)]
pub struct ShippingDetails {
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub address: String,
    pub city: String,
    pub postal_code: String,
    pub notes: Option<String>,
}

impl ShippingDetails {
    fn validate(&self) -> Result<Email, CheckoutError> {
        let required = [
            ("name", &self.customer_name),
            ("address", &self.address),
            ("city", &self.city),
            ("postal code", &self.postal_code),
        ];
        if let Some((field, _)) = required.into_iter().find(|(_, v)| v.trim().is_empty()) {
            return Err(CheckoutError::MissingField(field));
        }
        Ok(Email::parse(&self.customer_email)?)
    }
}

fn non_blank(s: Option<&String>) -> Option<&str> {
    s.map(|s| s.trim()).filter(|s| !s.is_empty())
}

#[derive(Serialize)]
struct NewOrder<'a> {
    user_id: Option<&'a UserId>,
    status: OrderStatus,
    total_amount: Decimal,
    customer_name: &'a str,
    customer_email: &'a str,
    customer_phone: Option<&'a str>,
    shipping_address: &'a str,
    shipping_city: &'a str,
    shipping_postal_code: &'a str,
    notes: Option<&'a str>,
}

#[derive(Serialize)]
struct NewOrderItem<'a> {
    order_id: &'a OrderId,
    part_id: &'a PartId,
    part_name: &'a str,
    quantity: u32,
    unit_price: Decimal,
}

/// Places orders and reads order history.
#[derive(Debug, Clone)]
pub struct CheckoutService {
    client: BackendClient,
}

impl CheckoutService {
    #[must_use]
    pub const fn new(client: BackendClient) -> Self {
        Self { client }
    }

    /// Turn the cart into a pending order.
    ///
    /// The order row is written first, then its items. If the items can't be
    /// written the order row is deleted again. On success the cart is
    /// cleared.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::EmptyCart` or a validation error before any
    /// backend call, or `CheckoutError::Backend` if the order couldn't be
    /// stored.
    #[instrument(skip(self, cart, shipping), fields(identity = %cart.identity()))]
    pub async fn place_order(
        &self,
        cart: &mut CartService,
        shipping: &ShippingDetails,
    ) -> Result<Order, CheckoutError> {
        cart.sync_identity().await;
        if cart.lines().is_empty() {
            return Err(CheckoutError::EmptyCart);
        }
        let email = shipping.validate()?;

        let new_order = NewOrder {
            user_id: cart.identity().user_id(),
            status: OrderStatus::Pending,
            total_amount: cart.total_price(),
            customer_name: shipping.customer_name.trim(),
            customer_email: email.as_str(),
            customer_phone: non_blank(shipping.customer_phone.as_ref()),
            shipping_address: shipping.address.trim(),
            shipping_city: shipping.city.trim(),
            shipping_postal_code: shipping.postal_code.trim(),
            notes: non_blank(shipping.notes.as_ref()),
        };
        let mut order: Order = self
            .client
            .insert_returning("orders", &new_order, "*")
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::NotFound("Created order".to_string()))?;

        let stored_items: Vec<OrderItem> = {
            let items: Vec<NewOrderItem<'_>> = cart
                .lines()
                .iter()
                .map(|line| NewOrderItem {
                    order_id: &order.id,
                    part_id: &line.id,
                    part_name: &line.name,
                    quantity: line.quantity,
                    unit_price: line.price,
                })
                .collect();

            match self.client.insert_returning("order_items", &items, "*").await {
                Ok(stored) => stored,
                Err(e) => {
                    tracing::error!(error = %e, order_id = %order.id, "Failed to store order items");
                    if let Err(cleanup) = self
                        .client
                        .delete("orders", &Query::new().eq("id", &order.id))
                        .await
                    {
                        tracing::error!(
                            error = %cleanup,
                            order_id = %order.id,
                            "Failed to delete order without items"
                        );
                    }
                    return Err(e.into());
                }
            }
        };

        order.items = stored_items;
        tracing::info!(
            order_id = %order.id,
            total = %order.total_amount,
            items = order.items.len(),
            "Order placed"
        );
        add_breadcrumb("checkout", "Order placed", Some(&[("order_id", order.id.as_str())]));

        cart.clear().await;
        Ok(order)
    }

    /// A user's orders with their items, newest first.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if the backend request fails.
    #[instrument(skip(self))]
    pub async fn orders_for_user(&self, user_id: &UserId) -> Result<Vec<Order>, BackendError> {
        let query = Query::new()
            .select("*,order_items(*)")
            .eq("user_id", user_id)
            .order("created_at", Direction::Desc);
        self.client.select("orders", &query).await
    }
}
