//! Order management.

use fiat_parts_core::{OrderId, OrderStatus};
use fiat_parts_storefront::backend::{Direction, Query};
use fiat_parts_storefront::models::Order;
use serde::Serialize;
use tracing::instrument;

use crate::error::AdminError;
use crate::guard::Admin;

const ORDER_SELECT: &str = "*,order_items(*)";

#[derive(Serialize)]
struct StatusPatch {
    status: OrderStatus,
}

impl Admin {
    /// Orders with their items, newest first, optionally only those in one
    /// status.
    ///
    /// # Errors
    ///
    /// Returns `AdminError::Backend` if the request fails.
    #[instrument(skip(self))]
    pub async fn list_orders(&self, status: Option<OrderStatus>) -> Result<Vec<Order>, AdminError> {
        let mut query = Query::new().select(ORDER_SELECT);
        if let Some(status) = status {
            query = query.eq("status", status);
        }
        let query = query.order("created_at", Direction::Desc);
        Ok(self.client.select("orders", &query).await?)
    }

    /// One order with its items.
    ///
    /// # Errors
    ///
    /// Returns `AdminError::NotFound` if no order has this ID.
    #[instrument(skip(self), fields(order_id = %id))]
    pub async fn get_order(&self, id: &OrderId) -> Result<Order, AdminError> {
        let query = Query::new().select(ORDER_SELECT).eq("id", id);
        self.client
            .select_one("orders", &query)
            .await?
            .ok_or_else(|| AdminError::NotFound(format!("Order {id}")))
    }

    /// Move an order to a new status.
    ///
    /// # Errors
    ///
    /// Returns `AdminError::NotFound` if no order has this ID, or
    /// `AdminError::Backend` if the update fails.
    #[instrument(skip(self), fields(order_id = %id))]
    pub async fn update_order_status(
        &self,
        id: &OrderId,
        status: OrderStatus,
    ) -> Result<Order, AdminError> {
        let updated: Vec<Order> = self
            .client
            .update_returning("orders", &Query::new().eq("id", id), &StatusPatch { status })
            .await?;
        if updated.is_empty() {
            return Err(AdminError::NotFound(format!("Order {id}")));
        }
        tracing::info!(order_id = %id, status = %status, "Order status updated");
        self.get_order(id).await
    }
}
