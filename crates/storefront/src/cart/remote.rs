//! Remote cart rows (`cart_items`).

use async_trait::async_trait;
use fiat_parts_core::{CartLine, PartId, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::backend::{BackendClient, BackendError, Direction, Query};
use crate::models::null_as_default;

const CART_TABLE: &str = "cart_items";

/// Cart rows joined with the current part name, price, condition, and images.
const CART_SELECT: &str =
    "part_id,quantity,parts(id,name,price,condition,part_images(image_url,display_order))";

/// Row-per-line cart storage for signed-in users.
#[async_trait]
pub trait CartRemote: Send + Sync + 'static {
    /// Every line in the user's cart, joined with current part data.
    async fn fetch_cart(&self, user_id: &UserId) -> Result<Vec<CartLine>, BackendError>;

    async fn insert_line(
        &self,
        user_id: &UserId,
        part_id: &PartId,
        quantity: u32,
    ) -> Result<(), BackendError>;

    async fn update_quantity(
        &self,
        user_id: &UserId,
        part_id: &PartId,
        quantity: u32,
    ) -> Result<(), BackendError>;

    async fn delete_line(&self, user_id: &UserId, part_id: &PartId) -> Result<(), BackendError>;

    async fn delete_all(&self, user_id: &UserId) -> Result<(), BackendError>;
}

#[derive(Deserialize)]
struct CartRow {
    part_id: PartId,
    quantity: u32,
    /// `null` when the part has since been deleted.
    #[serde(default)]
    parts: Option<CartRowPart>,
}

#[derive(Deserialize)]
struct CartRowPart {
    name: String,
    price: Decimal,
    #[serde(default)]
    condition: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    part_images: Vec<CartRowImage>,
}

#[derive(Deserialize)]
struct CartRowImage {
    image_url: String,
    #[serde(default)]
    display_order: i32,
}

impl CartRow {
    fn into_line(self) -> Option<CartLine> {
        let part = self.parts?;
        let image = part
            .part_images
            .into_iter()
            .min_by_key(|img| img.display_order)
            .map(|img| img.image_url);
        Some(CartLine {
            id: self.part_id,
            name: part.name,
            price: part.price,
            quantity: self.quantity,
            image,
            condition: part.condition,
        })
    }
}

#[derive(Serialize)]
struct NewCartRow<'a> {
    user_id: &'a UserId,
    part_id: &'a PartId,
    quantity: u32,
}

#[derive(Serialize)]
struct QuantityPatch {
    quantity: u32,
}

fn line_filter(user_id: &UserId, part_id: &PartId) -> Query {
    Query::new().eq("user_id", user_id).eq("part_id", part_id)
}

#[async_trait]
impl CartRemote for BackendClient {
    #[instrument(skip(self))]
    async fn fetch_cart(&self, user_id: &UserId) -> Result<Vec<CartLine>, BackendError> {
        let query = Query::new()
            .select(CART_SELECT)
            .eq("user_id", user_id)
            .order("created_at", Direction::Asc);
        let rows: Vec<CartRow> = self.select(CART_TABLE, &query).await?;

        let total = rows.len();
        let lines: Vec<CartLine> = rows.into_iter().filter_map(CartRow::into_line).collect();
        if lines.len() < total {
            tracing::debug!(
                skipped = total - lines.len(),
                "Skipped cart rows for parts that no longer exist"
            );
        }
        Ok(lines)
    }

    async fn insert_line(
        &self,
        user_id: &UserId,
        part_id: &PartId,
        quantity: u32,
    ) -> Result<(), BackendError> {
        self.insert(
            CART_TABLE,
            &NewCartRow {
                user_id,
                part_id,
                quantity,
            },
        )
        .await
    }

    async fn update_quantity(
        &self,
        user_id: &UserId,
        part_id: &PartId,
        quantity: u32,
    ) -> Result<(), BackendError> {
        self.update(
            CART_TABLE,
            &line_filter(user_id, part_id),
            &QuantityPatch { quantity },
        )
        .await
    }

    async fn delete_line(&self, user_id: &UserId, part_id: &PartId) -> Result<(), BackendError> {
        self.delete(CART_TABLE, &line_filter(user_id, part_id)).await
    }

    async fn delete_all(&self, user_id: &UserId) -> Result<(), BackendError> {
        self.delete(CART_TABLE, &Query::new().eq("user_id", user_id))
            .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_row_joins_into_line() {
        let row: CartRow = serde_json::from_value(serde_json::json!({
            "part_id": "42",
            "quantity": 3,
            "parts": {
                "id": "42",
                "name": "Brake Pad",
                "price": 100,
                "condition": "new",
                "part_images": [
                    {"image_url": "https://cdn/2.jpg", "display_order": 2},
                    {"image_url": "https://cdn/0.jpg", "display_order": 0}
                ]
            }
        }))
        .unwrap();

        let line = row.into_line().unwrap();
        assert_eq!(line.id.as_str(), "42");
        assert_eq!(line.quantity, 3);
        assert_eq!(line.price, Decimal::new(100, 0));
        assert_eq!(line.image.as_deref(), Some("https://cdn/0.jpg"));
        assert_eq!(line.condition.as_deref(), Some("new"));
    }

    #[test]
    fn test_row_for_deleted_part_is_skipped() {
        let row: CartRow = serde_json::from_value(serde_json::json!({
            "part_id": "gone",
            "quantity": 1,
            "parts": null
        }))
        .unwrap();
        assert!(row.into_line().is_none());
    }
}
