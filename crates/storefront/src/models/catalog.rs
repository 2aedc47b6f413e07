//! Catalog domain types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use fiat_parts_core::{CategoryId, NewCartItem, PartCondition, PartId, PartImageId};

use super::null_as_default;

/// A part category (`categories` row).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// An image attached to a part (`part_images` row).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartImage {
    pub id: PartImageId,
    pub part_id: PartId,
    pub image_url: String,
    #[serde(default)]
    pub display_order: i32,
}

/// A part for sale (`parts` row with its category and images embedded).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Part {
    pub id: PartId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub part_number: Option<String>,
    pub price: Decimal,
    #[serde(default)]
    pub condition: PartCondition,
    #[serde(default)]
    pub stock_quantity: i32,
    #[serde(default)]
    pub category_id: Option<CategoryId>,
    /// Embedded `categories` relation, when selected.
    #[serde(default, rename = "categories")]
    pub category: Option<Category>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub compatible_models: Vec<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    /// Embedded `part_images` relation, when selected.
    #[serde(default, rename = "part_images", deserialize_with = "null_as_default")]
    pub images: Vec<PartImage>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

const fn default_active() -> bool {
    true
}

impl Part {
    /// Image with the lowest display order.
    #[must_use]
    pub fn primary_image(&self) -> Option<&str> {
        self.images
            .iter()
            .min_by_key(|img| img.display_order)
            .map(|img| img.image_url.as_str())
    }

    /// Image URLs in display order.
    #[must_use]
    pub fn image_urls(&self) -> Vec<&str> {
        let mut images: Vec<&PartImage> = self.images.iter().collect();
        images.sort_by_key(|img| img.display_order);
        images.into_iter().map(|img| img.image_url.as_str()).collect()
    }

    /// Whether the part can currently be bought.
    #[must_use]
    pub const fn in_stock(&self) -> bool {
        self.is_active && self.stock_quantity > 0
    }
}

impl From<&Part> for NewCartItem {
    fn from(part: &Part) -> Self {
        Self {
            id: part.id.clone(),
            name: part.name.clone(),
            price: part.price,
            image: part.primary_image().map(str::to_owned),
            condition: Some(part.condition.to_string()),
        }
    }
}
