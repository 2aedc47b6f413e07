//! Parts management.

use fiat_parts_core::{CategoryId, PartCondition, PartId};
use fiat_parts_storefront::backend::{Direction, Query};
use fiat_parts_storefront::catalog::PART_SELECT;
use fiat_parts_storefront::models::Part;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::instrument;

use crate::error::AdminError;
use crate::guard::Admin;

/// Fields of a part as entered in the admin form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartInput {
    pub name: String,
    pub description: Option<String>,
    pub part_number: Option<String>,
    pub price: Decimal,
    pub condition: PartCondition,
    pub stock_quantity: i32,
    pub category_id: Option<CategoryId>,
    pub compatible_models: Vec<String>,
    pub is_active: bool,
    /// Image URLs in display order.
    pub images: Vec<String>,
}

impl PartInput {
    fn validate(&self) -> Result<(), AdminError> {
        if self.name.trim().is_empty() {
            return Err(AdminError::BadRequest("name is required".to_string()));
        }
        if self.price.is_sign_negative() {
            return Err(AdminError::BadRequest("price cannot be negative".to_string()));
        }
        if self.stock_quantity < 0 {
            return Err(AdminError::BadRequest(
                "stock quantity cannot be negative".to_string(),
            ));
        }
        Ok(())
    }

    fn row(&self) -> PartRow<'_> {
        fn blank_to_none(s: &Option<String>) -> Option<&str> {
            s.as_deref().map(str::trim).filter(|s| !s.is_empty())
        }
        PartRow {
            name: self.name.trim(),
            description: blank_to_none(&self.description),
            part_number: blank_to_none(&self.part_number),
            price: self.price,
            condition: self.condition,
            stock_quantity: self.stock_quantity,
            category_id: self.category_id.as_ref(),
            compatible_models: self
                .compatible_models
                .iter()
                .map(|m| m.trim())
                .filter(|m| !m.is_empty())
                .collect(),
            is_active: self.is_active,
        }
    }
}

#[derive(Serialize)]
struct PartRow<'a> {
    name: &'a str,
    description: Option<&'a str>,
    part_number: Option<&'a str>,
    price: Decimal,
    condition: PartCondition,
    stock_quantity: i32,
    category_id: Option<&'a CategoryId>,
    compatible_models: Vec<&'a str>,
    is_active: bool,
}

#[derive(Serialize)]
struct ImageRow<'a> {
    part_id: &'a PartId,
    image_url: &'a str,
    display_order: i32,
}

#[derive(serde::Deserialize)]
struct IdRow {
    id: PartId,
}

impl Admin {
    /// Every part, including inactive ones, newest first.
    ///
    /// # Errors
    ///
    /// Returns `AdminError::Backend` if the request fails.
    #[instrument(skip(self))]
    pub async fn list_parts(&self) -> Result<Vec<Part>, AdminError> {
        let query = Query::new()
            .select(PART_SELECT)
            .order("created_at", Direction::Desc);
        Ok(self.client.select("parts", &query).await?)
    }

    /// One part, active or not.
    ///
    /// # Errors
    ///
    /// Returns `AdminError::NotFound` if no part has this ID.
    #[instrument(skip(self), fields(part_id = %id))]
    pub async fn get_part(&self, id: &PartId) -> Result<Part, AdminError> {
        let query = Query::new().select(PART_SELECT).eq("id", id);
        self.client
            .select_one("parts", &query)
            .await?
            .ok_or_else(|| AdminError::NotFound(format!("Part {id}")))
    }

    /// Create a part and its images.
    ///
    /// # Errors
    ///
    /// Returns `AdminError::BadRequest` for invalid input, or
    /// `AdminError::Backend` if a write fails.
    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_part(&self, input: &PartInput) -> Result<Part, AdminError> {
        input.validate()?;

        let created: Vec<IdRow> = self
            .client
            .insert_returning("parts", &input.row(), "id")
            .await?;
        let id = created
            .into_iter()
            .next()
            .map(|row| row.id)
            .ok_or_else(|| AdminError::NotFound("Created part".to_string()))?;

        self.replace_images(&id, &input.images).await?;
        self.catalog.invalidate();
        tracing::info!(part_id = %id, admin = %self.current_admin().user_id, "Part created");

        self.get_part(&id).await
    }

    /// Update a part. Its image list is replaced wholesale.
    ///
    /// # Errors
    ///
    /// Returns `AdminError::BadRequest` for invalid input,
    /// `AdminError::NotFound` if the part doesn't exist, or
    /// `AdminError::Backend` if a write fails.
    #[instrument(skip(self, input), fields(part_id = %id))]
    pub async fn update_part(&self, id: &PartId, input: &PartInput) -> Result<Part, AdminError> {
        input.validate()?;

        let updated: Vec<IdRow> = self
            .client
            .update_returning("parts", &Query::new().eq("id", id), &input.row())
            .await?;
        if updated.is_empty() {
            return Err(AdminError::NotFound(format!("Part {id}")));
        }

        self.replace_images(id, &input.images).await?;
        self.catalog.invalidate();
        tracing::info!(part_id = %id, admin = %self.current_admin().user_id, "Part updated");

        self.get_part(id).await
    }

    /// Delete a part, its image rows, and the stored image files.
    ///
    /// Image files that can't be removed from storage are logged and left
    /// behind.
    ///
    /// # Errors
    ///
    /// Returns `AdminError::NotFound` if the part doesn't exist, or
    /// `AdminError::Backend` if a write fails.
    #[instrument(skip(self), fields(part_id = %id))]
    pub async fn delete_part(&self, id: &PartId) -> Result<(), AdminError> {
        let part = self.get_part(id).await?;

        self.client
            .delete("part_images", &Query::new().eq("part_id", id))
            .await?;
        self.client
            .delete("parts", &Query::new().eq("id", id))
            .await?;
        self.catalog.invalidate();
        tracing::info!(part_id = %id, admin = %self.current_admin().user_id, "Part deleted");

        for image in &part.images {
            if let Err(e) = self.remove_image(&image.image_url).await {
                tracing::warn!(error = %e, url = %image.image_url, "Failed to remove part image");
            }
        }
        Ok(())
    }

    async fn replace_images(&self, part_id: &PartId, urls: &[String]) -> Result<(), AdminError> {
        self.client
            .delete("part_images", &Query::new().eq("part_id", part_id))
            .await?;

        let rows: Vec<ImageRow<'_>> = urls
            .iter()
            .map(|url| url.trim())
            .filter(|url| !url.is_empty())
            .zip(0..)
            .map(|(image_url, display_order)| ImageRow {
                part_id,
                image_url,
                display_order,
            })
            .collect();
        if rows.is_empty() {
            return Ok(());
        }
        self.client.insert("part_images", &rows).await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn input() -> PartInput {
        PartInput {
            name: " Punto Headlight ".to_string(),
            description: Some(String::new()),
            part_number: Some("46522731".to_string()),
            price: Decimal::new(4500, 2),
            condition: PartCondition::Used,
            stock_quantity: 2,
            category_id: None,
            compatible_models: vec!["Punto".to_string(), " ".to_string()],
            is_active: true,
            images: Vec::new(),
        }
    }

    #[test]
    fn test_validation() {
        assert!(input().validate().is_ok());

        let blank = PartInput {
            name: "  ".to_string(),
            ..input()
        };
        assert!(matches!(blank.validate(), Err(AdminError::BadRequest(_))));

        let negative = PartInput {
            price: Decimal::new(-1, 0),
            ..input()
        };
        assert!(matches!(negative.validate(), Err(AdminError::BadRequest(_))));

        let no_stock = PartInput {
            stock_quantity: -1,
            ..input()
        };
        assert!(matches!(no_stock.validate(), Err(AdminError::BadRequest(_))));
    }

    #[test]
    fn test_row_trims_and_drops_blanks() {
        let input = input();
        let row = serde_json::to_value(input.row()).unwrap();
        assert_eq!(row["name"], "Punto Headlight");
        assert!(row["description"].is_null());
        assert_eq!(row["compatible_models"], serde_json::json!(["Punto"]));
        assert_eq!(row["condition"], "used");
    }
}
