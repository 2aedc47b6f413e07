//! Category management.

use fiat_parts_core::CategoryId;
use fiat_parts_storefront::backend::{Direction, Query};
use fiat_parts_storefront::models::Category;
use serde::Serialize;
use tracing::instrument;

use crate::error::AdminError;
use crate::guard::Admin;

/// Fields of a category as entered in the admin form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryInput {
    pub name: String,
    /// Derived from the name when blank.
    pub slug: Option<String>,
    pub description: Option<String>,
}

#[derive(Serialize)]
struct CategoryRow<'a> {
    name: &'a str,
    slug: String,
    description: Option<&'a str>,
}

impl CategoryInput {
    fn row(&self) -> Result<CategoryRow<'_>, AdminError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(AdminError::BadRequest("name is required".to_string()));
        }
        let slug = self
            .slug
            .as_deref()
            .map(slugify)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| slugify(name));
        if slug.is_empty() {
            return Err(AdminError::BadRequest(
                "slug must contain at least one letter or digit".to_string(),
            ));
        }
        Ok(CategoryRow {
            name,
            slug,
            description: self
                .description
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty()),
        })
    }
}

/// URL slug for a name: lowercase ASCII letters and digits joined by single
/// hyphens. Common accented Latin letters are folded to their base letter.
#[must_use]
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_hyphen = false;
    for c in name.chars().flat_map(char::to_lowercase) {
        let c = fold_accent(c);
        if c.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c);
        } else {
            pending_hyphen = true;
        }
    }
    slug
}

const fn fold_accent(c: char) -> char {
    match c {
        'à' | 'á' | 'â' | 'ä' | 'ã' => 'a',
        'è' | 'é' | 'ê' | 'ë' => 'e',
        'ì' | 'í' | 'î' | 'ï' => 'i',
        'ò' | 'ó' | 'ô' | 'ö' | 'õ' => 'o',
        'ù' | 'ú' | 'û' | 'ü' => 'u',
        'ç' => 'c',
        'ñ' => 'n',
        _ => c,
    }
}

impl Admin {
    /// All categories, ordered by name.
    ///
    /// # Errors
    ///
    /// Returns `AdminError::Backend` if the request fails.
    #[instrument(skip(self))]
    pub async fn list_categories(&self) -> Result<Vec<Category>, AdminError> {
        let query = Query::new().select("*").order("name", Direction::Asc);
        Ok(self.client.select("categories", &query).await?)
    }

    /// Create a category.
    ///
    /// # Errors
    ///
    /// Returns `AdminError::BadRequest` for invalid input, or
    /// `AdminError::Backend` if the insert fails (e.g., duplicate slug).
    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_category(&self, input: &CategoryInput) -> Result<Category, AdminError> {
        let row = input.row()?;
        let created: Vec<Category> = self
            .client
            .insert_returning("categories", &row, "*")
            .await?;
        let category = created
            .into_iter()
            .next()
            .ok_or_else(|| AdminError::NotFound("Created category".to_string()))?;

        self.catalog.invalidate();
        tracing::info!(category_id = %category.id, slug = %category.slug, "Category created");
        Ok(category)
    }

    /// Update a category.
    ///
    /// # Errors
    ///
    /// Returns `AdminError::BadRequest` for invalid input,
    /// `AdminError::NotFound` if the category doesn't exist, or
    /// `AdminError::Backend` if the update fails.
    #[instrument(skip(self, input), fields(category_id = %id))]
    pub async fn update_category(
        &self,
        id: &CategoryId,
        input: &CategoryInput,
    ) -> Result<Category, AdminError> {
        let row = input.row()?;
        let updated: Vec<Category> = self
            .client
            .update_returning("categories", &Query::new().eq("id", id), &row)
            .await?;
        let category = updated
            .into_iter()
            .next()
            .ok_or_else(|| AdminError::NotFound(format!("Category {id}")))?;

        self.catalog.invalidate();
        tracing::info!(category_id = %id, "Category updated");
        Ok(category)
    }

    /// Delete a category.
    ///
    /// # Errors
    ///
    /// Returns `AdminError::Backend` if the delete fails (e.g., parts still
    /// reference it).
    #[instrument(skip(self), fields(category_id = %id))]
    pub async fn delete_category(&self, id: &CategoryId) -> Result<(), AdminError> {
        self.client
            .delete("categories", &Query::new().eq("id", id))
            .await?;
        self.catalog.invalidate();
        tracing::info!(category_id = %id, "Category deleted");
        Ok(())
    }
}
