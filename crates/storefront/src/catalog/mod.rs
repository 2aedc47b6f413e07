//! Catalog reads: parts and categories.
//!
//! Reads go straight to the backend and are cached in-process with `moka`.
//! Admin writes call [`CatalogService::invalidate`] so the next read sees
//! them.

mod cache;

use std::sync::Arc;
use std::time::Duration;

use fiat_parts_core::{CategoryId, PartCondition, PartId};
use moka::future::Cache;
use tracing::{debug, instrument};

use crate::backend::{BackendClient, BackendError, Direction, Query};
use crate::models::{Category, Part};

use cache::{CacheKey, CacheValue};

/// Columns and relations fetched for every part.
pub const PART_SELECT: &str = "*,categories(*),part_images(*)";

/// Largest page size accepted by [`CatalogService::list_parts`].
pub const MAX_PAGE_SIZE: usize = 100;

/// Parts listing filter.
#[derive(Debug, Clone, Default, Hash, PartialEq, Eq)]
pub struct PartFilter {
    /// Only parts in the category with this slug.
    pub category_slug: Option<String>,
    /// Case-insensitive match on the part name.
    pub search: Option<String>,
    pub condition: Option<PartCondition>,
    pub limit: Option<usize>,
}

impl PartFilter {
    /// Drop blank fields and clamp the limit so equivalent filters share a
    /// cache entry.
    fn normalized(&self) -> Self {
        let blank_to_none = |s: &Option<String>| {
            s.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        Self {
            category_slug: blank_to_none(&self.category_slug),
            search: blank_to_none(&self.search),
            condition: self.condition,
            limit: self.limit.map(|n| n.clamp(1, MAX_PAGE_SIZE)),
        }
    }
}

/// Query for active parts matching a filter, newest first.
fn parts_query(filter: &PartFilter, category_id: Option<&CategoryId>) -> Query {
    let mut query = Query::new()
        .select(PART_SELECT)
        .eq("is_active", true);
    if let Some(id) = category_id {
        query = query.eq("category_id", id);
    }
    if let Some(search) = &filter.search {
        query = query.contains_ci("name", search);
    }
    if let Some(condition) = filter.condition {
        query = query.eq("condition", condition);
    }
    query = query.order("created_at", Direction::Desc);
    if let Some(limit) = filter.limit {
        query = query.limit(limit);
    }
    query
}

/// Cached catalog reads.
#[derive(Clone)]
pub struct CatalogService {
    inner: Arc<CatalogInner>,
}

struct CatalogInner {
    client: BackendClient,
    cache: Cache<CacheKey, CacheValue>,
}

impl std::fmt::Debug for CatalogService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogService")
            .field("cached_entries", &self.inner.cache.entry_count())
            .finish_non_exhaustive()
    }
}

impl CatalogService {
    /// Create a catalog whose cache entries live for `ttl`.
    #[must_use]
    pub fn new(client: BackendClient, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(1000)
            .time_to_live(ttl)
            .build();
        Self {
            inner: Arc::new(CatalogInner { client, cache }),
        }
    }

    /// Active parts matching `filter`, newest first.
    ///
    /// An unknown category slug yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if the backend request fails.
    #[instrument(skip(self))]
    pub async fn list_parts(&self, filter: &PartFilter) -> Result<Vec<Part>, BackendError> {
        let filter = filter.normalized();
        let key = CacheKey::Parts(filter.clone());
        if let Some(CacheValue::Parts(parts)) = self.inner.cache.get(&key).await {
            debug!("Cache hit for parts listing");
            return Ok(parts);
        }

        let category_id = match &filter.category_slug {
            Some(slug) => match self.category_by_slug(slug).await? {
                Some(category) => Some(category.id),
                None => {
                    debug!(slug = %slug, "Unknown category slug");
                    return Ok(Vec::new());
                }
            },
            None => None,
        };

        let parts: Vec<Part> = self
            .inner
            .client
            .select("parts", &parts_query(&filter, category_id.as_ref()))
            .await?;

        self.inner
            .cache
            .insert(key, CacheValue::Parts(parts.clone()))
            .await;
        Ok(parts)
    }

    /// One active part with its images and category.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::NotFound` if no active part has this ID, or any
    /// request failure.
    #[instrument(skip(self), fields(part_id = %id))]
    pub async fn get_part(&self, id: &PartId) -> Result<Part, BackendError> {
        let key = CacheKey::Part(id.clone());
        if let Some(CacheValue::Part(part)) = self.inner.cache.get(&key).await {
            debug!("Cache hit for part");
            return Ok(*part);
        }

        let query = Query::new()
            .select(PART_SELECT)
            .eq("id", id)
            .eq("is_active", true);
        let part: Part = self
            .inner
            .client
            .select_one("parts", &query)
            .await?
            .ok_or_else(|| BackendError::NotFound(format!("Part {id}")))?;

        self.inner
            .cache
            .insert(key, CacheValue::Part(Box::new(part.clone())))
            .await;
        Ok(part)
    }

    /// All categories, ordered by name.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if the backend request fails.
    #[instrument(skip(self))]
    pub async fn list_categories(&self) -> Result<Vec<Category>, BackendError> {
        if let Some(CacheValue::Categories(categories)) =
            self.inner.cache.get(&CacheKey::Categories).await
        {
            debug!("Cache hit for categories");
            return Ok(categories);
        }

        let categories: Vec<Category> = self
            .inner
            .client
            .select(
                "categories",
                &Query::new().select("*").order("name", Direction::Asc),
            )
            .await?;

        self.inner
            .cache
            .insert(
                CacheKey::Categories,
                CacheValue::Categories(categories.clone()),
            )
            .await;
        Ok(categories)
    }

    /// Category with this slug, if any.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if the backend request fails.
    pub async fn category_by_slug(&self, slug: &str) -> Result<Option<Category>, BackendError> {
        Ok(self
            .list_categories()
            .await?
            .into_iter()
            .find(|category| category.slug == slug))
    }

    /// Drop every cached entry.
    pub fn invalidate(&self) {
        self.inner.cache.invalidate_all();
        debug!("Catalog cache invalidated");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_normalization_shares_cache_key() {
        let a = PartFilter {
            search: Some("  ".to_string()),
            limit: Some(10_000),
            ..PartFilter::default()
        };
        let b = PartFilter {
            limit: Some(MAX_PAGE_SIZE),
            ..PartFilter::default()
        };
        assert_eq!(a.normalized(), b.normalized());
    }

    #[test]
    fn test_parts_query() {
        let filter = PartFilter {
            category_slug: Some("brakes".to_string()),
            search: Some("pad".to_string()),
            condition: Some(PartCondition::New),
            limit: Some(12),
        };
        let pairs = parts_query(&filter, Some(&CategoryId::new("c-7"))).to_pairs();
        let get = |k: &str| {
            pairs
                .iter()
                .find(|(key, _)| key == k)
                .map(|(_, v)| v.as_str())
        };

        assert_eq!(get("select"), Some(PART_SELECT));
        assert_eq!(get("is_active"), Some("eq.true"));
        assert_eq!(get("category_id"), Some("eq.c-7"));
        assert_eq!(get("name"), Some("ilike.*pad*"));
        assert_eq!(get("condition"), Some("eq.new"));
        assert_eq!(get("order"), Some("created_at.desc"));
        assert_eq!(get("limit"), Some("12"));
    }
}
