//! Cache types for catalog reads.

use fiat_parts_core::PartId;

use super::PartFilter;
use crate::models::{Category, Part};

/// Cache key for catalog reads.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub enum CacheKey {
    Part(PartId),
    Parts(PartFilter),
    Categories,
}

/// Cached value types.
#[derive(Debug, Clone)]
pub enum CacheValue {
    Part(Box<Part>),
    Parts(Vec<Part>),
    Categories(Vec<Category>),
}
