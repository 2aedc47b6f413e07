//! Domain models for storefront.
//!
//! Catalog and order types deserialize straight from backend rows (with
//! embedded relations), auth types are built by the backend client.

pub mod auth;
pub mod catalog;
pub mod order;

pub use auth::{AuthEvent, AuthEventKind, AuthSession, AuthUser, Profile, ProfileUpdate, SignUpMetadata};
pub use catalog::{Category, Part, PartImage};
pub use order::{Order, OrderItem};

use serde::{Deserialize, Deserializer};

/// Deserialize `null` as the type's default (e.g., a `null` array column as an empty `Vec`).
///
/// # Errors
///
/// Propagates the deserializer's error for non-null values of the wrong shape.
pub fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
