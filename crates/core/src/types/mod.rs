//! Core types for the Fiat Parts storefront.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod cart;
pub mod email;
pub mod id;
pub mod identity;
pub mod price;
pub mod status;

pub use cart::{AddOutcome, CartLine, CartState, NewCartItem, QuantityChange};
pub use email::{Email, EmailError};
pub use id::*;
pub use identity::Identity;
pub use price::{CurrencyCode, Price};
pub use status::*;
