//! Fiat Parts Core - Shared types library.
//!
//! This crate provides common types used across all storefront components:
//! - `storefront` - Backend client, session holder, cart reconciler, catalog, checkout
//! - `admin` - Back-office CRUD for parts, categories, orders, and images
//! - `cli` - Command-line front end for shoppers and admins
//!
//! # Architecture
//!
//! The core crate contains only types and pure state rules - no I/O, no HTTP
//! clients, no storage. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, prices, emails, statuses, session identity, and cart state

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
