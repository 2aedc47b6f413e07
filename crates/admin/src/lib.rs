//! Fiat Parts admin library.
//!
//! Back-office operations over the hosted backend: parts, categories, orders,
//! and part images. Every operation goes through an [`Admin`] handle, which
//! can only be created for a user holding the `admin` role.
//!
//! Writes that change what shoppers see invalidate the storefront's catalog
//! cache.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod categories;
pub mod error;
pub mod guard;
pub mod media;
pub mod orders;
pub mod parts;

pub use categories::{CategoryInput, slugify};
pub use error::AdminError;
pub use guard::{Admin, CurrentAdmin};
pub use media::UploadOwner;
pub use parts::PartInput;
