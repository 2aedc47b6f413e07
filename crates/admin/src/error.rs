//! Error type for admin operations.

use fiat_parts_storefront::backend::BackendError;
use thiserror::Error;

/// Errors returned by admin operations.
#[derive(Debug, Error)]
pub enum AdminError {
    /// No user is signed in.
    #[error("Unauthorized: sign in as an administrator")]
    NotSignedIn,

    /// The signed-in user lacks the admin role.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Input failed validation.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Backend call failed.
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Reading a local file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AdminError {
    /// Whether this error is the caller's fault rather than a failure on our
    /// side or the backend's.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        match self {
            Self::NotSignedIn | Self::Forbidden(_) | Self::BadRequest(_) | Self::NotFound(_) => {
                true
            }
            Self::Backend(e) => e.is_rejection(),
            Self::Io(_) => false,
        }
    }
}
