//! Top-level error type for the CLI.

use fiat_parts_admin::AdminError;
use fiat_parts_storefront::backend::BackendError;
use fiat_parts_storefront::checkout::CheckoutError;
use fiat_parts_storefront::config::ConfigError;
use fiat_parts_storefront::local_store::StoreError;
use thiserror::Error;

/// Anything a command can fail with.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Local storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Checkout failed: {0}")]
    Checkout(#[from] CheckoutError),

    #[error("Admin error: {0}")]
    Admin(#[from] AdminError),

    /// An auth operation reported failure.
    #[error("{0}")]
    Auth(String),

    /// Bad command-line input.
    #[error("{0}")]
    Usage(String),
}

impl AppError {
    /// Log the error, sending server-side failures to Sentry.
    pub fn report(&self) {
        if self.is_server_error() {
            let event_id = sentry::capture_error(self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Command failed"
            );
        } else {
            tracing::error!(error = %self, "Command failed");
        }
    }

    const fn is_server_error(&self) -> bool {
        match self {
            Self::Store(_) => true,
            Self::Backend(e) | Self::Checkout(CheckoutError::Backend(e)) => !e.is_rejection(),
            Self::Admin(e) => !e.is_client_error(),
            Self::Config(_) | Self::Checkout(_) | Self::Auth(_) | Self::Usage(_) => false,
        }
    }
}
