//! Wiring of the storefront services for one CLI invocation.

use std::sync::Arc;
use std::time::Duration;

use fiat_parts_admin::Admin;
use fiat_parts_core::{CurrencyCode, Price};
use fiat_parts_storefront::backend::BackendClient;
use fiat_parts_storefront::cart::CartService;
use fiat_parts_storefront::catalog::CatalogService;
use fiat_parts_storefront::checkout::CheckoutService;
use fiat_parts_storefront::config::StorefrontConfig;
use fiat_parts_storefront::local_store::{FileStore, LocalStore};
use fiat_parts_storefront::models::Profile;
use fiat_parts_storefront::session::SessionHolder;
use rust_decimal::Decimal;

use crate::error::AppError;

/// How long to wait for the profile fetch that follows session restore.
const PROFILE_WAIT: Duration = Duration::from_secs(5);

/// Services shared by every command.
///
/// Built in dependency order: local store, backend client, session holder.
/// The cart is built on demand from the session.
pub struct App {
    pub currency: CurrencyCode,
    pub store: Arc<dyn LocalStore>,
    pub client: BackendClient,
    pub session: SessionHolder,
    pub catalog: CatalogService,
}

impl App {
    /// Open the local store, connect the backend client, and resolve the
    /// session.
    ///
    /// # Errors
    ///
    /// Returns `AppError` if the data directory or HTTP client can't be set up.
    pub async fn init(config: &StorefrontConfig) -> Result<Self, AppError> {
        let store: Arc<dyn LocalStore> = Arc::new(FileStore::open(&config.data_dir)?);
        let client = BackendClient::new(&config.backend, Arc::clone(&store))?;
        let session = SessionHolder::init(Arc::new(client.clone())).await;
        let catalog = CatalogService::new(client.clone(), config.catalog_cache_ttl);

        tracing::debug!(
            data_dir = %config.data_dir.display(),
            identity = %session.identity(),
            "Storefront initialized"
        );

        Ok(Self {
            currency: config.currency,
            store,
            client,
            session,
            catalog,
        })
    }

    /// Cart for the current identity, loaded.
    pub async fn cart(&self) -> CartService {
        CartService::new(
            &self.session,
            Arc::new(self.client.clone()),
            Arc::clone(&self.store),
        )
        .await
    }

    #[must_use]
    pub fn checkout(&self) -> CheckoutService {
        CheckoutService::new(self.client.clone())
    }

    /// Admin handle for the signed-in user.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Admin` unless the user holds the admin role.
    pub async fn admin(&self) -> Result<Admin, AppError> {
        Ok(Admin::authorize(&self.session, self.client.clone(), self.catalog.clone()).await?)
    }

    /// The signed-in user's profile.
    ///
    /// The profile is fetched on a separate task after the session resolves,
    /// so this waits briefly for it to arrive.
    pub async fn profile(&self) -> Option<Profile> {
        let mut rx = self.session.subscribe();
        let settled = rx.wait_for(|s| s.profile.is_some() || s.user.is_none());
        tokio::time::timeout(PROFILE_WAIT, settled)
            .await
            .ok()
            .and_then(Result::ok)
            .and_then(|snapshot| snapshot.profile.clone())
    }

    /// Format an amount in the display currency.
    #[must_use]
    pub fn price(&self, amount: Decimal) -> String {
        Price::new(amount, self.currency).display()
    }
}
