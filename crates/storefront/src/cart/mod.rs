//! Cart reconciler.
//!
//! [`CartService`] is the single source of truth for the shopping cart. The
//! cart lives in the local store for anonymous shoppers and in `cart_items`
//! rows for signed-in ones; which one backs it follows the identity published
//! by the [`SessionHolder`].
//!
//! Mutations are optimistic: the local state changes first, then the matching
//! remote write is awaited. A failed remote write is logged and the local
//! change stands. There is no retry queue, so a failed write leaves the remote
//! cart out of date until the next successful write for that line.
//!
//! Switching identity reloads the cart wholesale from the new backing store.
//! A guest cart is not merged into the remote cart on login and is not erased
//! either, so logging out brings back whatever is still stored locally.

mod remote;

pub use remote::CartRemote;

use std::sync::Arc;

use fiat_parts_core::{
    AddOutcome, CartLine, CartState, Identity, NewCartItem, PartId, QuantityChange, UserId,
};
use rust_decimal::Decimal;
use tokio::sync::watch;
use tracing::instrument;

use crate::error::add_breadcrumb;
use crate::local_store::LocalStore;
use crate::session::{AuthSnapshot, SessionHolder};

/// Local store key for the guest cart blob.
pub const CART_STORAGE_KEY: &str = "cart";

/// Shopping cart backed by the local store or remote rows.
pub struct CartService {
    session: watch::Receiver<AuthSnapshot>,
    remote: Arc<dyn CartRemote>,
    store: Arc<dyn LocalStore>,
    identity: Identity,
    state: CartState,
}

impl std::fmt::Debug for CartService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CartService")
            .field("identity", &self.identity)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl CartService {
    /// Create the cart for the session's current identity and load it.
    pub async fn new(
        session: &SessionHolder,
        remote: Arc<dyn CartRemote>,
        store: Arc<dyn LocalStore>,
    ) -> Self {
        let mut receiver = session.subscribe();
        let identity = receiver.borrow_and_update().identity();
        let mut cart = Self {
            session: receiver,
            remote,
            store,
            identity: Identity::Anonymous,
            state: CartState::new(),
        };
        cart.load_for(identity).await;
        cart
    }

    /// Identity the cart is currently loaded for.
    #[must_use]
    pub const fn identity(&self) -> &Identity {
        &self.identity
    }

    #[must_use]
    pub const fn state(&self) -> &CartState {
        &self.state
    }

    #[must_use]
    pub fn lines(&self) -> &[CartLine] {
        self.state.lines()
    }

    /// Sum of quantities over all lines.
    #[must_use]
    pub fn item_count(&self) -> u64 {
        self.state.item_count()
    }

    /// Sum of unit price times quantity over all lines.
    #[must_use]
    pub fn total_price(&self) -> Decimal {
        self.state.total_price()
    }

    /// Reload if the session's identity changed since the last check.
    ///
    /// Returns `true` if the cart was reloaded. Every mutation calls this
    /// first so it is written to the store matching the current identity.
    pub async fn sync_identity(&mut self) -> bool {
        if !self.session.has_changed().unwrap_or(false) {
            return false;
        }
        let identity = self.session.borrow_and_update().identity();
        if identity == self.identity {
            return false;
        }
        self.load_for(identity).await;
        true
    }

    /// Wait for the next identity change and reload for it.
    ///
    /// Returns `None` once the session holder is gone.
    pub async fn identity_changed(&mut self) -> Option<Identity> {
        loop {
            self.session.changed().await.ok()?;
            let identity = self.session.borrow_and_update().identity();
            if identity != self.identity {
                self.load_for(identity.clone()).await;
                return Some(identity);
            }
        }
    }

    /// Reload the cart for the current identity.
    pub async fn reload(&mut self) {
        self.sync_identity().await;
        self.load_for(self.identity.clone()).await;
    }

    /// Add one unit of an item.
    #[instrument(skip(self, item), fields(part_id = %item.id, identity = %self.identity))]
    pub async fn add_item(&mut self, item: NewCartItem) {
        self.sync_identity().await;
        let part_id = item.id.clone();
        let outcome = self.state.add(item);
        add_breadcrumb("cart", "Added item", Some(&[("part_id", part_id.as_str())]));

        match self.identity.clone() {
            Identity::Anonymous => self.save_guest(),
            Identity::Authenticated(user_id) => {
                let result = match outcome {
                    AddOutcome::Inserted => self.remote.insert_line(&user_id, &part_id, 1).await,
                    AddOutcome::Incremented { quantity } => {
                        self.remote
                            .update_quantity(&user_id, &part_id, quantity)
                            .await
                    }
                };
                log_remote_failure("add", &user_id, result);
            }
        }
    }

    /// Remove a line.
    #[instrument(skip(self), fields(identity = %self.identity))]
    pub async fn remove_item(&mut self, part_id: &PartId) {
        self.sync_identity().await;
        if self.state.remove(part_id).is_some() {
            add_breadcrumb("cart", "Removed item", Some(&[("part_id", part_id.as_str())]));
        }

        match self.identity.clone() {
            Identity::Anonymous => self.save_guest(),
            Identity::Authenticated(user_id) => {
                let result = self.remote.delete_line(&user_id, part_id).await;
                log_remote_failure("remove", &user_id, result);
            }
        }
    }

    /// Set a line's quantity. Anything below 1 removes the line.
    #[instrument(skip(self), fields(identity = %self.identity))]
    pub async fn update_quantity(&mut self, part_id: &PartId, quantity: i64) {
        if quantity < 1 {
            self.remove_item(part_id).await;
            return;
        }

        self.sync_identity().await;
        let change = self.state.set_quantity(part_id, quantity);
        let QuantityChange::Updated(quantity) = change else {
            tracing::debug!(?change, "Quantity update for a part not in the cart");
            return;
        };

        match self.identity.clone() {
            Identity::Anonymous => self.save_guest(),
            Identity::Authenticated(user_id) => {
                let result = self
                    .remote
                    .update_quantity(&user_id, part_id, quantity)
                    .await;
                log_remote_failure("update quantity", &user_id, result);
            }
        }
    }

    /// Empty the cart.
    #[instrument(skip(self), fields(identity = %self.identity))]
    pub async fn clear(&mut self) {
        self.sync_identity().await;
        self.state.clear();
        add_breadcrumb("cart", "Cleared cart", None);

        match self.identity.clone() {
            Identity::Anonymous => self.save_guest(),
            Identity::Authenticated(user_id) => {
                let result = self.remote.delete_all(&user_id).await;
                log_remote_failure("clear", &user_id, result);
            }
        }
    }

    async fn load_for(&mut self, identity: Identity) {
        self.state = match &identity {
            Identity::Anonymous => self.load_guest(),
            Identity::Authenticated(user_id) => match self.remote.fetch_cart(user_id).await {
                Ok(lines) => CartState::from_lines(lines),
                Err(e) => {
                    tracing::error!(error = %e, user_id = %user_id, "Failed to load cart");
                    CartState::new()
                }
            },
        };
        tracing::debug!(
            identity = %identity,
            lines = self.state.len(),
            "Cart loaded"
        );
        self.identity = identity;
    }

    fn load_guest(&self) -> CartState {
        let blob = match self.store.get(CART_STORAGE_KEY) {
            Ok(Some(blob)) => blob,
            Ok(None) => return CartState::new(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read guest cart");
                return CartState::new();
            }
        };
        CartState::from_json(&blob).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Guest cart is unreadable; starting empty");
            CartState::new()
        })
    }

    fn save_guest(&self) {
        let result = self
            .state
            .to_json()
            .map_err(|e| e.to_string())
            .and_then(|json| {
                self.store
                    .set(CART_STORAGE_KEY, &json)
                    .map_err(|e| e.to_string())
            });
        if let Err(e) = result {
            tracing::warn!(error = %e, "Failed to save guest cart");
        }
    }
}

fn log_remote_failure(
    operation: &str,
    user_id: &UserId,
    result: Result<(), crate::backend::BackendError>,
) {
    if let Err(e) = result {
        tracing::warn!(
            error = %e,
            user_id = %user_id,
            operation,
            "Remote cart write failed; keeping local change"
        );
    }
}
