//! Fiat Parts storefront library.
//!
//! Everything a storefront front end needs on top of the hosted backend: the
//! backend client, the auth session holder, the cart reconciler, cached
//! catalog reads, and checkout.
//!
//! # Wiring
//!
//! ```rust,ignore
//! let store: Arc<dyn LocalStore> = Arc::new(FileStore::open(&config.data_dir)?);
//! let client = BackendClient::new(&config.backend, Arc::clone(&store))?;
//! let session = SessionHolder::init(Arc::new(client.clone())).await;
//! let mut cart = CartService::new(&session, Arc::new(client.clone()), store).await;
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod backend;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod config;
pub mod error;
pub mod local_store;
pub mod models;
pub mod session;
