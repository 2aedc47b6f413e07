//! Client for the hosted backend.
//!
//! # Architecture
//!
//! One [`BackendClient`] covers the three services the storefront uses:
//!
//! - REST tables under `/rest/v1/{table}` ([`rest`])
//! - token auth under `/auth/v1` ([`auth`])
//! - object storage under `/storage/v1` ([`storage`])
//!
//! Every request carries the public API key in `apikey` and a bearer token:
//! the session's access token when signed in, the API key otherwise. The
//! backend is the source of truth; nothing is synced locally except the auth
//! session, which is persisted so the next process can resume it.
//!
//! # Example
//!
//! ```rust,ignore
//! use fiat_parts_storefront::backend::{BackendClient, Query};
//!
//! let client = BackendClient::new(&config.backend, store)?;
//! let parts: Vec<Part> = client
//!     .select("parts", &Query::new().select("*").eq("is_active", true))
//!     .await?;
//! ```

pub mod auth;
pub mod query;
pub mod rest;
pub mod storage;

pub use auth::SignUpOutcome;
pub use query::{Direction, Query};

use std::sync::Arc;

use reqwest::{Method, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::sync::{RwLock, broadcast};
use url::Url;

use crate::config::BackendConfig;
use crate::local_store::LocalStore;
use crate::models::{AuthEvent, AuthSession};

/// Capacity of the auth event channel. Slow subscribers that fall further
/// behind see `RecvError::Lagged`.
const AUTH_EVENT_CAPACITY: usize = 16;

/// Longest response body excerpt written to logs.
const LOG_BODY_LIMIT: usize = 500;

/// Errors that can occur when talking to the backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered with an error status.
    #[error("Backend error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Credentials rejected or session missing.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Rate limited by the backend.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// An endpoint URL could not be built.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// An update or delete without any row filter.
    #[error("Refusing unfiltered {operation} on {table}")]
    UnfilteredWrite {
        operation: &'static str,
        table: String,
    },
}

impl BackendError {
    /// Message suitable for showing to a shopper.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Api { message, .. } | Self::Unauthorized(message) => message.clone(),
            Self::RateLimited(secs) => {
                format!("Too many attempts. Please wait {secs} seconds and try again.")
            }
            Self::Http(_) => "Could not reach the server. Please try again.".to_string(),
            Self::NotFound(what) => format!("{what} not found"),
            Self::Parse(_) | Self::InvalidUrl(_) | Self::UnfilteredWrite { .. } => {
                "Something went wrong. Please try again.".to_string()
            }
        }
    }

    /// Whether the backend rejected the request itself (4xx), as opposed to
    /// a transport or server failure.
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        match self {
            Self::Api { status, .. } => *status >= 400 && *status < 500,
            Self::Unauthorized(_) | Self::NotFound(_) => true,
            _ => false,
        }
    }
}

// =============================================================================
// BackendClient
// =============================================================================

/// Client for the hosted backend. Cheap to clone.
#[derive(Clone)]
pub struct BackendClient {
    inner: Arc<BackendClientInner>,
}

struct BackendClientInner {
    http: reqwest::Client,
    base_url: Url,
    anon_key: SecretString,
    storage_bucket: String,
    session: RwLock<SessionSlot>,
    events: broadcast::Sender<AuthEvent>,
    store: Arc<dyn LocalStore>,
}

/// In-memory session plus whether the persisted one has been read yet.
#[derive(Default)]
struct SessionSlot {
    session: Option<AuthSession>,
    restored: bool,
}

impl std::fmt::Debug for BackendClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendClient")
            .field("base_url", &self.inner.base_url.as_str())
            .field("storage_bucket", &self.inner.storage_bucket)
            .finish_non_exhaustive()
    }
}

impl BackendClient {
    /// Create a client.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Http` if the HTTP client cannot be built.
    pub fn new(config: &BackendConfig, store: Arc<dyn LocalStore>) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("fiat-parts/", env!("CARGO_PKG_VERSION")))
            .build()?;

        // Url::join drops the last path segment unless the base ends in '/'.
        let mut base_url = config.url.clone();
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let (events, _) = broadcast::channel(AUTH_EVENT_CAPACITY);

        Ok(Self {
            inner: Arc::new(BackendClientInner {
                http,
                base_url,
                anon_key: config.anon_key.clone(),
                storage_bucket: config.storage_bucket.clone(),
                session: RwLock::new(SessionSlot::default()),
                events,
                store,
            }),
        })
    }

    /// Base URL all endpoints hang off.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    /// Bucket configured for part images.
    #[must_use]
    pub fn storage_bucket(&self) -> &str {
        &self.inner.storage_bucket
    }

    fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        Ok(self.inner.base_url.join(path)?)
    }

    /// Start a request with the API key and the current bearer token.
    async fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let token = {
            let slot = self.inner.session.read().await;
            slot.session.as_ref().map_or_else(
                || self.inner.anon_key.expose_secret().to_string(),
                |s| s.access_token.expose_secret().to_string(),
            )
        };
        self.request_with_token(method, url, &token)
    }

    fn request_with_token(&self, method: Method, url: Url, token: &str) -> RequestBuilder {
        self.inner
            .http
            .request(method, url)
            .header("apikey", self.inner.anon_key.expose_secret())
            .bearer_auth(token)
    }

    /// Send a request and return the body of a successful response.
    async fn execute(&self, request: RequestBuilder) -> Result<String, BackendError> {
        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(BackendError::RateLimited(retry_after));
        }

        // Body as text first for better error diagnostics
        let body = response.text().await?;

        if status.is_success() {
            return Ok(body);
        }

        let message = error_message(&body).unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        });

        if status.is_server_error() {
            tracing::error!(
                status = %status,
                body = %truncate(&body, LOG_BODY_LIMIT),
                "Backend returned server error"
            );
        } else {
            tracing::debug!(
                status = %status,
                body = %truncate(&body, LOG_BODY_LIMIT),
                "Backend rejected request"
            );
        }

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(BackendError::Unauthorized(message))
            }
            StatusCode::NOT_FOUND => Err(BackendError::NotFound(message)),
            _ => Err(BackendError::Api {
                status: status.as_u16(),
                message,
            }),
        }
    }

    /// Execute and parse a JSON response body.
    async fn execute_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, BackendError> {
        let body = self.execute(request).await?;
        parse_body(&body)
    }

    fn broadcast(&self, event: AuthEvent) {
        // No receivers is fine
        let _ = self.inner.events.send(event);
    }
}

fn parse_body<T: DeserializeOwned>(body: &str) -> Result<T, BackendError> {
    serde_json::from_str(body).map_err(|e| {
        tracing::error!(
            error = %e,
            body = %truncate(body, LOG_BODY_LIMIT),
            "Failed to parse backend response"
        );
        BackendError::Parse(e)
    })
}

/// Pull a human-readable message out of a backend error body.
///
/// The REST, auth, and storage services each shape errors differently.
fn error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    ["error_description", "msg", "message", "error"]
        .iter()
        .find_map(|key| value.get(*key).and_then(serde_json::Value::as_str))
        .map(str::to_string)
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
