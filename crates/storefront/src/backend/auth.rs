//! Token auth: password sign-in, sign-up, sign-out, and session refresh.
//!
//! The current session lives in the client and is mirrored to the local
//! store under [`SESSION_STORAGE_KEY`]. Every change is announced on a
//! broadcast channel as an [`AuthEvent`]; events are sent only after the
//! session lock has been released so subscribers may call back into the
//! client.

use chrono::{DateTime, Utc};
use fiat_parts_core::Email;
use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::instrument;

use super::{BackendClient, BackendError, parse_body};
use crate::models::{AuthEvent, AuthEventKind, AuthSession, AuthUser, SignUpMetadata};

/// Local store key for the persisted session.
pub const SESSION_STORAGE_KEY: &str = "auth-session";

/// Sessions expiring sooner than this are refreshed before use.
const REFRESH_LEEWAY_SECS: i64 = 60;

/// Result of a sign-up.
#[derive(Debug, Clone)]
pub enum SignUpOutcome {
    /// The account is active and signed in.
    SignedIn(AuthSession),
    /// The account exists but the email address must be confirmed first.
    ConfirmationRequired(AuthUser),
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
    #[serde(default)]
    expires_at: Option<i64>,
    user: AuthUser,
}

impl TokenResponse {
    fn into_session(self) -> AuthSession {
        let expires_at = self
            .expires_at
            .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))
            .unwrap_or_else(|| Utc::now() + chrono::Duration::seconds(self.expires_in));
        AuthSession {
            access_token: SecretString::from(self.access_token),
            refresh_token: SecretString::from(self.refresh_token),
            expires_at,
            user: self.user,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SignUpResponse {
    Session(TokenResponse),
    User(AuthUser),
}

#[derive(Serialize)]
struct PasswordGrant<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RefreshGrant<'a> {
    refresh_token: &'a str,
}

#[derive(Serialize)]
struct SignUpRequest<'a> {
    email: &'a str,
    password: &'a str,
    data: &'a SignUpMetadata,
}

/// On-disk form of a session.
#[derive(Serialize, Deserialize)]
struct StoredSession {
    access_token: String,
    refresh_token: String,
    expires_at: DateTime<Utc>,
    user: AuthUser,
}

impl From<&AuthSession> for StoredSession {
    fn from(session: &AuthSession) -> Self {
        Self {
            access_token: session.access_token.expose_secret().to_string(),
            refresh_token: session.refresh_token.expose_secret().to_string(),
            expires_at: session.expires_at,
            user: session.user.clone(),
        }
    }
}

impl From<StoredSession> for AuthSession {
    fn from(stored: StoredSession) -> Self {
        Self {
            access_token: SecretString::from(stored.access_token),
            refresh_token: SecretString::from(stored.refresh_token),
            expires_at: stored.expires_at,
            user: stored.user,
        }
    }
}

impl BackendClient {
    /// Subscribe to auth state changes.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.inner.events.subscribe()
    }

    /// Sign in with email and password.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Unauthorized` or `BackendError::Api` when the
    /// credentials are rejected, or any transport failure.
    #[instrument(skip(self, email, password), fields(email_domain = %email.domain()))]
    pub async fn sign_in_with_password(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<AuthSession, BackendError> {
        let url = self.endpoint("auth/v1/token")?;
        let request = self
            .request_with_token(Method::POST, url, self.inner.anon_key.expose_secret())
            .query(&[("grant_type", "password")])
            .json(&PasswordGrant {
                email: email.as_str(),
                password: password.expose_secret(),
            });
        let token: TokenResponse = self.execute_json(request).await?;
        let session = token.into_session();

        self.replace_session(Some(session.clone())).await;
        tracing::info!(user_id = %session.user.id, "Signed in");
        self.broadcast(AuthEvent {
            kind: AuthEventKind::SignedIn,
            session: Some(session.clone()),
        });
        Ok(session)
    }

    /// Create an account. Signs in immediately when the backend does not
    /// require email confirmation.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if the backend rejects the registration.
    #[instrument(skip(self, email, password, metadata), fields(email_domain = %email.domain()))]
    pub async fn sign_up(
        &self,
        email: &Email,
        password: &SecretString,
        metadata: &SignUpMetadata,
    ) -> Result<SignUpOutcome, BackendError> {
        let url = self.endpoint("auth/v1/signup")?;
        let request = self
            .request_with_token(Method::POST, url, self.inner.anon_key.expose_secret())
            .json(&SignUpRequest {
                email: email.as_str(),
                password: password.expose_secret(),
                data: metadata,
            });
        let response: SignUpResponse = self.execute_json(request).await?;

        match response {
            SignUpResponse::Session(token) => {
                let session = token.into_session();
                self.replace_session(Some(session.clone())).await;
                tracing::info!(user_id = %session.user.id, "Signed up and signed in");
                self.broadcast(AuthEvent {
                    kind: AuthEventKind::SignedIn,
                    session: Some(session.clone()),
                });
                Ok(SignUpOutcome::SignedIn(session))
            }
            SignUpResponse::User(user) => {
                tracing::info!(user_id = %user.id, "Signed up, confirmation pending");
                Ok(SignUpOutcome::ConfirmationRequired(user))
            }
        }
    }

    /// Sign out.
    ///
    /// The local session is dropped and `SignedOut` is announced even when
    /// the remote call fails; the remote error is still returned.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if the backend could not revoke the session.
    #[instrument(skip(self))]
    pub async fn sign_out(&self) -> Result<(), BackendError> {
        let previous = {
            let mut slot = self.inner.session.write().await;
            slot.restored = true;
            slot.session.take()
        };
        self.persist_session(None);

        let result = match &previous {
            Some(session) => {
                let url = self.endpoint("auth/v1/logout")?;
                let request = self.request_with_token(
                    Method::POST,
                    url,
                    session.access_token.expose_secret(),
                );
                self.execute(request).await.map(drop)
            }
            None => Ok(()),
        };

        if let Err(e) = &result {
            tracing::warn!(error = %e, "Remote sign-out failed; local session cleared");
        }
        self.broadcast(AuthEvent {
            kind: AuthEventKind::SignedOut,
            session: None,
        });
        result
    }

    /// The current session, if any.
    ///
    /// The first call restores the persisted session and announces
    /// `InitialSession`. A session close to expiry is refreshed first; if the
    /// backend rejects the refresh token the session is dropped and
    /// `SignedOut` is announced.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if a needed refresh fails for reasons other than
    /// a rejected token.
    #[instrument(skip(self))]
    pub async fn current_session(&self) -> Result<Option<AuthSession>, BackendError> {
        let (session, first_read) = {
            let mut slot = self.inner.session.write().await;
            let first_read = !slot.restored;
            if first_read {
                slot.restored = true;
                slot.session = self.load_persisted_session();
            }
            (slot.session.clone(), first_read)
        };

        if first_read {
            self.broadcast(AuthEvent {
                kind: AuthEventKind::InitialSession,
                session: session.clone(),
            });
        }

        let Some(session) = session else {
            return Ok(None);
        };

        let leeway = chrono::Duration::seconds(REFRESH_LEEWAY_SECS);
        if !session.expires_within(Utc::now(), leeway) {
            return Ok(Some(session));
        }

        match self.refresh(&session.refresh_token).await {
            Ok(refreshed) => {
                self.replace_session(Some(refreshed.clone())).await;
                tracing::debug!(user_id = %refreshed.user.id, "Session refreshed");
                self.broadcast(AuthEvent {
                    kind: AuthEventKind::TokenRefreshed,
                    session: Some(refreshed.clone()),
                });
                Ok(Some(refreshed))
            }
            Err(e) if e.is_rejection() => {
                tracing::info!(error = %e, "Refresh token rejected; signing out locally");
                self.replace_session(None).await;
                self.broadcast(AuthEvent {
                    kind: AuthEventKind::SignedOut,
                    session: None,
                });
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn refresh(&self, refresh_token: &SecretString) -> Result<AuthSession, BackendError> {
        let url = self.endpoint("auth/v1/token")?;
        let request = self
            .request_with_token(Method::POST, url, self.inner.anon_key.expose_secret())
            .query(&[("grant_type", "refresh_token")])
            .json(&RefreshGrant {
                refresh_token: refresh_token.expose_secret(),
            });
        let token: TokenResponse = self.execute_json(request).await?;
        Ok(token.into_session())
    }

    async fn replace_session(&self, session: Option<AuthSession>) {
        self.persist_session(session.as_ref());
        let mut slot = self.inner.session.write().await;
        slot.restored = true;
        slot.session = session;
    }

    /// Mirror the session to the local store. Failures only cost the next
    /// process its resumed session, so they are logged rather than returned.
    fn persist_session(&self, session: Option<&AuthSession>) {
        let result = match session {
            Some(session) => match serde_json::to_string(&StoredSession::from(session)) {
                Ok(json) => self.inner.store.set(SESSION_STORAGE_KEY, &json),
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to serialize session");
                    return;
                }
            },
            None => self.inner.store.remove(SESSION_STORAGE_KEY),
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, "Failed to persist session");
        }
    }

    fn load_persisted_session(&self) -> Option<AuthSession> {
        let raw = match self.inner.store.get(SESSION_STORAGE_KEY) {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read persisted session");
                return None;
            }
        };
        match parse_body::<StoredSession>(&raw) {
            Ok(stored) => Some(stored.into()),
            Err(_) => {
                tracing::warn!("Discarding unreadable persisted session");
                None
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_token_response_prefers_absolute_expiry() {
        let token: TokenResponse = serde_json::from_value(serde_json::json!({
            "access_token": "a",
            "refresh_token": "r",
            "expires_in": 3600,
            "expires_at": 1_900_000_000,
            "token_type": "bearer",
            "user": {"id": "u-1", "email": "marco@officina.it"}
        }))
        .unwrap();
        let session = token.into_session();
        assert_eq!(session.expires_at.timestamp(), 1_900_000_000);
        assert_eq!(session.user.id.as_str(), "u-1");
    }

    #[test]
    fn test_sign_up_response_variants() {
        let user_only: SignUpResponse =
            serde_json::from_value(serde_json::json!({"id": "u-2", "email": "a@b.it"})).unwrap();
        assert!(matches!(user_only, SignUpResponse::User(_)));

        let with_session: SignUpResponse = serde_json::from_value(serde_json::json!({
            "access_token": "a",
            "refresh_token": "r",
            "expires_in": 3600,
            "user": {"id": "u-2"}
        }))
        .unwrap();
        assert!(matches!(with_session, SignUpResponse::Session(_)));
    }

    #[test]
    fn test_stored_session_round_trip() {
        let session = AuthSession {
            access_token: SecretString::from("a"),
            refresh_token: SecretString::from("r"),
            expires_at: DateTime::<Utc>::from_timestamp(1_900_000_000, 0).unwrap(),
            user: AuthUser {
                id: "u-1".into(),
                email: None,
            },
        };
        let json = serde_json::to_string(&StoredSession::from(&session)).unwrap();
        let restored: AuthSession = serde_json::from_str::<StoredSession>(&json).unwrap().into();
        assert_eq!(restored.refresh_token.expose_secret(), "r");
        assert_eq!(restored.expires_at, session.expires_at);
        assert_eq!(restored.user, session.user);
    }
}
