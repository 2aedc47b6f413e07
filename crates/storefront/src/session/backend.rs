//! Auth seam between the session holder and the backend.

use async_trait::async_trait;
use fiat_parts_core::{Email, UserId};
use secrecy::SecretString;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::backend::{BackendClient, BackendError, Query, SignUpOutcome};
use crate::models::{AuthEvent, AuthSession, Profile, ProfileUpdate, SignUpMetadata};

/// What the session holder needs from the auth service.
#[async_trait]
pub trait AuthBackend: Send + Sync + 'static {
    /// Subscribe to auth state changes.
    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;

    /// The current session, restoring or refreshing it as needed.
    async fn current_session(&self) -> Result<Option<AuthSession>, BackendError>;

    async fn sign_in(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<AuthSession, BackendError>;

    async fn sign_up(
        &self,
        email: &Email,
        password: &SecretString,
        metadata: &SignUpMetadata,
    ) -> Result<SignUpOutcome, BackendError>;

    async fn sign_out(&self) -> Result<(), BackendError>;

    async fn fetch_profile(&self, user_id: &UserId) -> Result<Option<Profile>, BackendError>;

    /// Write the set fields of `update` and return the stored profile.
    async fn save_profile(
        &self,
        user_id: &UserId,
        update: &ProfileUpdate,
    ) -> Result<Profile, BackendError>;
}

#[derive(Serialize)]
struct ProfileUpsert<'a> {
    id: &'a UserId,
    #[serde(flatten)]
    update: &'a ProfileUpdate,
}

#[async_trait]
impl AuthBackend for BackendClient {
    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        Self::subscribe(self)
    }

    async fn current_session(&self) -> Result<Option<AuthSession>, BackendError> {
        Self::current_session(self).await
    }

    async fn sign_in(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<AuthSession, BackendError> {
        self.sign_in_with_password(email, password).await
    }

    async fn sign_up(
        &self,
        email: &Email,
        password: &SecretString,
        metadata: &SignUpMetadata,
    ) -> Result<SignUpOutcome, BackendError> {
        Self::sign_up(self, email, password, metadata).await
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        Self::sign_out(self).await
    }

    async fn fetch_profile(&self, user_id: &UserId) -> Result<Option<Profile>, BackendError> {
        self.select_one("profiles", &Query::new().select("*").eq("id", user_id))
            .await
    }

    async fn save_profile(
        &self,
        user_id: &UserId,
        update: &ProfileUpdate,
    ) -> Result<Profile, BackendError> {
        let rows: Vec<Profile> = self
            .upsert_returning(
                "profiles",
                &ProfileUpsert {
                    id: user_id,
                    update,
                },
            )
            .await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| BackendError::NotFound(format!("Profile {user_id}")))
    }
}
