//! Authentication and profile types.

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use fiat_parts_core::UserId;

/// The authenticated principal as reported by the auth service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: UserId,
    #[serde(default)]
    pub email: Option<String>,
}

/// A live auth session.
///
/// Implements `Debug` manually to redact tokens.
#[derive(Clone)]
pub struct AuthSession {
    pub access_token: SecretString,
    pub refresh_token: SecretString,
    pub expires_at: DateTime<Utc>,
    pub user: AuthUser,
}

impl AuthSession {
    /// Whether the access token expires within `leeway` of `now`.
    #[must_use]
    pub fn expires_within(&self, now: DateTime<Utc>, leeway: chrono::Duration) -> bool {
        self.expires_at <= now + leeway
    }
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("user", &self.user)
            .finish()
    }
}

/// Kind of auth state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEventKind {
    /// Session restored from storage at startup.
    InitialSession,
    SignedIn,
    SignedOut,
    TokenRefreshed,
}

/// An auth state change, carrying the session that is current after it.
#[derive(Debug, Clone)]
pub struct AuthEvent {
    pub kind: AuthEventKind,
    pub session: Option<AuthSession>,
}

/// Extra fields stored with a new account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SignUpMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// A user's profile row (`profiles`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: UserId,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
}

/// Partial update to a profile. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
}

impl ProfileUpdate {
    /// Returns `true` if no field is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.full_name.is_none()
            && self.phone.is_none()
            && self.address.is_none()
            && self.city.is_none()
            && self.postal_code.is_none()
    }

    /// Apply the set fields to a profile.
    pub fn apply_to(&self, profile: &mut Profile) {
        if let Some(v) = &self.full_name {
            profile.full_name = Some(v.clone());
        }
        if let Some(v) = &self.phone {
            profile.phone = Some(v.clone());
        }
        if let Some(v) = &self.address {
            profile.address = Some(v.clone());
        }
        if let Some(v) = &self.city {
            profile.city = Some(v.clone());
        }
        if let Some(v) = &self.postal_code {
            profile.postal_code = Some(v.clone());
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;

    #[test]
    fn test_session_debug_redacts_tokens() {
        let session = AuthSession {
            access_token: SecretString::from("access-abc123"),
            refresh_token: SecretString::from("refresh-def456"),
            expires_at: Utc::now(),
            user: AuthUser {
                id: UserId::new("u-1"),
                email: Some("marco@officina.it".to_string()),
            },
        };

        let debug = format!("{session:?}");
        assert!(!debug.contains("access-abc123"));
        assert!(!debug.contains("refresh-def456"));
        assert!(debug.contains("u-1"));
        assert_eq!(session.access_token.expose_secret(), "access-abc123");
    }

    #[test]
    fn test_profile_update_only_serializes_set_fields() {
        let update = ProfileUpdate {
            city: Some("Torino".to_string()),
            ..ProfileUpdate::default()
        };
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json, serde_json::json!({"city": "Torino"}));
        assert!(!update.is_empty());
        assert!(ProfileUpdate::default().is_empty());
    }

    #[test]
    fn test_profile_update_apply() {
        let mut profile = Profile {
            id: UserId::new("u-1"),
            full_name: Some("Marco Rossi".to_string()),
            phone: None,
            address: None,
            city: Some("Milano".to_string()),
            postal_code: None,
        };
        ProfileUpdate {
            city: Some("Torino".to_string()),
            phone: Some("+39 011 555".to_string()),
            ..ProfileUpdate::default()
        }
        .apply_to(&mut profile);

        assert_eq!(profile.full_name.as_deref(), Some("Marco Rossi"));
        assert_eq!(profile.city.as_deref(), Some("Torino"));
        assert_eq!(profile.phone.as_deref(), Some("+39 011 555"));
    }
}
