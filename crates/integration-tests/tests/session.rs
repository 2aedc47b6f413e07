//! Auth session lifecycle against the fake backend.
//!
//! Run with: cargo test -p fiat-parts-integration-tests

use fiat_parts_core::Identity;
use fiat_parts_integration_tests::{FakeBackend, Storefront};
use fiat_parts_storefront::backend::auth::SESSION_STORAGE_KEY;
use fiat_parts_storefront::local_store::LocalStore;
use fiat_parts_storefront::models::ProfileUpdate;
use fiat_parts_storefront::session::RegisterFields;
use secrecy::SecretString;

const EMAIL: &str = "giulia@officina.it";
const PASSWORD: &str = "correct-horse";

fn registration(email: &str, password: &str) -> RegisterFields {
    RegisterFields {
        email: email.to_string(),
        password: SecretString::from(password.to_string()),
        full_name: Some("Giulia Rossi".to_string()),
        phone: Some("+39 011 555 0101".to_string()),
    }
}

fn persisted_session(sf: &Storefront) -> Option<String> {
    sf.store
        .get(SESSION_STORAGE_KEY)
        .expect("Failed to read local store")
}

// ============================================================================
// Login & Logout
// ============================================================================

#[tokio::test]
async fn test_login_with_wrong_password() {
    let backend = FakeBackend::start().await;
    backend.add_user(EMAIL, PASSWORD);
    let sf = Storefront::open(&backend).await;

    let outcome = sf.login(EMAIL, "wrong-horse").await;
    assert!(!outcome.success);
    assert_eq!(outcome.error.as_deref(), Some("Invalid login credentials"));

    let snapshot = sf.session.snapshot();
    assert!(snapshot.user.is_none());
    assert!(!snapshot.loading);
    assert!(persisted_session(&sf).is_none());
}

#[tokio::test]
async fn test_login_loads_profile_and_persists_session() {
    let backend = FakeBackend::start().await;
    let user_id = backend.add_user(EMAIL, PASSWORD);
    let sf = Storefront::open(&backend).await;
    assert_eq!(sf.session.identity(), Identity::Anonymous);

    let outcome = sf.login(EMAIL, PASSWORD).await;
    assert!(outcome.success, "{:?}", outcome.error);
    assert_eq!(sf.session.identity().user_id().map(|id| id.as_str()), Some(user_id.as_str()));

    let profile = sf.profile().await.expect("Profile was not loaded");
    assert_eq!(profile.id.as_str(), user_id);
    assert!(persisted_session(&sf).is_some());

    // The next page load restores the same user
    let reloaded = sf.reopen().await;
    let snapshot = reloaded.session.snapshot();
    assert!(!snapshot.loading);
    assert_eq!(snapshot.user.map(|u| u.id.to_string()), Some(user_id));
}

#[tokio::test]
async fn test_logout_clears_persisted_session() {
    let backend = FakeBackend::start().await;
    backend.add_user(EMAIL, PASSWORD);
    let sf = Storefront::open(&backend).await;
    assert!(sf.login(EMAIL, PASSWORD).await.success);

    assert!(sf.session.logout().await.success);
    let snapshot = sf.session.snapshot();
    assert!(snapshot.user.is_none());
    assert!(snapshot.profile.is_none());
    assert!(persisted_session(&sf).is_none());

    let reloaded = sf.reopen().await;
    assert_eq!(reloaded.session.identity(), Identity::Anonymous);
}

#[tokio::test]
async fn test_logout_signs_out_locally_when_backend_fails() {
    let backend = FakeBackend::start().await;
    backend.add_user(EMAIL, PASSWORD);
    let sf = Storefront::open(&backend).await;
    assert!(sf.login(EMAIL, PASSWORD).await.success);

    backend.fail("auth");
    let outcome = sf.session.logout().await;
    assert!(!outcome.success);
    assert!(outcome.error.is_some());
    assert_eq!(sf.session.identity(), Identity::Anonymous);
    assert!(persisted_session(&sf).is_none());
}

// ============================================================================
// Registration
// ============================================================================

#[tokio::test]
async fn test_register_signs_in_with_profile_metadata() {
    let backend = FakeBackend::start().await;
    let sf = Storefront::open(&backend).await;

    let outcome = sf.session.register(registration(EMAIL, PASSWORD)).await;
    assert!(outcome.success, "{:?}", outcome.error);
    assert!(sf.session.identity().is_authenticated());

    let profile = sf.profile().await.expect("Profile was not loaded");
    assert_eq!(profile.full_name.as_deref(), Some("Giulia Rossi"));
    assert_eq!(profile.phone.as_deref(), Some("+39 011 555 0101"));
}

#[tokio::test]
async fn test_register_awaiting_confirmation_stays_signed_out() {
    let backend = FakeBackend::start().await;
    backend.require_confirmation(true);
    let sf = Storefront::open(&backend).await;

    let outcome = sf.session.register(registration(EMAIL, PASSWORD)).await;
    assert!(outcome.success);
    assert_eq!(sf.session.identity(), Identity::Anonymous);
    assert!(persisted_session(&sf).is_none());
}

#[tokio::test]
async fn test_register_existing_email_fails() {
    let backend = FakeBackend::start().await;
    backend.add_user(EMAIL, PASSWORD);
    let sf = Storefront::open(&backend).await;

    let outcome = sf.session.register(registration(EMAIL, PASSWORD)).await;
    assert!(!outcome.success);
    assert_eq!(outcome.error.as_deref(), Some("User already registered"));
}

#[tokio::test]
async fn test_register_short_password_rejected_locally() {
    let backend = FakeBackend::start().await;
    let sf = Storefront::open(&backend).await;
    backend.clear_requests();

    let outcome = sf.session.register(registration(EMAIL, "abc")).await;
    assert!(!outcome.success);
    assert!(backend.requests().is_empty());
}

// ============================================================================
// Session refresh
// ============================================================================

#[tokio::test]
async fn test_expiring_session_is_refreshed_on_reload() {
    let backend = FakeBackend::start().await;
    let user_id = backend.add_user(EMAIL, PASSWORD);
    backend.set_token_lifetime(30);
    let sf = Storefront::open(&backend).await;
    assert!(sf.login(EMAIL, PASSWORD).await.success);
    backend.clear_requests();

    let reloaded = sf.reopen().await;
    assert_eq!(
        reloaded.session.identity().user_id().map(|id| id.to_string()),
        Some(user_id)
    );
    assert!(
        backend
            .requests()
            .iter()
            .any(|r| r.path == "/auth/v1/token" && r.query.contains("grant_type=refresh_token")),
        "Expected a refresh token grant"
    );
}

#[tokio::test]
async fn test_revoked_refresh_token_signs_out_locally() {
    let backend = FakeBackend::start().await;
    backend.add_user(EMAIL, PASSWORD);
    backend.set_token_lifetime(30);
    let sf = Storefront::open(&backend).await;
    assert!(sf.login(EMAIL, PASSWORD).await.success);

    backend.revoke_tokens();
    let reloaded = sf.reopen().await;
    assert_eq!(reloaded.session.identity(), Identity::Anonymous);
    assert!(persisted_session(&reloaded).is_none());
}

// ============================================================================
// Profile
// ============================================================================

#[tokio::test]
async fn test_update_profile_merges_fields() {
    let backend = FakeBackend::start().await;
    let sf = Storefront::open(&backend).await;
    assert!(sf.session.register(registration(EMAIL, PASSWORD)).await.success);
    sf.profile().await.expect("Profile was not loaded");

    let outcome = sf
        .session
        .update_profile(ProfileUpdate {
            address: Some("Via Roma 1".to_string()),
            city: Some("Torino".to_string()),
            postal_code: Some("10121".to_string()),
            ..ProfileUpdate::default()
        })
        .await;
    assert!(outcome.success, "{:?}", outcome.error);

    let profile = sf.session.current_profile().expect("No profile");
    assert_eq!(profile.city.as_deref(), Some("Torino"));
    assert_eq!(profile.full_name.as_deref(), Some("Giulia Rossi"));

    let rows = backend.rows("profiles");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["address"], "Via Roma 1");
    assert_eq!(rows[0]["full_name"], "Giulia Rossi");
}

#[tokio::test]
async fn test_update_profile_requires_sign_in() {
    let backend = FakeBackend::start().await;
    let sf = Storefront::open(&backend).await;

    let outcome = sf
        .session
        .update_profile(ProfileUpdate {
            city: Some("Torino".to_string()),
            ..ProfileUpdate::default()
        })
        .await;
    assert!(!outcome.success);
    assert!(backend.rows("profiles").is_empty());
}
