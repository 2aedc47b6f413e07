//! Auth session holder.
//!
//! [`SessionHolder`] owns the signed-in user, their profile, and the live
//! session, and publishes every change on a `watch` channel. The cart service
//! and anything else that depends on identity subscribes to it.
//!
//! # Initialization
//!
//! [`SessionHolder::init`] subscribes to the backend's auth events first and
//! only then asks for the current session, so no change between the two is
//! missed. Both paths write the same state. Profile lookups triggered by a
//! session change run on a separately spawned task after a scheduler yield,
//! never inline in the event handler, and their result is dropped if a
//! different user is signed in by the time it arrives.
//!
//! # Operations
//!
//! `login`, `register`, `logout`, and `update_profile` never fail: they
//! return an [`AuthOutcome`] carrying a human-readable message instead.

mod backend;

pub use backend::AuthBackend;

use std::sync::{Arc, Mutex};

use fiat_parts_core::{Email, Identity, UserId};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::instrument;

use crate::backend::SignUpOutcome;
use crate::error::{add_breadcrumb, clear_sentry_user, set_sentry_user};
use crate::models::{AuthEvent, AuthSession, AuthUser, Profile, ProfileUpdate, SignUpMetadata};

/// Shortest password accepted at registration.
pub const MIN_PASSWORD_LENGTH: usize = 6;

/// Auth state as seen by dependents.
#[derive(Debug, Clone, Default)]
pub struct AuthSnapshot {
    pub user: Option<AuthUser>,
    pub profile: Option<Profile>,
    pub session: Option<AuthSession>,
    /// `true` until the initial session lookup has finished.
    pub loading: bool,
}

impl AuthSnapshot {
    /// Identity derived from the signed-in user.
    #[must_use]
    pub fn identity(&self) -> Identity {
        Identity::from(self.user.as_ref().map(|user| user.id.clone()))
    }

    fn user_id(&self) -> Option<&UserId> {
        self.user.as_ref().map(|user| &user.id)
    }
}

/// Result of an auth operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthOutcome {
    pub success: bool,
    pub error: Option<String>,
}

impl AuthOutcome {
    #[must_use]
    pub const fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
        }
    }
}

/// Registration form input.
#[derive(Debug, Clone)]
pub struct RegisterFields {
    pub email: String,
    pub password: SecretString,
    pub full_name: Option<String>,
    pub phone: Option<String>,
}

type StateTx = Arc<watch::Sender<AuthSnapshot>>;

/// Holder of the current auth session. Cheap to clone; the event listener
/// stops when the last clone is dropped.
#[derive(Clone)]
pub struct SessionHolder {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    backend: Arc<dyn AuthBackend>,
    state: StateTx,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        let handle = self
            .listener
            .get_mut()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for SessionHolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHolder")
            .field("state", &*self.inner.state.borrow())
            .finish_non_exhaustive()
    }
}

impl SessionHolder {
    /// Subscribe to auth events, then resolve the current session.
    ///
    /// A failed session lookup leaves the holder signed out (and logs the
    /// failure) rather than returning an error.
    #[instrument(skip(backend))]
    pub async fn init(backend: Arc<dyn AuthBackend>) -> Self {
        let (tx, _) = watch::channel(AuthSnapshot {
            loading: true,
            ..AuthSnapshot::default()
        });
        let state: StateTx = Arc::new(tx);

        let events = backend.subscribe();
        let listener = tokio::spawn(listen(events, Arc::clone(&backend), Arc::clone(&state)));

        match backend.current_session().await {
            Ok(session) => apply_session(&backend, &state, session),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to resolve current session");
                state.send_modify(|snapshot| snapshot.loading = false);
            }
        }

        Self {
            inner: Arc::new(SessionInner {
                backend,
                state,
                listener: Mutex::new(Some(listener)),
            }),
        }
    }

    /// Receiver that sees every state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AuthSnapshot> {
        self.inner.state.subscribe()
    }

    /// Copy of the current state.
    #[must_use]
    pub fn snapshot(&self) -> AuthSnapshot {
        self.inner.state.borrow().clone()
    }

    #[must_use]
    pub fn identity(&self) -> Identity {
        self.inner.state.borrow().identity()
    }

    #[must_use]
    pub fn current_user(&self) -> Option<AuthUser> {
        self.inner.state.borrow().user.clone()
    }

    #[must_use]
    pub fn current_profile(&self) -> Option<Profile> {
        self.inner.state.borrow().profile.clone()
    }

    /// Sign in with email and password.
    #[instrument(skip(self, email, password))]
    pub async fn login(&self, email: &str, password: &SecretString) -> AuthOutcome {
        let email = match Email::parse(email) {
            Ok(email) => email,
            Err(e) => return AuthOutcome::failure(e.to_string()),
        };
        if password.expose_secret().is_empty() {
            return AuthOutcome::failure("Password is required");
        }

        match self.inner.backend.sign_in(&email, password).await {
            Ok(session) => {
                self.signed_in(session);
                AuthOutcome::ok()
            }
            Err(e) => {
                tracing::warn!(error = %e, "Login failed");
                AuthOutcome::failure(e.user_message())
            }
        }
    }

    /// Create an account.
    ///
    /// Succeeds without signing in when the backend requires the email
    /// address to be confirmed first.
    #[instrument(skip(self, fields))]
    pub async fn register(&self, fields: RegisterFields) -> AuthOutcome {
        let email = match Email::parse(&fields.email) {
            Ok(email) => email,
            Err(e) => return AuthOutcome::failure(e.to_string()),
        };
        if fields.password.expose_secret().chars().count() < MIN_PASSWORD_LENGTH {
            return AuthOutcome::failure(format!(
                "Password must be at least {MIN_PASSWORD_LENGTH} characters"
            ));
        }

        let metadata = SignUpMetadata {
            full_name: fields.full_name.filter(|s| !s.trim().is_empty()),
            phone: fields.phone.filter(|s| !s.trim().is_empty()),
        };

        match self
            .inner
            .backend
            .sign_up(&email, &fields.password, &metadata)
            .await
        {
            Ok(SignUpOutcome::SignedIn(session)) => {
                self.signed_in(session);
                AuthOutcome::ok()
            }
            Ok(SignUpOutcome::ConfirmationRequired(user)) => {
                tracing::info!(user_id = %user.id, "Registration awaiting email confirmation");
                AuthOutcome::ok()
            }
            Err(e) => {
                tracing::warn!(error = %e, "Registration failed");
                AuthOutcome::failure(e.user_message())
            }
        }
    }

    /// Sign out. Local state is cleared even when the backend call fails.
    #[instrument(skip(self))]
    pub async fn logout(&self) -> AuthOutcome {
        let result = self.inner.backend.sign_out().await;
        apply_session(&self.inner.backend, &self.inner.state, None);
        clear_sentry_user();
        add_breadcrumb("auth", "Signed out", None);

        match result {
            Ok(()) => AuthOutcome::ok(),
            Err(e) => AuthOutcome::failure(e.user_message()),
        }
    }

    /// Update the signed-in user's profile.
    #[instrument(skip(self, update))]
    pub async fn update_profile(&self, update: ProfileUpdate) -> AuthOutcome {
        let Some(user_id) = self.inner.state.borrow().user_id().cloned() else {
            return AuthOutcome::failure("You must be signed in to update your profile");
        };
        if update.is_empty() {
            return AuthOutcome::ok();
        }

        match self.inner.backend.save_profile(&user_id, &update).await {
            Ok(profile) => {
                self.inner.state.send_if_modified(|snapshot| {
                    if snapshot.user_id() == Some(&user_id) {
                        snapshot.profile = Some(profile);
                        true
                    } else {
                        false
                    }
                });
                AuthOutcome::ok()
            }
            Err(e) => {
                tracing::warn!(error = %e, user_id = %user_id, "Profile update failed");
                AuthOutcome::failure(e.user_message())
            }
        }
    }

    fn signed_in(&self, session: AuthSession) {
        set_sentry_user(&session.user.id, session.user.email.as_deref());
        add_breadcrumb("auth", "Signed in", None);
        apply_session(&self.inner.backend, &self.inner.state, Some(session));
    }
}

/// Write a session into the state and schedule a profile fetch if the user
/// changed.
fn apply_session(backend: &Arc<dyn AuthBackend>, state: &StateTx, session: Option<AuthSession>) {
    let user = session.as_ref().map(|s| s.user.clone());
    let mut user_changed = false;

    state.send_modify(|snapshot| {
        user_changed = snapshot.user_id() != user.as_ref().map(|u| &u.id);
        if user_changed {
            snapshot.profile = None;
        }
        snapshot.user.clone_from(&user);
        snapshot.session = session;
        snapshot.loading = false;
    });

    if user_changed && let Some(user) = user {
        schedule_profile_fetch(Arc::clone(backend), Arc::clone(state), user.id);
    }
}

fn schedule_profile_fetch(backend: Arc<dyn AuthBackend>, state: StateTx, user_id: UserId) {
    tokio::spawn(async move {
        // Let the event that triggered this finish before calling back into
        // the auth client.
        tokio::task::yield_now().await;

        match backend.fetch_profile(&user_id).await {
            Ok(profile) => {
                state.send_if_modified(|snapshot| {
                    if snapshot.user_id() == Some(&user_id) {
                        snapshot.profile = profile;
                        true
                    } else {
                        tracing::debug!(user_id = %user_id, "Discarding profile for signed-out user");
                        false
                    }
                });
            }
            Err(e) => tracing::warn!(error = %e, user_id = %user_id, "Failed to fetch profile"),
        }
    });
}

async fn listen(
    mut events: broadcast::Receiver<AuthEvent>,
    backend: Arc<dyn AuthBackend>,
    state: StateTx,
) {
    loop {
        match events.recv().await {
            Ok(event) => {
                tracing::debug!(kind = ?event.kind, "Auth event");
                apply_session(&backend, &state, event.session);
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Auth listener lagged; resyncing");
                match backend.current_session().await {
                    Ok(session) => apply_session(&backend, &state, session),
                    Err(e) => tracing::warn!(error = %e, "Resync after lag failed"),
                }
            }
            Err(RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Utc;
    use tokio::sync::Notify;

    use super::*;
    use crate::backend::BackendError;
    use crate::models::AuthEventKind;

    /// In-process auth service with a single valid account.
    pub struct FakeAuth {
        events: broadcast::Sender<AuthEvent>,
        session: Mutex<Option<AuthSession>>,
        pub fail_sign_out: AtomicBool,
        pub profile_gate: Option<Arc<Notify>>,
    }

    pub fn session_for(user: &str) -> AuthSession {
        AuthSession {
            access_token: SecretString::from(format!("access-{user}")),
            refresh_token: SecretString::from(format!("refresh-{user}")),
            expires_at: Utc::now() + chrono::Duration::hours(1),
            user: AuthUser {
                id: UserId::new(user),
                email: Some(format!("{user}@officina.it")),
            },
        }
    }

    impl FakeAuth {
        pub fn new(initial: Option<AuthSession>) -> Self {
            Self {
                events: broadcast::channel(16).0,
                session: Mutex::new(initial),
                fail_sign_out: AtomicBool::new(false),
                profile_gate: None,
            }
        }

        /// Announce a change as if it came from another part of the client.
        pub fn emit(&self, kind: AuthEventKind, session: Option<AuthSession>) {
            (*self.session.lock().unwrap()).clone_from(&session);
            let _ = self.events.send(AuthEvent { kind, session });
        }
    }

    #[async_trait]
    impl AuthBackend for FakeAuth {
        fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
            self.events.subscribe()
        }

        async fn current_session(&self) -> Result<Option<AuthSession>, BackendError> {
            Ok(self.session.lock().unwrap().clone())
        }

        async fn sign_in(
            &self,
            email: &Email,
            password: &SecretString,
        ) -> Result<AuthSession, BackendError> {
            if password.expose_secret() != "correct-horse" {
                return Err(BackendError::Api {
                    status: 400,
                    message: "Invalid login credentials".to_string(),
                });
            }
            let user = email.as_str().split('@').next().unwrap_or_default();
            let session = session_for(user);
            self.emit(AuthEventKind::SignedIn, Some(session.clone()));
            Ok(session)
        }

        async fn sign_up(
            &self,
            email: &Email,
            _password: &SecretString,
            _metadata: &SignUpMetadata,
        ) -> Result<SignUpOutcome, BackendError> {
            Ok(SignUpOutcome::ConfirmationRequired(AuthUser {
                id: UserId::new("new-user"),
                email: Some(email.to_string()),
            }))
        }

        async fn sign_out(&self) -> Result<(), BackendError> {
            self.emit(AuthEventKind::SignedOut, None);
            if self.fail_sign_out.load(Ordering::SeqCst) {
                return Err(BackendError::Api {
                    status: 500,
                    message: "upstream unavailable".to_string(),
                });
            }
            Ok(())
        }

        async fn fetch_profile(&self, user_id: &UserId) -> Result<Option<Profile>, BackendError> {
            if let Some(gate) = &self.profile_gate {
                gate.notified().await;
            }
            Ok(Some(Profile {
                id: user_id.clone(),
                full_name: Some(format!("Profile of {user_id}")),
                phone: None,
                address: None,
                city: None,
                postal_code: None,
            }))
        }

        async fn save_profile(
            &self,
            user_id: &UserId,
            update: &ProfileUpdate,
        ) -> Result<Profile, BackendError> {
            let mut profile = self.fetch_profile(user_id).await?.unwrap();
            update.apply_to(&mut profile);
            Ok(profile)
        }
    }

    async fn wait_until(
        holder: &SessionHolder,
        mut predicate: impl FnMut(&AuthSnapshot) -> bool,
    ) -> AuthSnapshot {
        let mut rx = holder.subscribe();
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if predicate(&rx.borrow_and_update()) {
                    return rx.borrow().clone();
                }
                rx.changed().await.unwrap();
            }
        })
        .await
        .unwrap()
    }

    fn password(s: &str) -> SecretString {
        SecretString::from(s)
    }

    #[tokio::test]
    async fn test_init_without_session_is_anonymous() {
        let holder = SessionHolder::init(Arc::new(FakeAuth::new(None))).await;
        let snapshot = holder.snapshot();
        assert!(!snapshot.loading);
        assert_eq!(snapshot.identity(), Identity::Anonymous);
        assert!(snapshot.profile.is_none());
    }

    #[tokio::test]
    async fn test_init_restores_session_then_profile() {
        let holder = SessionHolder::init(Arc::new(FakeAuth::new(Some(session_for("giulia"))))).await;
        assert_eq!(
            holder.identity(),
            Identity::Authenticated(UserId::new("giulia"))
        );

        let snapshot = wait_until(&holder, |s| s.profile.is_some()).await;
        assert_eq!(snapshot.profile.unwrap().id.as_str(), "giulia");
    }

    #[tokio::test]
    async fn test_failed_login_reports_error() {
        let holder = SessionHolder::init(Arc::new(FakeAuth::new(None))).await;
        let outcome = holder.login("marco@officina.it", &password("wrong")).await;
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("Invalid login credentials"));
        assert_eq!(holder.identity(), Identity::Anonymous);
    }

    #[tokio::test]
    async fn test_login_rejects_bad_email_without_backend_call() {
        let holder = SessionHolder::init(Arc::new(FakeAuth::new(None))).await;
        let outcome = holder.login("not-an-email", &password("correct-horse")).await;
        assert!(!outcome.success);
        assert!(outcome.error.is_some());
    }

    #[tokio::test]
    async fn test_login_publishes_user_then_profile() {
        let holder = SessionHolder::init(Arc::new(FakeAuth::new(None))).await;
        let outcome = holder
            .login("marco@officina.it", &password("correct-horse"))
            .await;
        assert_eq!(outcome, AuthOutcome::ok());
        assert_eq!(
            holder.identity(),
            Identity::Authenticated(UserId::new("marco"))
        );

        let snapshot = wait_until(&holder, |s| s.profile.is_some()).await;
        assert_eq!(
            snapshot.profile.unwrap().full_name.as_deref(),
            Some("Profile of marco")
        );
    }

    #[tokio::test]
    async fn test_logout_clears_state_even_when_remote_fails() {
        let backend = Arc::new(FakeAuth::new(Some(session_for("giulia"))));
        backend.fail_sign_out.store(true, Ordering::SeqCst);
        let holder = SessionHolder::init(backend).await;
        wait_until(&holder, |s| s.profile.is_some()).await;

        let outcome = holder.logout().await;
        assert!(!outcome.success);

        let snapshot = holder.snapshot();
        assert!(snapshot.user.is_none());
        assert!(snapshot.profile.is_none());
        assert!(snapshot.session.is_none());
    }

    #[tokio::test]
    async fn test_external_sign_out_event_clears_state() {
        let backend = Arc::new(FakeAuth::new(Some(session_for("giulia"))));
        let holder = SessionHolder::init(Arc::clone(&backend) as Arc<dyn AuthBackend>).await;

        backend.emit(AuthEventKind::SignedOut, None);
        let snapshot = wait_until(&holder, |s| s.user.is_none()).await;
        assert_eq!(snapshot.identity(), Identity::Anonymous);
    }

    #[tokio::test]
    async fn test_stale_profile_is_discarded() {
        let gate = Arc::new(Notify::new());
        let mut backend = FakeAuth::new(None);
        backend.profile_gate = Some(Arc::clone(&gate));
        let holder = SessionHolder::init(Arc::new(backend)).await;

        holder
            .login("marco@officina.it", &password("correct-horse"))
            .await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        holder.logout().await;
        gate.notify_one();

        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(holder.current_profile().is_none());
        assert!(holder.current_user().is_none());
    }

    #[tokio::test]
    async fn test_register_validates_password_length() {
        let holder = SessionHolder::init(Arc::new(FakeAuth::new(None))).await;
        let outcome = holder
            .register(RegisterFields {
                email: "new@officina.it".to_string(),
                password: password("12345"),
                full_name: None,
                phone: None,
            })
            .await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains('6'));
    }

    #[tokio::test]
    async fn test_register_awaiting_confirmation_stays_signed_out() {
        let holder = SessionHolder::init(Arc::new(FakeAuth::new(None))).await;
        let outcome = holder
            .register(RegisterFields {
                email: "new@officina.it".to_string(),
                password: password("123456"),
                full_name: Some("Nuova Cliente".to_string()),
                phone: None,
            })
            .await;
        assert!(outcome.success);
        assert!(holder.current_user().is_none());
    }

    #[tokio::test]
    async fn test_update_profile_requires_sign_in() {
        let holder = SessionHolder::init(Arc::new(FakeAuth::new(None))).await;
        let outcome = holder
            .update_profile(ProfileUpdate {
                city: Some("Torino".to_string()),
                ..ProfileUpdate::default()
            })
            .await;
        assert!(!outcome.success);
    }

    #[tokio::test]
    async fn test_update_profile_publishes_new_profile() {
        let holder = SessionHolder::init(Arc::new(FakeAuth::new(Some(session_for("giulia"))))).await;
        let outcome = holder
            .update_profile(ProfileUpdate {
                city: Some("Torino".to_string()),
                ..ProfileUpdate::default()
            })
            .await;
        assert!(outcome.success);
        assert_eq!(
            holder.current_profile().unwrap().city.as_deref(),
            Some("Torino")
        );
    }
}
