//! Auth state broadcaster.
//!
//! [`AuthManager`] is the single source of truth for "who is signed in".
//! It wraps the identity-provider client, persists the session across
//! restarts, and notifies subscribers when the resolved identity actually
//! changes — token refreshes and same-user profile updates are absorbed
//! silently.
//!
//! Initialization is deliberately infallible: a missing backend, a bad
//! persisted session, or a malformed redirect URL leaves the app in the
//! logged-out state with a warning in the log, never an error.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use hotlist_shared::{Session, UserId, UserInfo};
use hotlist_store::Database;

use crate::api::SessionApi;
use crate::error::Result;
use crate::events::{AuthEvent, SessionEvent};
use crate::redirect::{self, RedirectOutcome};

/// Handle returned by [`AuthManager::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

type Listener = Arc<dyn Fn(&AuthEvent) + Send + Sync>;

#[derive(Default)]
struct AuthState {
    /// The live session; `None` while logged out.
    session: Option<Session>,
    /// Whether cloud sync is enabled for this session.
    sync_enabled: bool,
    /// Guards [`AuthManager::initialize`] against re-entry.
    initialized: bool,
}

/// Auth session owner and change broadcaster.
pub struct AuthManager<S> {
    api: S,
    db: Arc<Mutex<Database>>,
    /// Where redirect-based logins land after the provider round-trip.
    redirect_to: String,
    /// Config-level sync feature flag, applied to every new session.
    sync_flag: bool,
    state: Mutex<AuthState>,
    listeners: Mutex<Vec<(u64, Listener)>>,
    next_subscription: AtomicU64,
}

impl<S: SessionApi> AuthManager<S> {
    pub fn new(
        api: S,
        db: Arc<Mutex<Database>>,
        redirect_to: impl Into<String>,
        sync_flag: bool,
    ) -> Self {
        Self {
            api,
            db,
            redirect_to: redirect_to.into(),
            sync_flag,
            state: Mutex::new(AuthState::default()),
            listeners: Mutex::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
        }
    }

    fn state(&self) -> MutexGuard<'_, AuthState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_db<T>(&self, f: impl FnOnce(&Database) -> T) -> T {
        let db = self.db.lock().unwrap_or_else(PoisonError::into_inner);
        f(&db)
    }

    /// Establish auth state: restore (and refresh) any persisted session,
    /// then process tokens or error codes embedded in `redirect_url`.
    ///
    /// Idempotent — a second call logs and returns. Never fails: every
    /// problem is logged and leaves the manager in the logged-out state.
    pub async fn initialize(&self, redirect_url: Option<&str>) {
        {
            let mut state = self.state();
            if state.initialized {
                tracing::debug!("auth manager already initialized");
                return;
            }
            state.initialized = true;
        }

        self.restore_persisted_session().await;

        if let Some(url) = redirect_url {
            self.handle_redirect_url(url).await;
        }

        tracing::info!(
            user = %self.current_user().map(|u| u.email).unwrap_or_else(|| "none".into()),
            "auth manager initialized"
        );
    }

    async fn restore_persisted_session(&self) {
        let Some(session) = self.with_db(|db| db.load_session()) else {
            tracing::debug!("no persisted session");
            return;
        };

        if !session.needs_refresh(Utc::now()) {
            tracing::info!(user = %session.user.email, "restored persisted session");
            self.handle_session_event(SessionEvent::SignedIn(session));
            return;
        }

        match self.api.refresh_session(&session.refresh_token).await {
            Ok(fresh) => {
                tracing::info!(user = %fresh.user.email, "refreshed persisted session");
                self.handle_session_event(SessionEvent::SignedIn(fresh));
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to refresh persisted session");
                if let Err(e) = self.with_db(|db| db.clear_session()) {
                    tracing::warn!(error = %e, "failed to clear stale session");
                }
            }
        }
    }

    /// Process a redirect URL the provider sent the user back with.
    ///
    /// Errors embedded in the URL are broadcast as [`AuthEvent::Error`];
    /// embedded tokens are verified against the provider and, on success,
    /// processed as a sign-in. Safe to call at any time.
    pub async fn handle_redirect_url(&self, url: &str) {
        // Never log the raw URL: the fragment may carry live tokens.
        tracing::debug!(url = %redirect::strip_auth_params(url), "processing redirect URL");

        match redirect::parse_redirect(url) {
            RedirectOutcome::None => {}
            RedirectOutcome::Error { message } => {
                tracing::warn!(%message, "auth error in redirect URL");
                self.notify_listeners(&AuthEvent::Error { message });
            }
            RedirectOutcome::Tokens {
                access_token,
                refresh_token,
                expires_in,
            } => match self.api.fetch_user(&access_token).await {
                Ok(user) => {
                    let session = Session {
                        access_token,
                        refresh_token,
                        expires_at: Utc::now() + chrono::Duration::seconds(expires_in),
                        user,
                    };
                    self.handle_session_event(SessionEvent::SignedIn(session));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "could not verify sign-in tokens");
                    self.notify_listeners(&AuthEvent::Error {
                        message: "Sign-in link could not be verified. Please request a new one."
                            .to_string(),
                    });
                }
            },
        }
    }

    /// Begin a redirect-based third-party login.
    ///
    /// Returns the authorization URL to open in a browser; the provider
    /// redirects back with tokens for [`Self::handle_redirect_url`].
    pub fn sign_in_with_provider(&self, provider: &str) -> Result<String> {
        let url = self.api.authorize_url(provider, &self.redirect_to)?;
        tracing::info!(provider, "starting third-party login");
        Ok(url)
    }

    /// Request a one-time email login link.
    pub async fn sign_in_with_email(&self, email: &str) -> Result<()> {
        self.api.request_magic_link(email, &self.redirect_to).await?;
        tracing::info!(email, "magic link requested");
        Ok(())
    }

    /// Terminate the session. Provider errors are logged and swallowed;
    /// the local state always ends up signed out.
    pub async fn sign_out(&self) {
        let token = self.access_token();
        if let Some(token) = token {
            if let Err(e) = self.api.sign_out(&token).await {
                tracing::warn!(error = %e, "provider sign-out failed");
            }
        }
        self.handle_session_event(SessionEvent::SignedOut);
    }

    /// Process one provider-level state change.
    ///
    /// This is the transition rule: the new identity is compared against
    /// the previous one and [`AuthEvent::UserChanged`] is broadcast only
    /// when they differ. Refreshed tokens still replace the persisted
    /// session.
    pub fn handle_session_event(&self, event: SessionEvent) {
        match event {
            SessionEvent::SignedIn(session)
            | SessionEvent::TokenRefreshed(session)
            | SessionEvent::UserUpdated(session) => {
                if let Err(e) = self.with_db(|db| db.save_session(&session)) {
                    tracing::warn!(error = %e, "failed to persist session");
                }
                self.set_session(Some(session), self.sync_flag);
            }
            SessionEvent::SignedOut => {
                if let Err(e) = self.with_db(|db| db.clear_session()) {
                    tracing::warn!(error = %e, "failed to clear persisted session");
                }
                self.set_session(None, false);
            }
        }
    }

    fn set_session(&self, session: Option<Session>, sync_enabled: bool) {
        let (changed, user) = {
            let mut state = self.state();
            let previous = state.session.as_ref().map(|s| s.user.id);
            let next = session.as_ref().map(|s| s.user.id);
            let user = session.as_ref().map(|s| s.user.clone());
            state.session = session;
            state.sync_enabled = sync_enabled;
            (previous != next, user)
        };

        if changed {
            match &user {
                Some(user) => tracing::info!(email = %user.email, "user logged in"),
                None => tracing::info!("user logged out"),
            }
            self.notify_listeners(&AuthEvent::UserChanged(user));
        }
    }

    /// Register a listener. It is immediately invoked once with the
    /// current state, so late subscribers are not blind to an
    /// already-resolved login.
    pub fn subscribe(&self, listener: impl Fn(&AuthEvent) + Send + Sync + 'static) -> SubscriptionId {
        let id = self.next_subscription.fetch_add(1, Ordering::Relaxed);
        let listener: Listener = Arc::new(listener);
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::clone(&listener)));

        listener(&AuthEvent::UserChanged(self.current_user()));
        SubscriptionId(id)
    }

    /// Remove a listener. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(listener_id, _)| *listener_id != id.0);
    }

    fn notify_listeners(&self, event: &AuthEvent) {
        // Snapshot under the lock, invoke outside it: a listener may
        // subscribe or query this manager without deadlocking.
        let snapshot: Vec<Listener> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in snapshot {
            listener(event);
        }
    }

    // -- Queries ----------------------------------------------------------

    pub fn current_user(&self) -> Option<UserInfo> {
        self.state().session.as_ref().map(|s| s.user.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.state().session.is_some()
    }

    /// Authenticated AND the sync flag is set for this session.
    pub fn is_sync_eligible(&self) -> bool {
        let state = self.state();
        state.sync_enabled && state.session.is_some()
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.state().session.as_ref().map(|s| s.user.id)
    }

    pub fn access_token(&self) -> Option<String> {
        self.state().session.as_ref().map(|s| s.access_token.clone())
    }

    /// Access token plus user id, for table-storage calls.
    pub fn session_credentials(&self) -> Option<(String, UserId)> {
        self.state()
            .session
            .as_ref()
            .map(|s| (s.access_token.clone(), s.user.id))
    }
}

#[cfg(test)]
mod tests {
    use std::future::Future;
    use std::sync::atomic::AtomicUsize;

    use uuid::Uuid;

    use crate::error::CloudError;

    use super::*;

    /// Provider stub: programmable refresh / user-lookup results.
    #[derive(Clone, Default)]
    struct StubApi {
        refresh_result: Arc<Mutex<Option<Session>>>,
        user_result: Arc<Mutex<Option<UserInfo>>>,
        sign_outs: Arc<AtomicUsize>,
    }

    fn stub_err() -> CloudError {
        CloudError::Api {
            status: 401,
            message: "stub".into(),
        }
    }

    impl SessionApi for StubApi {
        fn refresh_session(
            &self,
            _refresh_token: &str,
        ) -> impl Future<Output = Result<Session>> + Send {
            let result = self.refresh_result.lock().unwrap().clone();
            async move { result.ok_or_else(stub_err) }
        }

        fn fetch_user(&self, _access_token: &str) -> impl Future<Output = Result<UserInfo>> + Send {
            let result = self.user_result.lock().unwrap().clone();
            async move { result.ok_or_else(stub_err) }
        }

        fn authorize_url(&self, provider: &str, redirect_to: &str) -> Result<String> {
            Ok(format!("stub://authorize/{provider}?redirect_to={redirect_to}"))
        }

        fn request_magic_link(
            &self,
            _email: &str,
            _redirect_to: &str,
        ) -> impl Future<Output = Result<()>> + Send {
            async { Ok(()) }
        }

        fn sign_out(&self, _access_token: &str) -> impl Future<Output = Result<()>> + Send {
            self.sign_outs.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        }
    }

    fn user(n: u128) -> UserInfo {
        UserInfo {
            id: UserId(Uuid::from_u128(n)),
            email: format!("user{n}@example.com"),
            provider: "email".into(),
        }
    }

    fn session_for(n: u128) -> Session {
        Session {
            access_token: format!("access-{n}"),
            refresh_token: format!("refresh-{n}"),
            expires_at: Utc::now() + chrono::Duration::hours(1),
            user: user(n),
        }
    }

    struct Harness {
        _dir: tempfile::TempDir,
        api: StubApi,
        manager: AuthManager<StubApi>,
        events: Arc<Mutex<Vec<AuthEvent>>>,
    }

    fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("test.db")).unwrap();
        let api = StubApi::default();
        let manager = AuthManager::new(api.clone(), Arc::new(Mutex::new(db)), "https://app/", true);

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        manager.subscribe(move |event| sink.lock().unwrap().push(event.clone()));
        // Drop the immediate replay so tests only see transitions.
        events.lock().unwrap().clear();

        Harness {
            _dir: dir,
            api,
            manager,
            events,
        }
    }

    fn user_changes(events: &Arc<Mutex<Vec<AuthEvent>>>) -> Vec<Option<UserInfo>> {
        events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                AuthEvent::UserChanged(user) => Some(user.clone()),
                AuthEvent::Error { .. } => None,
            })
            .collect()
    }

    #[test]
    fn user_changed_fires_iff_identity_differs() {
        let h = harness();

        h.manager
            .handle_session_event(SessionEvent::SignedIn(session_for(1)));
        // Same user again: token refresh and profile update are silent.
        h.manager
            .handle_session_event(SessionEvent::TokenRefreshed(session_for(1)));
        h.manager
            .handle_session_event(SessionEvent::UserUpdated(session_for(1)));
        // Different user: one notification.
        h.manager
            .handle_session_event(SessionEvent::SignedIn(session_for(2)));
        // Logout, then repeated logout-equivalent state.
        h.manager.handle_session_event(SessionEvent::SignedOut);
        h.manager.handle_session_event(SessionEvent::SignedOut);

        let changes = user_changes(&h.events);
        assert_eq!(
            changes,
            vec![Some(user(1)), Some(user(2)), None],
            "one notification per identity change, none for refreshes"
        );
    }

    #[test]
    fn token_refresh_still_replaces_the_stored_session() {
        let h = harness();
        h.manager
            .handle_session_event(SessionEvent::SignedIn(session_for(1)));

        let mut refreshed = session_for(1);
        refreshed.access_token = "access-1-rotated".into();
        h.manager
            .handle_session_event(SessionEvent::TokenRefreshed(refreshed));

        assert_eq!(
            h.manager.access_token().as_deref(),
            Some("access-1-rotated")
        );
        assert_eq!(user_changes(&h.events), vec![Some(user(1))]);
    }

    #[test]
    fn subscribe_replays_current_state_immediately() {
        let h = harness();
        h.manager
            .handle_session_event(SessionEvent::SignedIn(session_for(7)));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        h.manager
            .subscribe(move |event| sink.lock().unwrap().push(event.clone()));

        assert_eq!(
            *seen.lock().unwrap(),
            vec![AuthEvent::UserChanged(Some(user(7)))]
        );
    }

    #[test]
    fn listeners_fire_in_registration_order_and_unsubscribe_works() {
        let h = harness();
        let order = Arc::new(Mutex::new(Vec::new()));

        let first = {
            let order = Arc::clone(&order);
            h.manager.subscribe(move |_| order.lock().unwrap().push("first"))
        };
        {
            let order = Arc::clone(&order);
            h.manager.subscribe(move |_| order.lock().unwrap().push("second"));
        }
        order.lock().unwrap().clear(); // discard the subscribe replays

        h.manager
            .handle_session_event(SessionEvent::SignedIn(session_for(1)));
        assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);

        h.manager.unsubscribe(first);
        order.lock().unwrap().clear();
        h.manager.handle_session_event(SessionEvent::SignedOut);
        assert_eq!(*order.lock().unwrap(), vec!["second"]);
    }

    #[test]
    fn sync_flag_off_means_authenticated_but_not_eligible() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("test.db")).unwrap();
        let manager =
            AuthManager::new(StubApi::default(), Arc::new(Mutex::new(db)), "https://app/", false);

        manager.handle_session_event(SessionEvent::SignedIn(session_for(1)));

        assert!(manager.is_authenticated());
        assert!(!manager.is_sync_eligible());
    }

    #[tokio::test]
    async fn initialize_restores_a_fresh_persisted_session() {
        let h = harness();
        h.manager
            .with_db(|db| db.save_session(&session_for(3)))
            .unwrap();

        h.manager.initialize(None).await;

        assert!(h.manager.is_authenticated());
        assert!(h.manager.is_sync_eligible());
        assert_eq!(user_changes(&h.events), vec![Some(user(3))]);
    }

    #[tokio::test]
    async fn initialize_refreshes_an_expired_persisted_session() {
        let h = harness();
        let mut stale = session_for(4);
        stale.expires_at = Utc::now() - chrono::Duration::minutes(5);
        h.manager.with_db(|db| db.save_session(&stale)).unwrap();
        *h.api.refresh_result.lock().unwrap() = Some(session_for(4));

        h.manager.initialize(None).await;

        assert!(h.manager.is_authenticated());
        assert_eq!(h.manager.access_token().as_deref(), Some("access-4"));
    }

    #[tokio::test]
    async fn failed_refresh_leaves_the_app_logged_out() {
        let h = harness();
        let mut stale = session_for(4);
        stale.expires_at = Utc::now() - chrono::Duration::minutes(5);
        h.manager.with_db(|db| db.save_session(&stale)).unwrap();
        // No refresh_result: the stub fails the refresh.

        h.manager.initialize(None).await;

        assert!(!h.manager.is_authenticated());
        assert!(user_changes(&h.events).is_empty());
        // The stale session was discarded, not kept for another try.
        assert!(h.manager.with_db(|db| db.load_session()).is_none());
    }

    #[tokio::test]
    async fn initialize_is_idempotent() {
        let h = harness();
        h.manager
            .with_db(|db| db.save_session(&session_for(5)))
            .unwrap();

        h.manager.initialize(None).await;
        h.manager.initialize(None).await;

        assert_eq!(user_changes(&h.events), vec![Some(user(5))]);
    }

    #[tokio::test]
    async fn redirect_error_is_broadcast_not_a_user_change() {
        let h = harness();
        h.manager
            .initialize(Some(
                "https://app/#error=access_denied&error_code=otp_expired",
            ))
            .await;

        assert!(!h.manager.is_authenticated());
        let events = h.events.lock().unwrap().clone();
        assert_eq!(
            events,
            vec![AuthEvent::Error {
                message: "Magic link expired. Please request a new one.".into()
            }]
        );
    }

    #[tokio::test]
    async fn redirect_tokens_complete_a_sign_in() {
        let h = harness();
        *h.api.user_result.lock().unwrap() = Some(user(9));

        h.manager
            .initialize(Some(
                "https://app/#access_token=tok&refresh_token=ref&expires_in=3600",
            ))
            .await;

        assert_eq!(h.manager.current_user(), Some(user(9)));
        assert_eq!(h.manager.access_token().as_deref(), Some("tok"));
        // The verified session was persisted for the next start.
        assert!(h.manager.with_db(|db| db.load_session()).is_some());
    }

    #[tokio::test]
    async fn unverifiable_redirect_tokens_produce_an_auth_error() {
        let h = harness();
        // No user_result: fetch_user fails.
        h.manager
            .initialize(Some("https://app/#access_token=tok&refresh_token=ref"))
            .await;

        assert!(!h.manager.is_authenticated());
        assert!(matches!(
            h.events.lock().unwrap().last(),
            Some(AuthEvent::Error { .. })
        ));
    }

    #[tokio::test]
    async fn sign_out_clears_everything_and_notifies_once() {
        let h = harness();
        h.manager
            .handle_session_event(SessionEvent::SignedIn(session_for(1)));

        h.manager.sign_out().await;
        h.manager.sign_out().await; // second sign-out is a no-op

        assert!(!h.manager.is_authenticated());
        assert!(!h.manager.is_sync_eligible());
        assert!(h.manager.with_db(|db| db.load_session()).is_none());
        assert_eq!(user_changes(&h.events), vec![Some(user(1)), None]);
        assert_eq!(h.api.sign_outs.load(Ordering::SeqCst), 1);
    }
}
