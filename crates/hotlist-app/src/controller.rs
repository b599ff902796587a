//! Application controller.
//!
//! [`AppController`] owns the single in-memory [`AppDocument`] and is the
//! only component that mutates it. The cloud layer reads the document
//! through a snapshot accessor handed to the periodic sync task, never
//! directly.
//!
//! Boot order follows the established flow: load the local cache, wire
//! the auth subscription, initialize auth (which may replay a persisted
//! session or complete a redirect login), then react to auth transitions
//! — reconcile + start periodic sync on login, stop it on logout, surface
//! auth failures to the frontend immediately.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::json;
use tokio::sync::mpsc;
use uuid::Uuid;

use hotlist_cloud::{
    AuthEvent, AuthManager, CloudError, RestSessionApi, RestTableApi, SessionApi, SyncManager,
    SyncStatus, TableApi,
};
use hotlist_shared::{AppDocument, ClientRecord, ClientStatus, Quotes, UserInfo};
use hotlist_store::Database;

use crate::config::AppConfig;
use crate::error::{AppError, Result};

/// Update pushed to the frontend over the notice channel.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    /// The in-memory document was replaced; refresh any rendered state.
    StateRefreshed { clients: usize },
    /// A user is signed in and periodic sync is armed.
    SignedIn { email: String },
    /// Signed out (also delivered once at boot for the initial state).
    SignedOut,
    /// An auth flow failed; show this to the user before proceeding.
    AuthFailure { message: String },
}

/// The production controller type.
pub type Controller = AppController<RestSessionApi, RestTableApi>;

struct CloudStack<S: SessionApi + 'static, T: TableApi + 'static> {
    auth: Arc<AuthManager<S>>,
    sync: SyncManager<S, T>,
}

impl<S: SessionApi + 'static, T: TableApi + 'static> Clone for CloudStack<S, T> {
    fn clone(&self) -> Self {
        Self {
            auth: Arc::clone(&self.auth),
            sync: self.sync.clone(),
        }
    }
}

/// Owner of the application state and the component wiring.
///
/// A cheap handle: clones share the same document, store and cloud
/// stack. The auth event loop runs on its own clone.
pub struct AppController<S: SessionApi + 'static, T: TableApi + 'static> {
    config: AppConfig,
    db: Arc<Mutex<Database>>,
    document: Arc<Mutex<AppDocument>>,
    /// `None` when no backend credentials are configured: the app then
    /// runs fully against local data.
    cloud: Option<CloudStack<S, T>>,
    notices: mpsc::UnboundedSender<Notice>,
}

impl<S: SessionApi + 'static, T: TableApi + 'static> Clone for AppController<S, T> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            db: Arc::clone(&self.db),
            document: Arc::clone(&self.document),
            cloud: self.cloud.clone(),
            notices: self.notices.clone(),
        }
    }
}

impl Controller {
    /// Assemble the production controller from configuration.
    ///
    /// Missing backend credentials are not an error — the controller is
    /// built without a cloud layer and stays local-only.
    pub fn from_config(config: AppConfig) -> Result<(Self, mpsc::UnboundedReceiver<Notice>)> {
        let db = match &config.storage.db_path {
            Some(path) => Database::open_at(path)?,
            None => Database::new()?,
        };
        let db = Arc::new(Mutex::new(db));

        let cloud = if config.has_backend() {
            let session_api =
                RestSessionApi::new(&config.backend.endpoint, &config.backend.anon_key)?;
            let table_api = RestTableApi::new(&config.backend.endpoint, &config.backend.anon_key)?;
            let auth = Arc::new(AuthManager::new(
                session_api,
                Arc::clone(&db),
                config.backend.redirect_to.clone(),
                config.sync.enabled,
            ));
            let sync = SyncManager::new(Arc::clone(&auth), table_api);
            Some(CloudStack { auth, sync })
        } else {
            None
        };

        Ok(Self::assemble(config, db, cloud))
    }
}

impl<S: SessionApi + 'static, T: TableApi + 'static> AppController<S, T> {
    /// Assemble a controller around an existing cloud stack. Used by the
    /// tests to inject in-memory backends.
    pub fn with_cloud(
        config: AppConfig,
        db: Arc<Mutex<Database>>,
        auth: Arc<AuthManager<S>>,
        sync: SyncManager<S, T>,
    ) -> (Self, mpsc::UnboundedReceiver<Notice>) {
        Self::assemble(config, db, Some(CloudStack { auth, sync }))
    }

    fn assemble(
        config: AppConfig,
        db: Arc<Mutex<Database>>,
        cloud: Option<CloudStack<S, T>>,
    ) -> (Self, mpsc::UnboundedReceiver<Notice>) {
        let (notices, notice_rx) = mpsc::unbounded_channel();
        let controller = Self {
            config,
            db,
            document: Arc::new(Mutex::new(AppDocument::default())),
            cloud,
            notices,
        };
        (controller, notice_rx)
    }

    fn doc_lock(&self) -> MutexGuard<'_, AppDocument> {
        self.document.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_db<R>(&self, f: impl FnOnce(&Database) -> R) -> R {
        let db = self.db.lock().unwrap_or_else(PoisonError::into_inner);
        f(&db)
    }

    fn emit(&self, notice: Notice) {
        let _ = self.notices.send(notice);
    }

    /// Load the cached document, wire the auth subscription and
    /// initialize auth. `redirect_url` is the URL the app was launched
    /// with, if a provider redirect brought the user back.
    pub async fn boot(&self, redirect_url: Option<&str>) {
        let doc = self.with_db(|db| db.load_document(&self.config.storage.slot));
        let clients = doc.clients.len();
        *self.doc_lock() = doc;
        tracing::info!(clients, "loaded local document");
        self.emit(Notice::StateRefreshed { clients });

        let Some(cloud) = &self.cloud else {
            tracing::error!("backend credentials not provided; running with local data only");
            return;
        };

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        cloud.auth.subscribe(move |event| {
            let _ = event_tx.send(event.clone());
        });

        let this = self.clone();
        tokio::spawn(async move { this.auth_event_loop(event_rx).await });

        cloud.auth.initialize(redirect_url).await;
    }

    async fn auth_event_loop(self, mut events: mpsc::UnboundedReceiver<AuthEvent>) {
        while let Some(event) = events.recv().await {
            match event {
                AuthEvent::UserChanged(Some(user)) => self.on_login(user).await,
                AuthEvent::UserChanged(None) => self.on_logout(),
                AuthEvent::Error { message } => {
                    tracing::error!(%message, "authentication failed");
                    self.emit(Notice::AuthFailure { message });
                }
            }
        }
    }

    async fn on_login(&self, user: UserInfo) {
        let Some(cloud) = &self.cloud else { return };
        tracing::info!(email = %user.email, "user logged in, running initial sync");

        let local = self.document();
        let merged = cloud.sync.reconcile_on_login(local).await;
        *self.doc_lock() = merged.clone();
        self.persist_local(&merged);
        self.emit(Notice::StateRefreshed {
            clients: merged.clients.len(),
        });

        let document = Arc::clone(&self.document);
        cloud.sync.start_periodic(
            move || {
                document
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone()
            },
            self.config.sync.interval,
        );
        self.emit(Notice::SignedIn { email: user.email });
    }

    fn on_logout(&self) {
        if let Some(cloud) = &self.cloud {
            cloud.sync.stop_periodic();
        }
        self.emit(Notice::SignedOut);
    }

    fn persist_local(&self, doc: &AppDocument) {
        if let Err(e) = self.with_db(|db| db.save_document(&self.config.storage.slot, doc)) {
            // Degrade to the in-memory copy; the next successful persist
            // will catch the store up.
            tracing::warn!(error = %e, "failed to persist document locally");
        }
    }

    /// Persist the current state: always locally, and to the cloud when
    /// sync is eligible at call time.
    pub async fn persist_state(&self) {
        let doc = self.document();
        self.persist_local(&doc);

        if let Some(cloud) = &self.cloud {
            if cloud.auth.is_sync_eligible() {
                cloud.sync.push_to_cloud(&doc).await;
            }
        }
    }

    /// Snapshot of the in-memory document.
    pub fn document(&self) -> AppDocument {
        self.doc_lock().clone()
    }

    // -- Document operations ----------------------------------------------

    pub async fn add_client(&self, record: ClientRecord) {
        let name = record.name.clone();
        self.doc_lock().clients.push(record);
        self.persist_state().await;
        self.track("client_added", json!({ "name": name })).await;
    }

    /// Remove a client by id; returns whether anything was removed.
    pub async fn remove_client(&self, id: Uuid) -> bool {
        let removed = {
            let mut doc = self.doc_lock();
            let before = doc.clients.len();
            doc.clients.retain(|c| c.id != id);
            doc.clients.len() < before
        };
        if removed {
            self.persist_state().await;
            self.track("client_removed", json!({ "id": id })).await;
        }
        removed
    }

    /// Update a client's status; returns whether the client was found.
    pub async fn update_client_status(&self, id: Uuid, status: ClientStatus) -> bool {
        let updated = {
            let mut doc = self.doc_lock();
            match doc.clients.iter_mut().find(|c| c.id == id) {
                Some(client) => {
                    client.status = status;
                    true
                }
                None => false,
            }
        };
        if updated {
            self.persist_state().await;
            self.track("client_updated", json!({ "id": id })).await;
        }
        updated
    }

    /// Replace the quote block, re-deriving the list and resetting the
    /// recently-shown ring.
    pub async fn set_quotes(&self, raw: &str) {
        {
            let mut doc = self.doc_lock();
            doc.quotes = Quotes::from_raw(raw);
            doc.quotes_settings.recent.clear();
        }
        self.persist_state().await;
    }

    async fn track(&self, activity: &str, data: serde_json::Value) {
        if let Some(cloud) = &self.cloud {
            cloud.sync.record_activity(activity, 1).await;
            cloud.sync.log_activity(activity, data).await;
        }
    }

    // -- Auth passthroughs ------------------------------------------------

    /// Start a redirect-based third-party login; returns the URL to open.
    pub fn sign_in_with_provider(&self, provider: &str) -> Result<String> {
        match &self.cloud {
            Some(cloud) => Ok(cloud.auth.sign_in_with_provider(provider)?),
            None => Err(AppError::Cloud(CloudError::MissingCredentials)),
        }
    }

    /// Request a one-time email login link.
    pub async fn sign_in_with_email(&self, email: &str) -> Result<()> {
        match &self.cloud {
            Some(cloud) => Ok(cloud.auth.sign_in_with_email(email).await?),
            None => Err(AppError::Cloud(CloudError::MissingCredentials)),
        }
    }

    /// Complete a login from a pasted redirect URL.
    pub async fn handle_redirect_url(&self, url: &str) {
        match &self.cloud {
            Some(cloud) => cloud.auth.handle_redirect_url(url).await,
            None => tracing::warn!("no backend configured, redirect URL ignored"),
        }
    }

    pub async fn sign_out(&self) {
        if let Some(cloud) = &self.cloud {
            cloud.auth.sign_out().await;
        }
    }

    pub fn current_user(&self) -> Option<UserInfo> {
        self.cloud.as_ref().and_then(|c| c.auth.current_user())
    }

    pub fn sync_status(&self) -> Option<SyncStatus> {
        self.cloud.as_ref().map(|c| c.sync.sync_status())
    }

    /// Stop background work before exit. In-flight pushes complete.
    pub fn shutdown(&self) {
        if let Some(cloud) = &self.cloud {
            cloud.sync.stop_periodic();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::future::Future;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use chrono::{DateTime, NaiveDate, Utc};

    use hotlist_cloud::DocumentRow;
    use hotlist_shared::{Session, UserId};

    use super::*;

    type CloudResult<V> = std::result::Result<V, CloudError>;

    // -- In-memory backends ------------------------------------------------

    #[derive(Clone, Default)]
    struct NullSessionApi;

    fn stub_err() -> CloudError {
        CloudError::Api {
            status: 500,
            message: "not wired in tests".into(),
        }
    }

    impl SessionApi for NullSessionApi {
        fn refresh_session(
            &self,
            _r: &str,
        ) -> impl Future<Output = CloudResult<Session>> + Send {
            async { Err(stub_err()) }
        }
        fn fetch_user(&self, _a: &str) -> impl Future<Output = CloudResult<UserInfo>> + Send {
            async { Err(stub_err()) }
        }
        fn authorize_url(&self, provider: &str, redirect_to: &str) -> CloudResult<String> {
            Ok(format!("stub://{provider}?redirect_to={redirect_to}"))
        }
        fn request_magic_link(
            &self,
            _e: &str,
            _r: &str,
        ) -> impl Future<Output = CloudResult<()>> + Send {
            async { Ok(()) }
        }
        fn sign_out(&self, _a: &str) -> impl Future<Output = CloudResult<()>> + Send {
            async { Ok(()) }
        }
    }

    #[derive(Clone, Default)]
    struct FakeTable {
        row: Arc<Mutex<Option<DocumentRow>>>,
        upserts: Arc<Mutex<usize>>,
        activities: Arc<Mutex<Vec<String>>>,
        fail: Arc<AtomicBool>,
    }

    impl FakeTable {
        fn check(&self) -> CloudResult<()> {
            if self.fail.load(Ordering::SeqCst) {
                Err(CloudError::Api {
                    status: 503,
                    message: "injected failure".into(),
                })
            } else {
                Ok(())
            }
        }

        fn set_cloud_doc(&self, doc: &AppDocument) {
            *self.row.lock().unwrap() = Some(DocumentRow {
                data: serde_json::to_string(doc).unwrap(),
                updated_at: Utc::now(),
            });
        }

        fn cloud_doc(&self) -> Option<AppDocument> {
            let row = self.row.lock().unwrap();
            row.as_ref().map(|r| serde_json::from_str(&r.data).unwrap())
        }

        fn upsert_count(&self) -> usize {
            *self.upserts.lock().unwrap()
        }
    }

    impl TableApi for FakeTable {
        fn upsert_document(
            &self,
            _token: &str,
            _user: UserId,
            data: &str,
            updated_at: DateTime<Utc>,
        ) -> impl Future<Output = CloudResult<()>> + Send {
            let result = self.check().map(|()| {
                *self.upserts.lock().unwrap() += 1;
                *self.row.lock().unwrap() = Some(DocumentRow {
                    data: data.to_string(),
                    updated_at,
                });
            });
            async move { result }
        }
        fn fetch_document(
            &self,
            _token: &str,
            _user: UserId,
        ) -> impl Future<Output = CloudResult<Option<DocumentRow>>> + Send {
            let result = self.check().map(|()| self.row.lock().unwrap().clone());
            async move { result }
        }
        fn bump_activity(
            &self,
            _token: &str,
            _user: UserId,
            _date: NaiveDate,
            activity_type: &str,
            _delta: i64,
        ) -> impl Future<Output = CloudResult<()>> + Send {
            let result = self.check().map(|()| {
                self.activities.lock().unwrap().push(activity_type.to_string());
            });
            async move { result }
        }
        fn append_event(
            &self,
            _token: &str,
            _user: UserId,
            _event_type: &str,
            _data: &serde_json::Value,
        ) -> impl Future<Output = CloudResult<()>> + Send {
            let result = self.check();
            async move { result }
        }
    }

    // -- Harness -----------------------------------------------------------

    struct Harness {
        _dir: tempfile::TempDir,
        controller: AppController<NullSessionApi, FakeTable>,
        notices: mpsc::UnboundedReceiver<Notice>,
        auth: Arc<AuthManager<NullSessionApi>>,
        table: FakeTable,
        db: Arc<Mutex<Database>>,
    }

    fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(Mutex::new(
            Database::open_at(&dir.path().join("test.db")).unwrap(),
        ));
        let auth = Arc::new(AuthManager::new(
            NullSessionApi,
            Arc::clone(&db),
            "https://app/",
            true,
        ));
        let table = FakeTable::default();
        let sync = SyncManager::new(Arc::clone(&auth), table.clone());
        let (controller, notices) =
            AppController::with_cloud(AppConfig::default(), Arc::clone(&db), Arc::clone(&auth), sync);

        Harness {
            _dir: dir,
            controller,
            notices,
            auth,
            table,
            db,
        }
    }

    fn session_for(email: &str) -> Session {
        Session {
            access_token: "tok".into(),
            refresh_token: "ref".into(),
            expires_at: Utc::now() + chrono::Duration::hours(1),
            user: UserInfo {
                id: UserId(Uuid::from_u128(1)),
                email: email.into(),
                provider: "google".into(),
            },
        }
    }

    fn doc_with(names: &[&str]) -> AppDocument {
        AppDocument {
            clients: names.iter().map(|n| ClientRecord::named(*n)).collect(),
            ..Default::default()
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    fn drain(notices: &mut mpsc::UnboundedReceiver<Notice>) -> Vec<Notice> {
        let mut out = Vec::new();
        while let Ok(notice) = notices.try_recv() {
            out.push(notice);
        }
        out
    }

    // -- Tests -------------------------------------------------------------

    #[tokio::test]
    async fn local_only_controller_works_without_a_backend() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.storage.db_path = Some(dir.path().join("local.db"));

        let (controller, mut notices) = Controller::from_config(config).unwrap();
        controller.boot(None).await;

        controller.add_client(ClientRecord::named("Ada")).await;
        assert_eq!(controller.document().clients.len(), 1);
        assert!(controller.current_user().is_none());
        assert!(controller.sync_status().is_none());
        assert!(controller.sign_in_with_provider("google").is_err());

        // The boot notice reflects the (empty) local load.
        assert_eq!(
            drain(&mut notices)[0],
            Notice::StateRefreshed { clients: 0 }
        );
    }

    #[tokio::test]
    async fn boot_loads_the_cached_document() {
        let mut h = harness();
        h.controller
            .with_db(|db| db.save_document(&h.controller.config.storage.slot, &doc_with(&["A", "B"])))
            .unwrap();

        h.controller.boot(None).await;

        assert_eq!(h.controller.document().clients.len(), 2);
        assert!(drain(&mut h.notices)
            .contains(&Notice::StateRefreshed { clients: 2 }));
    }

    #[tokio::test]
    async fn login_replaces_state_with_the_cloud_document() {
        let mut h = harness();
        h.controller
            .with_db(|db| db.save_document(&h.controller.config.storage.slot, &doc_with(&["A"])))
            .unwrap();
        let cloud = doc_with(&["B", "C"]);
        h.table.set_cloud_doc(&cloud);

        h.controller.boot(None).await;
        h.auth
            .handle_session_event(hotlist_cloud::SessionEvent::SignedIn(session_for(
                "ada@example.com",
            )));
        settle().await;

        // Cloud wins; the local A is gone from memory and from the store.
        assert_eq!(h.controller.document(), cloud);
        let persisted = h
            .db
            .lock()
            .unwrap()
            .load_document(&h.controller.config.storage.slot);
        assert_eq!(persisted, cloud);

        let notices = drain(&mut h.notices);
        assert!(notices.contains(&Notice::SignedIn {
            email: "ada@example.com".into()
        }));
        assert!(notices.contains(&Notice::StateRefreshed { clients: 2 }));
    }

    #[tokio::test]
    async fn first_login_migrates_local_data_to_an_empty_cloud() {
        let mut h = harness();
        h.controller
            .with_db(|db| db.save_document(&h.controller.config.storage.slot, &doc_with(&["A"])))
            .unwrap();

        h.controller.boot(None).await;
        h.auth
            .handle_session_event(hotlist_cloud::SessionEvent::SignedIn(session_for(
                "ada@example.com",
            )));
        settle().await;

        assert_eq!(h.table.upsert_count(), 1);
        assert_eq!(h.table.cloud_doc().unwrap().clients[0].name, "A");
        assert_eq!(h.controller.document().clients.len(), 1);
        drain(&mut h.notices);
    }

    #[tokio::test]
    async fn logout_is_surfaced_and_stops_background_sync() {
        let mut h = harness();
        h.controller.boot(None).await;
        h.auth
            .handle_session_event(hotlist_cloud::SessionEvent::SignedIn(session_for(
                "ada@example.com",
            )));
        settle().await;
        drain(&mut h.notices);

        h.auth
            .handle_session_event(hotlist_cloud::SessionEvent::SignedOut);
        settle().await;

        assert!(drain(&mut h.notices).contains(&Notice::SignedOut));
        assert!(h.controller.current_user().is_none());
    }

    #[tokio::test]
    async fn auth_errors_reach_the_frontend() {
        let mut h = harness();
        h.controller.boot(None).await;
        h.controller
            .handle_redirect_url("https://app/#error=access_denied")
            .await;
        settle().await;

        assert!(drain(&mut h.notices).iter().any(|n| matches!(
            n,
            Notice::AuthFailure { message } if message.contains("Access denied")
        )));
    }

    #[tokio::test]
    async fn persist_state_survives_cloud_failure() {
        let mut h = harness();
        h.controller.boot(None).await;
        h.auth
            .handle_session_event(hotlist_cloud::SessionEvent::SignedIn(session_for(
                "ada@example.com",
            )));
        settle().await;
        h.table.fail.store(true, Ordering::SeqCst);

        h.controller.add_client(ClientRecord::named("Ada")).await;

        // The local store has the client even though every cloud call failed.
        let persisted = h
            .db
            .lock()
            .unwrap()
            .load_document(&h.controller.config.storage.slot);
        assert_eq!(persisted.clients.len(), 1);
        drain(&mut h.notices);
    }

    #[tokio::test]
    async fn document_operations_persist_and_record_activity() {
        let h = harness();
        h.controller.boot(None).await;
        h.auth
            .handle_session_event(hotlist_cloud::SessionEvent::SignedIn(session_for(
                "ada@example.com",
            )));
        settle().await;

        let record = ClientRecord::named("Ada");
        let id = record.id;
        h.controller.add_client(record).await;
        assert!(h.controller.update_client_status(id, ClientStatus::Hot).await);
        assert!(h.controller.remove_client(id).await);
        assert!(!h.controller.remove_client(id).await, "already removed");

        assert_eq!(
            *h.table.activities.lock().unwrap(),
            vec!["client_added", "client_updated", "client_removed"]
        );

        h.controller.set_quotes("one\ntwo").await;
        assert_eq!(h.controller.document().quotes.list.len(), 2);
    }
}
