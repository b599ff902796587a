//! Document sync orchestrator.
//!
//! [`SyncManager`] moves the single application document between memory
//! and the cloud table: explicit push/pull, the one-time reconcile at
//! login, and a periodic background push while the user stays signed in.
//!
//! The reconcile policy is intentionally simple and non-symmetric: a
//! non-empty cloud document wins wholesale, local changes made while
//! logged out are discarded. There is no field-level merging anywhere.
//!
//! Cloud failures never reach the caller as errors — every operation
//! degrades to `false` / `None` with a logged warning, and nothing is
//! retried: a missed push is superseded by the next periodic tick.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use hotlist_shared::{AppDocument, UserInfo};

use crate::api::{SessionApi, TableApi};
use crate::auth::AuthManager;

/// Snapshot of the sync side-channel state.
#[derive(Debug, Clone)]
pub struct SyncStatus {
    pub enabled: bool,
    pub last_sync: Option<DateTime<Utc>>,
    pub user: Option<UserInfo>,
}

/// The armed periodic task. Dropping the handle detaches the task; the
/// watch sender tells it to stop at the next select point.
struct PeriodicSync {
    shutdown: watch::Sender<bool>,
    _handle: JoinHandle<()>,
}

/// Cloud sync orchestrator.
///
/// A cheap handle: clones share the same auth view, table client and
/// periodic-task slot, so the background task and its owner always agree
/// on what is armed.
pub struct SyncManager<S, T> {
    auth: Arc<AuthManager<S>>,
    table: Arc<T>,
    last_sync: Arc<Mutex<Option<DateTime<Utc>>>>,
    periodic: Arc<Mutex<Option<PeriodicSync>>>,
}

impl<S, T> Clone for SyncManager<S, T> {
    fn clone(&self) -> Self {
        Self {
            auth: Arc::clone(&self.auth),
            table: Arc::clone(&self.table),
            last_sync: Arc::clone(&self.last_sync),
            periodic: Arc::clone(&self.periodic),
        }
    }
}

impl<S, T> SyncManager<S, T>
where
    S: SessionApi + 'static,
    T: TableApi + 'static,
{
    pub fn new(auth: Arc<AuthManager<S>>, table: T) -> Self {
        Self {
            auth,
            table: Arc::new(table),
            last_sync: Arc::new(Mutex::new(None)),
            periodic: Arc::new(Mutex::new(None)),
        }
    }

    fn periodic_slot(&self) -> MutexGuard<'_, Option<PeriodicSync>> {
        self.periodic.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Serialize the document and upsert it under the current user's id.
    ///
    /// Returns `false` without touching the network when sync is not
    /// eligible or no user is resolved; returns `false` (never an error)
    /// when the backend rejects the write.
    pub async fn push_to_cloud(&self, doc: &AppDocument) -> bool {
        if !self.auth.is_sync_eligible() {
            tracing::debug!("sync not eligible, skipping cloud save");
            return false;
        }
        let Some((token, user_id)) = self.auth.session_credentials() else {
            tracing::debug!("no resolved user, skipping cloud save");
            return false;
        };

        let data = match serde_json::to_string(doc) {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!(error = %e, "could not serialize document for cloud save");
                return false;
            }
        };

        match self
            .table
            .upsert_document(&token, user_id, &data, Utc::now())
            .await
        {
            Ok(()) => {
                let now = Utc::now();
                *self
                    .last_sync
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = Some(now);
                tracing::debug!(user = %user_id, "cloud save succeeded");
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "cloud save failed");
                false
            }
        }
    }

    /// Fetch and deserialize the current user's document row.
    ///
    /// `None` covers every non-success: not authenticated, no row for
    /// this user, backend failure, or an unparseable payload.
    pub async fn pull_from_cloud(&self) -> Option<AppDocument> {
        if !self.auth.is_authenticated() {
            tracing::debug!("not authenticated, skipping cloud load");
            return None;
        }
        let (token, user_id) = self.auth.session_credentials()?;

        let row = match self.table.fetch_document(&token, user_id).await {
            Ok(Some(row)) => row,
            Ok(None) => {
                tracing::debug!(user = %user_id, "no cloud document for user");
                return None;
            }
            Err(e) => {
                tracing::warn!(error = %e, "cloud load failed");
                return None;
            }
        };

        match serde_json::from_str(&row.data) {
            Ok(doc) => Some(doc),
            Err(e) => {
                tracing::warn!(error = %e, "cloud document is unparseable, ignoring");
                None
            }
        }
    }

    /// One-time merge at login between the local and cloud copies.
    ///
    /// A non-empty cloud document is authoritative and returned as-is
    /// (local edits made while logged out are dropped). An empty cloud
    /// with local clients triggers a single migration push. Otherwise the
    /// local document passes through unchanged.
    pub async fn reconcile_on_login(&self, local: AppDocument) -> AppDocument {
        if !self.auth.is_authenticated() {
            tracing::debug!("not authenticated, skipping reconcile");
            return local;
        }

        match self.pull_from_cloud().await {
            Some(cloud) if !cloud.is_empty() => {
                tracing::info!(clients = cloud.clients.len(), "using cloud data as source of truth");
                cloud
            }
            _ => {
                if local.has_clients() {
                    tracing::info!(
                        clients = local.clients.len(),
                        "no cloud data, migrating local document"
                    );
                    self.push_to_cloud(&local).await;
                }
                local
            }
        }
    }

    /// Arm the periodic push: every `interval`, re-check eligibility,
    /// snapshot the document via `supplier` and push it.
    ///
    /// Any previously armed task is cancelled first. Nothing is armed if
    /// sync is not eligible right now. Ticks are serialized — each push
    /// completes before the next tick is taken, and ticks that fall due
    /// meanwhile are skipped, not queued.
    pub fn start_periodic<F>(&self, supplier: F, interval: Duration)
    where
        F: Fn() -> AppDocument + Send + 'static,
    {
        self.stop_periodic();

        if !self.auth.is_sync_eligible() {
            tracing::debug!("sync not eligible, not starting periodic sync");
            return;
        }

        tracing::info!(interval_secs = interval.as_secs(), "starting periodic sync");

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let this = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await; // consume the immediate first tick

            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = ticker.tick() => {
                        // Eligibility may have changed mid-interval.
                        if !this.auth.is_sync_eligible() {
                            tracing::debug!("tick while ineligible, skipped");
                            continue;
                        }
                        let doc = supplier();
                        this.push_to_cloud(&doc).await;
                    }
                }
            }
        });

        *self.periodic_slot() = Some(PeriodicSync {
            shutdown: shutdown_tx,
            _handle: handle,
        });
    }

    /// Cancel future periodic firings. Safe when nothing is armed; an
    /// in-flight push is left to complete.
    pub fn stop_periodic(&self) {
        if let Some(periodic) = self.periodic_slot().take() {
            let _ = periodic.shutdown.send(true);
            tracing::info!("periodic sync stopped");
        }
    }

    /// Best-effort counter bump for `(user, today, activity_type)`.
    /// Failures are logged, never surfaced.
    pub async fn record_activity(&self, activity_type: &str, count: i64) {
        if !self.auth.is_authenticated() {
            return;
        }
        let Some((token, user_id)) = self.auth.session_credentials() else {
            return;
        };

        let today = Utc::now().date_naive();
        if let Err(e) = self
            .table
            .bump_activity(&token, user_id, today, activity_type, count)
            .await
        {
            tracing::warn!(activity_type, error = %e, "failed to track activity");
        }
    }

    /// Best-effort append to the activity feed. Failures are logged,
    /// never surfaced.
    pub async fn log_activity(&self, event_type: &str, event_data: serde_json::Value) {
        if !self.auth.is_authenticated() {
            return;
        }
        let Some((token, user_id)) = self.auth.session_credentials() else {
            return;
        };

        if let Err(e) = self
            .table
            .append_event(&token, user_id, event_type, &event_data)
            .await
        {
            tracing::warn!(event_type, error = %e, "failed to log activity");
        }
    }

    pub fn sync_status(&self) -> SyncStatus {
        SyncStatus {
            enabled: self.auth.is_sync_eligible(),
            last_sync: *self
                .last_sync
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
            user: self.auth.current_user(),
        }
    }
}
