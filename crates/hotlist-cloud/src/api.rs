//! Trait seams over the hosted backend.
//!
//! The auth broadcaster and the sync orchestrator are generic over these
//! traits so their behavior can be exercised against in-memory fakes; the
//! `reqwest`-backed production implementations live in [`crate::rest`].

use std::future::Future;

use chrono::{DateTime, NaiveDate, Utc};
use hotlist_shared::{Session, UserId, UserInfo};

use crate::error::Result;

/// Identity-provider REST surface.
pub trait SessionApi: Send + Sync {
    /// Exchange a refresh token for a fresh session.
    fn refresh_session(
        &self,
        refresh_token: &str,
    ) -> impl Future<Output = Result<Session>> + Send;

    /// Resolve the user a (possibly URL-embedded) access token belongs to.
    fn fetch_user(&self, access_token: &str) -> impl Future<Output = Result<UserInfo>> + Send;

    /// Build the authorization URL for a redirect-based third-party login.
    fn authorize_url(&self, provider: &str, redirect_to: &str) -> Result<String>;

    /// Request a one-time email login link.
    fn request_magic_link(
        &self,
        email: &str,
        redirect_to: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Terminate the session behind `access_token`.
    fn sign_out(&self, access_token: &str) -> impl Future<Output = Result<()>> + Send;
}

/// One stored document row, as returned by the cloud table.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentRow {
    /// Serialized [`AppDocument`](hotlist_shared::AppDocument) JSON.
    pub data: String,
    pub updated_at: DateTime<Utc>,
}

/// Hosted table-storage surface.
///
/// Missing rows are a normal outcome (`Ok(None)`), never an error; the
/// `Err` variants are reserved for transport and backend failures.
pub trait TableApi: Send + Sync {
    /// Insert-or-update the single document row keyed by `user_id`.
    fn upsert_document(
        &self,
        access_token: &str,
        user_id: UserId,
        data: &str,
        updated_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Point lookup of the document row for `user_id`.
    fn fetch_document(
        &self,
        access_token: &str,
        user_id: UserId,
    ) -> impl Future<Output = Result<Option<DocumentRow>>> + Send;

    /// Increment (or create) the per-day activity counter for
    /// `(user_id, date, activity_type)`.
    fn bump_activity(
        &self,
        access_token: &str,
        user_id: UserId,
        date: NaiveDate,
        activity_type: &str,
        delta: i64,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Append one row to the activity event feed.
    fn append_event(
        &self,
        access_token: &str,
        user_id: UserId,
        event_type: &str,
        event_data: &serde_json::Value,
    ) -> impl Future<Output = Result<()>> + Send;
}
