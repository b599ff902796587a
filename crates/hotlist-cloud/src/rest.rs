//! `reqwest`-backed implementations of the backend trait seams.
//!
//! The hosted backend exposes two REST families:
//!
//! - auth endpoints under `{endpoint}/auth/v1/…` (token refresh, one-time
//!   email links, OAuth authorize redirects, logout, user lookup);
//! - table endpoints under `{endpoint}/rest/v1/{table}`, where an upsert
//!   is a POST with `Prefer: resolution=merge-duplicates` plus an
//!   `on_conflict` key, and a point lookup is a GET with an `eq.` filter
//!   that returns a JSON array (empty array = no row).
//!
//! Every request carries the project `apikey` header; requests on behalf
//! of a signed-in user additionally carry their access token as a bearer.

use std::future::Future;

use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Url;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use hotlist_shared::constants::{ACTIVITY_FEED_TABLE, ACTIVITY_METRICS_TABLE, DOCUMENT_TABLE};
use hotlist_shared::{Session, UserId, UserInfo};

use crate::api::{DocumentRow, SessionApi, TableApi};
use crate::error::{CloudError, Result};

/// Return the response unchanged on 2xx, otherwise surface status + body.
async fn ensure_success(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let message = resp.text().await.unwrap_or_default();
    Err(CloudError::Api {
        status: status.as_u16(),
        message,
    })
}

/// User payload as the auth endpoints report it.
#[derive(Debug, Deserialize)]
struct WireUser {
    id: Uuid,
    #[serde(default)]
    email: String,
    #[serde(default)]
    app_metadata: WireAppMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct WireAppMetadata {
    #[serde(default)]
    provider: Option<String>,
}

impl WireUser {
    fn into_user_info(self) -> UserInfo {
        UserInfo {
            id: UserId(self.id),
            email: self.email,
            provider: self.app_metadata.provider.unwrap_or_else(|| "email".into()),
        }
    }
}

/// Token-grant response payload.
#[derive(Debug, Deserialize)]
struct WireTokenGrant {
    access_token: String,
    refresh_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
    user: WireUser,
}

fn default_expires_in() -> i64 {
    3600
}

impl WireTokenGrant {
    fn into_session(self) -> Session {
        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: Utc::now() + chrono::Duration::seconds(self.expires_in),
            user: self.user.into_user_info(),
        }
    }
}

/// Identity-provider client.
#[derive(Clone)]
pub struct RestSessionApi {
    http: reqwest::Client,
    endpoint: String,
    anon_key: String,
}

impl RestSessionApi {
    /// Build a client for the given backend endpoint and project key.
    pub fn new(endpoint: &str, anon_key: &str) -> Result<Self> {
        if endpoint.trim().is_empty() || anon_key.trim().is_empty() {
            return Err(CloudError::MissingCredentials);
        }
        Ok(Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.trim().trim_end_matches('/').to_string(),
            anon_key: anon_key.trim().to_string(),
        })
    }

    fn auth_endpoint(&self, path: &str) -> String {
        format!("{}/auth/v1/{path}", self.endpoint)
    }
}

impl SessionApi for RestSessionApi {
    fn refresh_session(&self, refresh_token: &str) -> impl Future<Output = Result<Session>> + Send {
        async move {
            let url = self.auth_endpoint("token?grant_type=refresh_token");
            let resp = self
                .http
                .post(url)
                .header("apikey", &self.anon_key)
                .bearer_auth(&self.anon_key)
                .json(&json!({ "refresh_token": refresh_token }))
                .send()
                .await?;
            let grant: WireTokenGrant = ensure_success(resp).await?.json().await?;
            Ok(grant.into_session())
        }
    }

    fn fetch_user(&self, access_token: &str) -> impl Future<Output = Result<UserInfo>> + Send {
        async move {
            let resp = self
                .http
                .get(self.auth_endpoint("user"))
                .header("apikey", &self.anon_key)
                .bearer_auth(access_token)
                .send()
                .await?;
            let user: WireUser = ensure_success(resp).await?.json().await?;
            Ok(user.into_user_info())
        }
    }

    fn authorize_url(&self, provider: &str, redirect_to: &str) -> Result<String> {
        let mut url = Url::parse(&self.auth_endpoint("authorize"))
            .map_err(|e| CloudError::Config(format!("invalid backend endpoint: {e}")))?;
        url.query_pairs_mut()
            .append_pair("provider", provider)
            .append_pair("redirect_to", redirect_to);
        Ok(url.into())
    }

    fn request_magic_link(
        &self,
        email: &str,
        redirect_to: &str,
    ) -> impl Future<Output = Result<()>> + Send {
        async move {
            let mut url = Url::parse(&self.auth_endpoint("otp"))
                .map_err(|e| CloudError::Config(format!("invalid backend endpoint: {e}")))?;
            url.query_pairs_mut().append_pair("redirect_to", redirect_to);

            let resp = self
                .http
                .post(url)
                .header("apikey", &self.anon_key)
                .bearer_auth(&self.anon_key)
                .json(&json!({ "email": email, "create_user": true }))
                .send()
                .await?;
            ensure_success(resp).await?;
            Ok(())
        }
    }

    fn sign_out(&self, access_token: &str) -> impl Future<Output = Result<()>> + Send {
        async move {
            let resp = self
                .http
                .post(self.auth_endpoint("logout"))
                .header("apikey", &self.anon_key)
                .bearer_auth(access_token)
                .send()
                .await?;
            ensure_success(resp).await?;
            Ok(())
        }
    }
}

/// Document row as the table endpoint returns it.
#[derive(Debug, Deserialize)]
struct WireDocumentRow {
    data: String,
    updated_at: DateTime<Utc>,
}

/// Activity counter row, trimmed to the columns the increment needs.
#[derive(Debug, Deserialize)]
struct WireMetricRow {
    id: i64,
    count: i64,
}

/// Table-storage client.
#[derive(Clone)]
pub struct RestTableApi {
    http: reqwest::Client,
    endpoint: String,
    anon_key: String,
}

impl RestTableApi {
    /// Build a client for the given backend endpoint and project key.
    pub fn new(endpoint: &str, anon_key: &str) -> Result<Self> {
        if endpoint.trim().is_empty() || anon_key.trim().is_empty() {
            return Err(CloudError::MissingCredentials);
        }
        Ok(Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.trim().trim_end_matches('/').to_string(),
            anon_key: anon_key.trim().to_string(),
        })
    }

    fn table_endpoint(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.endpoint)
    }
}

impl TableApi for RestTableApi {
    fn upsert_document(
        &self,
        access_token: &str,
        user_id: UserId,
        data: &str,
        updated_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<()>> + Send {
        async move {
            let resp = self
                .http
                .post(self.table_endpoint(DOCUMENT_TABLE))
                .query(&[("on_conflict", "user_id")])
                .header("apikey", &self.anon_key)
                .header("Prefer", "resolution=merge-duplicates,return=minimal")
                .bearer_auth(access_token)
                .json(&json!({
                    "user_id": user_id,
                    "data": data,
                    "updated_at": updated_at.to_rfc3339(),
                }))
                .send()
                .await?;
            ensure_success(resp).await?;
            Ok(())
        }
    }

    fn fetch_document(
        &self,
        access_token: &str,
        user_id: UserId,
    ) -> impl Future<Output = Result<Option<DocumentRow>>> + Send {
        async move {
            let user_filter = format!("eq.{user_id}");
            let resp = self
                .http
                .get(self.table_endpoint(DOCUMENT_TABLE))
                .query(&[
                    ("select", "data,updated_at"),
                    ("user_id", user_filter.as_str()),
                    ("limit", "1"),
                ])
                .header("apikey", &self.anon_key)
                .bearer_auth(access_token)
                .send()
                .await?;
            let rows: Vec<WireDocumentRow> = ensure_success(resp).await?.json().await?;
            Ok(rows.into_iter().next().map(|row| DocumentRow {
                data: row.data,
                updated_at: row.updated_at,
            }))
        }
    }

    fn bump_activity(
        &self,
        access_token: &str,
        user_id: UserId,
        date: NaiveDate,
        activity_type: &str,
        delta: i64,
    ) -> impl Future<Output = Result<()>> + Send {
        async move {
            // Read the current counter first; the table has no atomic
            // increment, so this mirrors the select-then-write the backend
            // expects for these rows.
            let user_filter = format!("eq.{user_id}");
            let date_filter = format!("eq.{date}");
            let type_filter = format!("eq.{activity_type}");
            let resp = self
                .http
                .get(self.table_endpoint(ACTIVITY_METRICS_TABLE))
                .query(&[
                    ("select", "id,count"),
                    ("user_id", user_filter.as_str()),
                    ("date", date_filter.as_str()),
                    ("activity_type", type_filter.as_str()),
                    ("limit", "1"),
                ])
                .header("apikey", &self.anon_key)
                .bearer_auth(access_token)
                .send()
                .await?;
            let rows: Vec<WireMetricRow> = ensure_success(resp).await?.json().await?;

            let resp = match rows.first() {
                Some(row) => {
                    let id_filter = format!("eq.{}", row.id);
                    self.http
                        .patch(self.table_endpoint(ACTIVITY_METRICS_TABLE))
                        .query(&[("id", id_filter.as_str())])
                        .header("apikey", &self.anon_key)
                        .header("Prefer", "return=minimal")
                        .bearer_auth(access_token)
                        .json(&json!({
                            "count": row.count + delta,
                            "updated_at": Utc::now().to_rfc3339(),
                        }))
                        .send()
                        .await?
                }
                None => {
                    self.http
                        .post(self.table_endpoint(ACTIVITY_METRICS_TABLE))
                        .header("apikey", &self.anon_key)
                        .header("Prefer", "return=minimal")
                        .bearer_auth(access_token)
                        .json(&json!({
                            "user_id": user_id,
                            "date": date.to_string(),
                            "activity_type": activity_type,
                            "count": delta,
                        }))
                        .send()
                        .await?
                }
            };
            ensure_success(resp).await?;
            Ok(())
        }
    }

    fn append_event(
        &self,
        access_token: &str,
        user_id: UserId,
        event_type: &str,
        event_data: &serde_json::Value,
    ) -> impl Future<Output = Result<()>> + Send {
        async move {
            let resp = self
                .http
                .post(self.table_endpoint(ACTIVITY_FEED_TABLE))
                .header("apikey", &self.anon_key)
                .header("Prefer", "return=minimal")
                .bearer_auth(access_token)
                .json(&json!({
                    "user_id": user_id,
                    "event_type": event_type,
                    "event_data": event_data,
                }))
                .send()
                .await?;
            ensure_success(resp).await?;
            Ok(())
        }
    }
}
