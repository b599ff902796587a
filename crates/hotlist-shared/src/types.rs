use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::SESSION_EXPIRY_SLACK_SECS;

// User identity = the id assigned by the hosted identity provider
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Display identity of the signed-in user.
///
/// There is at most one current user at a time; the auth layer replaces
/// the whole value on every state transition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserInfo {
    pub id: UserId,
    pub email: String,
    /// Auth provider name ("google", "github", ...); `"email"` for
    /// magic-link sign-ins or when the backend reports none.
    pub provider: String,
}

/// A live session with the hosted identity provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub user: UserInfo,
}

impl Session {
    /// Whether the access token is expired or close enough to expiry that
    /// it should be refreshed before use.
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - chrono::Duration::seconds(SESSION_EXPIRY_SLACK_SECS) <= now
    }
}
