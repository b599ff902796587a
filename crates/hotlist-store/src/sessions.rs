//! Persisted auth session.
//!
//! The identity provider session (tokens + user) is kept in its own slot
//! so sign-ins survive restarts. A corrupt slot reads as "no session" —
//! the user just signs in again.

use hotlist_shared::constants::SESSION_SLOT;
use hotlist_shared::Session;

use crate::database::Database;
use crate::error::Result;

impl Database {
    /// Load the persisted session, if any.
    pub fn load_session(&self) -> Option<Session> {
        let raw = match self.get_slot(SESSION_SLOT) {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read persisted session");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(session) => Some(session),
            Err(e) => {
                tracing::warn!(error = %e, "persisted session is corrupt, ignoring");
                None
            }
        }
    }

    /// Persist the current session.
    pub fn save_session(&self, session: &Session) -> Result<()> {
        let json = serde_json::to_string(session)?;
        self.put_slot(SESSION_SLOT, &json)
    }

    /// Forget the persisted session.
    pub fn clear_session(&self) -> Result<()> {
        self.delete_slot(SESSION_SLOT)
    }
}
