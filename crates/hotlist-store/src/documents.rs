//! Typed access to the cached application document.
//!
//! The local copy is a cache and offline fallback: reads never fail the
//! caller. A missing or corrupt slot degrades to the default (empty)
//! document with a logged warning, per the overall policy that the app
//! stays usable against local data alone.

use hotlist_shared::AppDocument;

use crate::database::Database;
use crate::error::Result;

impl Database {
    /// Load the document cached in `slot`, falling back to the default
    /// shape when the slot is missing, unreadable, or holds corrupt JSON.
    pub fn load_document(&self, slot: &str) -> AppDocument {
        let raw = match self.get_slot(slot) {
            Ok(Some(raw)) => raw,
            Ok(None) => return AppDocument::default(),
            Err(e) => {
                tracing::warn!(slot, error = %e, "failed to read cached document, using default");
                return AppDocument::default();
            }
        };

        match serde_json::from_str(&raw) {
            Ok(doc) => doc,
            Err(e) => {
                tracing::warn!(slot, error = %e, "cached document is corrupt, using default");
                AppDocument::default()
            }
        }
    }

    /// Serialize and store the document into `slot`.
    pub fn save_document(&self, slot: &str, doc: &AppDocument) -> Result<()> {
        let json = serde_json::to_string(doc)?;
        self.put_slot(slot, &json)
    }
}
