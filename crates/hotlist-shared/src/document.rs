//! The application document: everything the user sees, as one aggregate.
//!
//! The document is serialized with the historical camelCase field names so
//! that payloads written by older builds (locally or in the cloud table)
//! keep deserializing. Every field carries `#[serde(default)]` and unknown
//! fields are ignored, so a partial or older payload degrades to defaults
//! instead of failing the whole load.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::DEFAULT_QUOTE_INTERVAL_SECS;

/// The single JSON aggregate representing all user-visible data.
///
/// Exactly one live copy exists in memory (owned by the app controller);
/// it is mirrored into the local store on every mutation and into the
/// cloud table on every sync tick. Loads replace the whole document
/// atomically.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct AppDocument {
    pub clients: Vec<ClientRecord>,
    pub quotes: Quotes,
    pub quotes_settings: QuotesSettings,
}

impl AppDocument {
    /// Whether the document carries any user data worth keeping.
    ///
    /// Settings are ignored here: they always hold defaults, so a document
    /// that differs only in settings is still "empty" for reconcile
    /// purposes.
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty() && self.quotes.raw.is_empty() && self.quotes.list.is_empty()
    }

    pub fn has_clients(&self) -> bool {
        !self.clients.is_empty()
    }
}

/// One entry on the hotlist.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientRecord {
    pub id: Uuid,
    pub name: String,
    pub company: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub notes: Option<String>,
    pub status: ClientStatus,
    pub added_at: DateTime<Utc>,
}

impl ClientRecord {
    /// A fresh record with only a name, defaults everywhere else.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

impl Default for ClientRecord {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4(),
            name: String::new(),
            company: None,
            email: None,
            phone: None,
            notes: None,
            status: ClientStatus::default(),
            added_at: Utc::now(),
        }
    }
}

/// How hot the lead is.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ClientStatus {
    Hot,
    #[default]
    Warm,
    Cold,
}

/// Motivational quotes: the raw text block plus the derived line list.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Quotes {
    pub raw: String,
    pub list: Vec<String>,
}

impl Quotes {
    /// Rebuild from a raw text block: one quote per non-blank line.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let list = raw
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_owned)
            .collect();
        Self { raw, list }
    }
}

/// Quote rotation settings, including the recently-shown ring used by the
/// no-repeat mode.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct QuotesSettings {
    /// Display interval in seconds.
    pub interval: u32,
    /// Pick the next quote at random instead of in order.
    pub random: bool,
    /// Avoid repeating recently shown quotes.
    pub norepeat: bool,
    /// Indices into `Quotes::list` of recently shown quotes, oldest first.
    pub recent: Vec<usize>,
}

impl QuotesSettings {
    /// Record that `index` was just shown, trimming the ring so it never
    /// covers more than half of `list_len` (otherwise no-repeat mode would
    /// eventually exclude every quote).
    pub fn remember_shown(&mut self, index: usize, list_len: usize) {
        self.recent.push(index);
        let cap = (list_len / 2).max(1);
        while self.recent.len() > cap {
            self.recent.remove(0);
        }
    }
}

impl Default for QuotesSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_QUOTE_INTERVAL_SECS,
            random: true,
            norepeat: true,
            recent: Vec::new(),
        }
    }
}
