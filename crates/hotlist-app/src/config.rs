//! Application configuration loaded from environment variables.
//!
//! All settings have defaults so the app starts with zero configuration —
//! without backend credentials it simply runs against local data only.
//! Configuration is static for the process lifetime; there is no runtime
//! reconfiguration.

use std::path::PathBuf;
use std::time::Duration;

use hotlist_shared::constants::{DEFAULT_SYNC_INTERVAL_MS, DOCUMENT_SLOT};

/// Hosted backend settings.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Backend project endpoint, e.g. `https://abc.example-backend.co`.
    /// Env: `HOTLIST_BACKEND_URL`. Default: empty (cloud disabled).
    pub endpoint: String,

    /// Public project API key.
    /// Env: `HOTLIST_BACKEND_KEY`. Default: empty (cloud disabled).
    pub anon_key: String,

    /// Where redirect-based logins land after the provider round-trip.
    /// Env: `HOTLIST_REDIRECT_URL`. Default: the backend endpoint.
    pub redirect_to: String,
}

/// Local persistence settings.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Slot name for the cached document.
    /// Env: `HOTLIST_STORAGE_SLOT`. Default: `hotlist_data`.
    pub slot: String,

    /// Explicit database path override (tests, portable installs).
    /// Env: `HOTLIST_DB_PATH`. Default: the platform data directory.
    pub db_path: Option<PathBuf>,
}

/// Cloud sync settings.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Periodic push interval.
    /// Env: `HOTLIST_SYNC_INTERVAL_MS`. Default: 30000.
    pub interval: Duration,

    /// Feature flag gating cloud sync for the whole process.
    /// Env: `HOTLIST_SYNC_ENABLED` (true/false). Default: `true`.
    pub enabled: bool,
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub backend: BackendConfig,
    pub storage: StorageConfig,
    pub sync: SyncConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig {
                endpoint: String::new(),
                anon_key: String::new(),
                redirect_to: String::new(),
            },
            storage: StorageConfig {
                slot: DOCUMENT_SLOT.to_string(),
                db_path: None,
            },
            sync: SyncConfig {
                interval: Duration::from_millis(DEFAULT_SYNC_INTERVAL_MS),
                enabled: true,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("HOTLIST_BACKEND_URL") {
            config.backend.endpoint = url;
        }

        if let Ok(key) = std::env::var("HOTLIST_BACKEND_KEY") {
            config.backend.anon_key = key;
        }

        config.backend.redirect_to = match std::env::var("HOTLIST_REDIRECT_URL") {
            Ok(url) => url,
            Err(_) => config.backend.endpoint.clone(),
        };

        if let Ok(slot) = std::env::var("HOTLIST_STORAGE_SLOT") {
            if !slot.is_empty() {
                config.storage.slot = slot;
            }
        }

        if let Ok(path) = std::env::var("HOTLIST_DB_PATH") {
            if !path.is_empty() {
                config.storage.db_path = Some(PathBuf::from(path));
            }
        }

        if let Ok(val) = std::env::var("HOTLIST_SYNC_INTERVAL_MS") {
            match val.parse::<u64>() {
                Ok(ms) if ms > 0 => config.sync.interval = Duration::from_millis(ms),
                _ => {
                    tracing::warn!(value = %val, "Invalid HOTLIST_SYNC_INTERVAL_MS, using default");
                }
            }
        }

        if let Ok(val) = std::env::var("HOTLIST_SYNC_ENABLED") {
            config.sync.enabled = val != "false" && val != "0";
        }

        config
    }

    /// Whether backend credentials are present at all.
    pub fn has_backend(&self) -> bool {
        !self.backend.endpoint.trim().is_empty() && !self.backend.anon_key.trim().is_empty()
    }
}
