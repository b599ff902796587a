/// Application name
pub const APP_NAME: &str = "Hotlist";

/// Cloud table holding one serialized document row per user
pub const DOCUMENT_TABLE: &str = "hotlist_data";

/// Cloud table holding per-day, per-type activity counters
pub const ACTIVITY_METRICS_TABLE: &str = "activity_metrics";

/// Cloud table holding the append-only activity event feed
pub const ACTIVITY_FEED_TABLE: &str = "activity_feed";

/// Local storage slot for the cached application document
pub const DOCUMENT_SLOT: &str = "hotlist_data";

/// Local storage slot for the persisted auth session
pub const SESSION_SLOT: &str = "auth_session";

/// Default periodic sync interval in milliseconds (30 seconds)
pub const DEFAULT_SYNC_INTERVAL_MS: u64 = 30_000;

/// Default quote rotation interval in seconds
pub const DEFAULT_QUOTE_INTERVAL_SECS: u32 = 15;

/// Seconds before nominal expiry at which a restored session is refreshed
pub const SESSION_EXPIRY_SLACK_SECS: i64 = 60;
