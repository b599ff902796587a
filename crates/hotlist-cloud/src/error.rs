use thiserror::Error;

/// Errors produced when talking to the hosted backend.
#[derive(Error, Debug)]
pub enum CloudError {
    /// Transport-level failure (connection, TLS, timeout).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered with a non-success status.
    #[error("Backend returned {status}: {message}")]
    Api { status: u16, message: String },

    /// JSON (de)serialization failure on a request or response body.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Backend endpoint or key not configured.
    #[error("Backend credentials are not configured")]
    MissingCredentials,

    /// Malformed configuration value (e.g. an unparseable endpoint URL).
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CloudError>;
