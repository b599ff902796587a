use thiserror::Error;

/// Errors surfaced while assembling the application.
///
/// Day-to-day operation degrades instead of failing (cloud errors are
/// logged, local corruption falls back to defaults); these variants only
/// cover boot-time problems such as an unopenable local database.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Store error: {0}")]
    Store(#[from] hotlist_store::StoreError),

    #[error("Cloud error: {0}")]
    Cloud(#[from] hotlist_cloud::CloudError),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, AppError>;
