//! Auth event vocabulary.
//!
//! Two layers of events exist. [`SessionEvent`] is what the identity
//! provider reports (sign-in, sign-out, token refresh, profile update).
//! [`AuthEvent`] is what the rest of the application subscribes to: the
//! broadcaster collapses provider noise into identity changes plus
//! human-readable auth failures.

use hotlist_shared::{Session, UserInfo};

/// Notification delivered to [`AuthManager`](crate::AuthManager)
/// subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthEvent {
    /// The resolved user identity changed: `Some` on login, `None` on
    /// logout. Not emitted for token refreshes or same-user updates.
    UserChanged(Option<UserInfo>),
    /// An authentication flow failed in a way the user should see
    /// (expired magic link, denied access, unverifiable sign-in link).
    Error { message: String },
}

/// A state-change event at the identity-provider level.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    SignedIn(Session),
    SignedOut,
    TokenRefreshed(Session),
    UserUpdated(Session),
}
