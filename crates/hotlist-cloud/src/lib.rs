//! # hotlist-cloud
//!
//! Everything that talks to the hosted backend: the identity-provider
//! session client, the auth state broadcaster, the table-storage client,
//! and the document sync orchestrator.
//!
//! The backend is always optional. Every operation here degrades to a
//! logged warning and a safe return value (`false` / `None`) when the
//! network or the backend misbehaves; nothing in this crate may take the
//! application down or corrupt its in-memory state.
//!
//! The provider surfaces are trait seams ([`SessionApi`], [`TableApi`])
//! with `reqwest`-backed production implementations in [`rest`], so the
//! orchestration logic is testable against in-memory fakes.

pub mod api;
pub mod auth;
pub mod events;
pub mod redirect;
pub mod rest;
pub mod sync;

mod error;

pub use api::{DocumentRow, SessionApi, TableApi};
pub use auth::{AuthManager, SubscriptionId};
pub use error::CloudError;
pub use events::{AuthEvent, SessionEvent};
pub use rest::{RestSessionApi, RestTableApi};
pub use sync::{SyncManager, SyncStatus};
