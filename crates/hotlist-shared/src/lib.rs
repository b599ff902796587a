//! # hotlist-shared
//!
//! Types shared by every Hotlist crate: the application document (the
//! single JSON aggregate holding clients, quotes and quote settings),
//! identity types for the hosted auth session, and wire-level constants.
//!
//! The document is always moved around as a whole — there is no per-field
//! versioning anywhere in the system.

pub mod constants;
pub mod document;
pub mod types;

pub use document::{AppDocument, ClientRecord, ClientStatus, Quotes, QuotesSettings};
pub use types::{Session, UserId, UserInfo};
