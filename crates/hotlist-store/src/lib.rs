//! # hotlist-store
//!
//! Local persistence for the Hotlist application, backed by SQLite.
//!
//! The store is deliberately small: a single `slots` table of string-keyed
//! JSON values. One slot caches the application document so the app works
//! fully offline; another holds the persisted auth session so sign-ins
//! survive restarts. The crate exposes a synchronous [`Database`] handle
//! that wraps a `rusqlite::Connection` plus typed helpers for both slots.

pub mod database;
pub mod documents;
pub mod migrations;
pub mod sessions;

mod error;

pub use database::Database;
pub use error::StoreError;
