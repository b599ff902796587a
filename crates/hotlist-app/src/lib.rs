//! # hotlist-app
//!
//! The application controller: owns the single in-memory document, wires
//! the local store to the cloud layer, reacts to auth transitions, and
//! exposes the operations a frontend drives. The `hotlist` binary in this
//! crate is a minimal line-oriented frontend over the same controller.

pub mod config;
pub mod controller;

mod error;

pub use config::AppConfig;
pub use controller::{AppController, Controller, Notice};
pub use error::AppError;
