//! # habitat-store
//!
//! Durable issue storage for Habitat, backed by SQLite.
//!
//! The crate exposes a synchronous `Database` handle that wraps a
//! `rusqlite::Connection` and provides typed helpers for issues, their image
//! attachments and the authority table consulted for caller roles. Lifecycle
//! transitions are applied as guarded updates inside a single transaction.

pub mod authorities;
pub mod database;
pub mod issues;
pub mod migrations;
pub mod models;

mod error;

pub use database::Database;
pub use error::StoreError;
pub use models::*;
