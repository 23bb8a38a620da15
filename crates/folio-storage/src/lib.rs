//! Folio storage crate - SQLite persistence for conversation sessions.
//!
//! Provides a WAL-mode SQLite database with migrations and the
//! optimistic-concurrency session store the agent persists through.

pub mod db;
pub mod error;
pub mod migrations;
pub mod repository;

pub use db::Database;
pub use error::StoreError;
pub use repository::{SessionStore, SqliteSessionStore};
