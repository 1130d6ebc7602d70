//! Storage layer - SQLite-backed content store
//!
//! Single writer, concurrent readers, WAL journaling, idempotent
//! versioned migrations.

pub mod migrations;
mod sqlite;

pub use sqlite::{ContentStore, GardenerRunRecord, Result, StorageError};
