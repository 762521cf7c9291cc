//! # parley-store
//!
//! Local storage for the parley client, backed by SQLite.
//!
//! The crate exposes a synchronous [`Database`] handle with a small
//! key-value table, the [`LocalStorage`] boundary the rest of the client
//! uses, and the [`SnapshotCache`] that mirrors the last rendered message
//! list for warm starts.

pub mod database;
pub mod kv;
pub mod migrations;
pub mod snapshot;
pub mod storage;

mod error;

pub use database::Database;
pub use error::StoreError;
pub use snapshot::SnapshotCache;
pub use storage::{LocalStorage, MemoryStorage, SqliteStorage};
