//! On-disk layout of the SQLite key-value backend.
//!
//! # Responsibility
//! - Open connections configured for `kv_entries` access.
//! - Bring the `kv_entries` schema up to the version this build writes.
//!
//! # Invariants
//! - The schema version lives in `PRAGMA user_version`.
//! - `SqliteBackend` only ever receives connections whose schema is current.

mod open;
pub mod schema;

pub use open::{open_kv_db, open_kv_db_in_memory};
