//! Persistent key-value backend contract and implementations.
//!
//! # Responsibility
//! - Define the async get/set/remove/list primitive consumed by collection
//!   stores.
//! - Provide a durable SQLite backend and a volatile in-memory backend.
//!
//! # Invariants
//! - Entries are addressed by `(collection key, record id)`; ids are always
//!   supplied by the caller.
//! - `list_by_key` returns entries in append order; overwriting an id keeps
//!   its original position.
//! - Expired entries are invisible to `get` and `list_by_key`.

use crate::model::record::RecordId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

mod memory;
mod sqlite;

pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;

pub type BackendResult<T> = Result<T, BackendError>;

/// Transport-level failure of a backend call.
#[derive(Debug)]
pub enum BackendError {
    /// Backend rejected or could not serve the call.
    Unavailable(String),
    /// Backend can no longer serve any call (worker gone, connection lost).
    Closed,
    Sqlite(rusqlite::Error),
    /// On-disk `kv_entries` schema is newer than this build understands.
    SchemaTooNew { found: u32, supported: u32 },
    /// Stored value could not be encoded or decoded.
    Serialization(serde_json::Error),
}

impl Display for BackendError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable(reason) => write!(f, "backend unavailable: {reason}"),
            Self::Closed => write!(f, "backend is closed"),
            Self::Sqlite(err) => write!(f, "sqlite: {err}"),
            Self::SchemaTooNew { found, supported } => write!(
                f,
                "kv_entries schema version {found} is newer than supported {supported}"
            ),
            Self::Serialization(err) => write!(f, "invalid stored value: {err}"),
        }
    }
}

impl Error for BackendError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::Serialization(err) => Some(err),
            Self::Unavailable(_) | Self::Closed | Self::SchemaTooNew { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for BackendError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value)
    }
}

/// Per-write options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// Entry becomes invisible after this instant. `None` never expires.
    pub expires_at: Option<DateTime<Utc>>,
}

/// Async key-value primitive backing collection stores.
#[async_trait]
pub trait KvBackend: Send + Sync {
    async fn get(&self, key: &str, id: RecordId) -> BackendResult<Option<Value>>;

    async fn set(
        &self,
        key: &str,
        id: RecordId,
        value: Value,
        options: SetOptions,
    ) -> BackendResult<()>;

    /// Removing an absent entry succeeds without effect.
    async fn remove(&self, key: &str, id: RecordId) -> BackendResult<()>;

    async fn list_by_key(&self, key: &str) -> BackendResult<Vec<(RecordId, Value)>>;
}

fn is_expired(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    expires_at.is_some_and(|at| at <= now)
}
