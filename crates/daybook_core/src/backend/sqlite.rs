//! Durable SQLite-backed key-value backend.
//!
//! # Responsibility
//! - Persist entries in `kv_entries` so they survive process restarts.
//! - Run blocking SQLite work off the async scheduler.
//! - Optionally serve repeated `get` calls from an in-memory cache.
//!
//! # Invariants
//! - `seq` is assigned on first insert of an id and never changes on overwrite.
//! - Cache entries are invalidated by every `set`/`remove` of the same id.

use super::{is_expired, BackendError, BackendResult, KvBackend, SetOptions};
use crate::db::{open_kv_db, open_kv_db_in_memory};
use crate::model::record::RecordId;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use log::{debug, warn};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

type CacheKey = (String, RecordId);

#[derive(Debug, Clone)]
struct CachedEntry {
    value: Value,
    expires_at: Option<DateTime<Utc>>,
}

/// Key-value backend persisted in a SQLite database.
#[derive(Clone)]
pub struct SqliteBackend {
    conn: Arc<Mutex<Connection>>,
    cache: Option<Arc<Mutex<HashMap<CacheKey, CachedEntry>>>>,
}

impl SqliteBackend {
    /// Wraps an already migrated connection.
    pub fn new(conn: Connection, enable_cache: bool) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            cache: enable_cache.then(|| Arc::new(Mutex::new(HashMap::new()))),
        }
    }

    /// Opens (and migrates) a database file.
    pub fn open(path: impl AsRef<Path>, enable_cache: bool) -> BackendResult<Self> {
        Ok(Self::new(open_kv_db(path)?, enable_cache))
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory(enable_cache: bool) -> BackendResult<Self> {
        Ok(Self::new(open_kv_db_in_memory()?, enable_cache))
    }

    async fn with_conn<T, F>(&self, op: &'static str, f: F) -> BackendResult<T>
    where
        F: FnOnce(&Connection) -> BackendResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().map_err(|_| BackendError::Closed)?;
            f(&guard)
        })
        .await
        .map_err(|err| {
            warn!("event={op} module=backend status=closed error={err}");
            BackendError::Closed
        })?
    }

    fn cached(&self, key: &str, id: RecordId) -> Option<CachedEntry> {
        let cache = self.cache.as_ref()?;
        let guard = cache.lock().ok()?;
        guard.get(&(key.to_string(), id)).cloned()
    }

    fn update_cache(&self, key: &str, id: RecordId, entry: Option<CachedEntry>) {
        let Some(cache) = self.cache.as_ref() else {
            return;
        };
        if let Ok(mut guard) = cache.lock() {
            match entry {
                Some(entry) => guard.insert((key.to_string(), id), entry),
                None => guard.remove(&(key.to_string(), id)),
            };
        }
    }
}

#[async_trait]
impl KvBackend for SqliteBackend {
    async fn get(&self, key: &str, id: RecordId) -> BackendResult<Option<Value>> {
        let now = Utc::now();
        if let Some(entry) = self.cached(key, id) {
            if is_expired(entry.expires_at, now) {
                return Ok(None);
            }
            return Ok(Some(entry.value));
        }

        let collection = key.to_string();
        let row = self
            .with_conn("kv_get", move |conn| {
                let row = conn
                    .query_row(
                        "SELECT value, expires_at FROM kv_entries
                         WHERE collection = ?1 AND id = ?2;",
                        params![collection, id],
                        |row| Ok((row.get::<_, String>(0)?, row.get::<_, Option<i64>>(1)?)),
                    )
                    .optional()?;
                Ok(row)
            })
            .await?;

        let Some((raw, expires_at_ms)) = row else {
            return Ok(None);
        };
        let entry = CachedEntry {
            value: serde_json::from_str(&raw)?,
            expires_at: expires_at_ms.and_then(from_epoch_ms),
        };
        self.update_cache(key, id, Some(entry.clone()));

        if is_expired(entry.expires_at, now) {
            return Ok(None);
        }
        Ok(Some(entry.value))
    }

    async fn set(
        &self,
        key: &str,
        id: RecordId,
        value: Value,
        options: SetOptions,
    ) -> BackendResult<()> {
        let raw = serde_json::to_string(&value)?;
        let collection = key.to_string();
        let expires_at_ms = options.expires_at.map(|at| at.timestamp_millis());
        self.with_conn("kv_set", move |conn| {
            conn.execute(
                "INSERT INTO kv_entries (collection, id, seq, value, expires_at)
                 VALUES (
                    ?1,
                    ?2,
                    (SELECT COALESCE(MAX(seq), 0) + 1 FROM kv_entries WHERE collection = ?1),
                    ?3,
                    ?4
                 )
                 ON CONFLICT (collection, id) DO UPDATE SET
                    value = excluded.value,
                    expires_at = excluded.expires_at;",
                params![collection, id, raw, expires_at_ms],
            )?;
            Ok(())
        })
        .await?;

        self.update_cache(
            key,
            id,
            Some(CachedEntry {
                value,
                expires_at: options.expires_at,
            }),
        );
        debug!("event=kv_set module=backend status=ok collection={key} id={id}");
        Ok(())
    }

    async fn remove(&self, key: &str, id: RecordId) -> BackendResult<()> {
        let collection = key.to_string();
        let removed = self
            .with_conn("kv_remove", move |conn| {
                Ok(conn.execute(
                    "DELETE FROM kv_entries WHERE collection = ?1 AND id = ?2;",
                    params![collection, id],
                )?)
            })
            .await?;

        self.update_cache(key, id, None);
        debug!("event=kv_remove module=backend status=ok collection={key} id={id} removed={removed}");
        Ok(())
    }

    async fn list_by_key(&self, key: &str) -> BackendResult<Vec<(RecordId, Value)>> {
        let collection = key.to_string();
        let now_ms = Utc::now().timestamp_millis();
        let rows = self
            .with_conn("kv_list", move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, value FROM kv_entries
                     WHERE collection = ?1
                       AND (expires_at IS NULL OR expires_at > ?2)
                     ORDER BY seq ASC;",
                )?;
                let mut rows = stmt.query(params![collection, now_ms])?;
                let mut entries = Vec::new();
                while let Some(row) = rows.next()? {
                    entries.push((row.get::<_, RecordId>(0)?, row.get::<_, String>(1)?));
                }
                Ok(entries)
            })
            .await?;

        rows.into_iter()
            .map(|(id, raw)| Ok((id, serde_json::from_str(&raw)?)))
            .collect()
    }
}

fn from_epoch_ms(value: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(value).single()
}
