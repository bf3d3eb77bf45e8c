//! Volatile in-process backend.
//!
//! Used for tests and ephemeral sessions. Availability can be toggled to
//! simulate a backend that rejects every call.

use super::{is_expired, BackendError, BackendResult, KvBackend, SetOptions};
use crate::model::record::RecordId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone)]
struct Entry {
    id: RecordId,
    value: Value,
    expires_at: Option<DateTime<Utc>>,
}

/// In-memory key-value backend preserving append order per collection.
#[derive(Debug)]
pub struct MemoryBackend {
    collections: Mutex<HashMap<String, Vec<Entry>>>,
    available: AtomicBool,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            collections: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Makes every subsequent call fail with `BackendError::Unavailable`
    /// (`false`) or succeed again (`true`).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> BackendResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BackendError::Unavailable(
                "memory backend switched off".to_string(),
            ))
        }
    }

    fn with_collections<T>(
        &self,
        f: impl FnOnce(&mut HashMap<String, Vec<Entry>>) -> T,
    ) -> BackendResult<T> {
        self.ensure_available()?;
        let mut guard = self.collections.lock().map_err(|_| BackendError::Closed)?;
        Ok(f(&mut guard))
    }
}

#[async_trait]
impl KvBackend for MemoryBackend {
    async fn get(&self, key: &str, id: RecordId) -> BackendResult<Option<Value>> {
        let now = Utc::now();
        self.with_collections(|collections| {
            collections
                .get(key)
                .and_then(|entries| entries.iter().find(|entry| entry.id == id))
                .filter(|entry| !is_expired(entry.expires_at, now))
                .map(|entry| entry.value.clone())
        })
    }

    async fn set(
        &self,
        key: &str,
        id: RecordId,
        value: Value,
        options: SetOptions,
    ) -> BackendResult<()> {
        self.with_collections(|collections| {
            let entries = collections.entry(key.to_string()).or_default();
            let entry = Entry {
                id,
                value,
                expires_at: options.expires_at,
            };
            match entries.iter_mut().find(|existing| existing.id == id) {
                Some(existing) => *existing = entry,
                None => entries.push(entry),
            }
        })
    }

    async fn remove(&self, key: &str, id: RecordId) -> BackendResult<()> {
        self.with_collections(|collections| {
            if let Some(entries) = collections.get_mut(key) {
                entries.retain(|entry| entry.id != id);
            }
        })
    }

    async fn list_by_key(&self, key: &str) -> BackendResult<Vec<(RecordId, Value)>> {
        let now = Utc::now();
        self.with_collections(|collections| {
            collections
                .get(key)
                .map(|entries| {
                    entries
                        .iter()
                        .filter(|entry| !is_expired(entry.expires_at, now))
                        .map(|entry| (entry.id, entry.value.clone()))
                        .collect()
                })
                .unwrap_or_default()
        })
    }
}
