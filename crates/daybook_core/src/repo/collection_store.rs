//! Keyed collection store.
//!
//! # Responsibility
//! - Provide upsert/delete/list over named collections of records.
//! - Allocate the next free record id from a full record set.
//!
//! # Invariants
//! - `upsert` is last-write-wins with full payload replacement.
//! - Deleting an absent id is a no-op.
//! - `list` fails open: backend errors yield an empty list, logged at `warn`.

use crate::backend::{BackendError, KvBackend, SetOptions};
use crate::config::{StorageConfig, DEFAULT_ID_BASELINE};
use crate::model::record::{payload_from_value, Payload, PayloadError, Record, RecordId};
use chrono::{Duration, Utc};
use log::{error, warn};
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

pub type StoreResult<T> = Result<T, StoreError>;

/// Error surfaced by collection store operations.
#[derive(Debug)]
pub enum StoreError {
    /// Backend rejected the read or write.
    BackendUnavailable(BackendError),
    /// Persisted value is not a valid record payload.
    InvalidData {
        collection: String,
        id: RecordId,
        source: PayloadError,
    },
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BackendUnavailable(err) => write!(f, "{err}"),
            Self::InvalidData {
                collection,
                id,
                source,
            } => write!(f, "invalid record {collection}/{id}: {source}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::BackendUnavailable(err) => Some(err),
            Self::InvalidData { source, .. } => Some(source),
        }
    }
}

impl From<BackendError> for StoreError {
    fn from(value: BackendError) -> Self {
        Self::BackendUnavailable(value)
    }
}

/// Returns `max(id) + 1` over `records`, or the default baseline when empty.
pub fn next_id(records: &[Record]) -> RecordId {
    next_id_from(records, DEFAULT_ID_BASELINE)
}

/// Same as [`next_id`] with a caller-chosen baseline.
///
/// Considers every record, regardless of the order they are supplied in.
pub fn next_id_from(records: &[Record], baseline: RecordId) -> RecordId {
    records
        .iter()
        .map(|record| record.id)
        .max()
        .map_or(baseline, |max| max + 1)
}

/// Collection-oriented facade over an injected key-value backend.
pub struct KeyedCollectionStore<B: KvBackend + ?Sized> {
    backend: Arc<B>,
    default_expiry: Option<Duration>,
}

impl<B: KvBackend + ?Sized> Clone for KeyedCollectionStore<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            default_expiry: self.default_expiry,
        }
    }
}

impl<B: KvBackend + ?Sized> KeyedCollectionStore<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            default_expiry: None,
        }
    }

    /// Creates a store applying `config.default_expiry_secs` to every write.
    pub fn with_config(backend: Arc<B>, config: &StorageConfig) -> Self {
        let default_expiry = config
            .default_expiry_secs
            .and_then(|secs| i64::try_from(secs).ok())
            .and_then(Duration::try_seconds);
        Self {
            backend,
            default_expiry,
        }
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Writes `payload` under `id`, replacing any previous payload.
    ///
    /// # Errors
    /// - `StoreError::BackendUnavailable` when the backend rejects the write.
    pub async fn upsert(&self, key: &str, id: RecordId, payload: Payload) -> StoreResult<()> {
        let options = SetOptions {
            expires_at: self
                .default_expiry
                .and_then(|ttl| Utc::now().checked_add_signed(ttl)),
        };
        self.backend
            .set(key, id, Value::Object(payload), options)
            .await
            .map_err(|err| {
                error!(
                    "event=record_upsert module=repo status=error collection={key} id={id} error={err}"
                );
                StoreError::from(err)
            })
    }

    /// Removes `id` from the collection; absent ids are ignored.
    pub async fn delete(&self, key: &str, id: RecordId) -> StoreResult<()> {
        self.backend.remove(key, id).await.map_err(|err| {
            error!("event=record_delete module=repo status=error collection={key} id={id} error={err}");
            StoreError::from(err)
        })
    }

    /// Lists records in backend-native order, failing open to an empty list.
    pub async fn list(&self, key: &str) -> Vec<Record> {
        match self.try_list(key).await {
            Ok(records) => records,
            Err(err) => {
                warn!("event=record_list module=repo status=fail_open collection={key} error={err}");
                Vec::new()
            }
        }
    }

    /// Lists records in backend-native order, propagating failures.
    pub async fn try_list(&self, key: &str) -> StoreResult<Vec<Record>> {
        self.backend
            .list_by_key(key)
            .await?
            .into_iter()
            .map(|(id, value)| to_record(key, id, value))
            .collect()
    }

    /// Loads a single record.
    pub async fn get(&self, key: &str, id: RecordId) -> StoreResult<Option<Record>> {
        match self.backend.get(key, id).await? {
            Some(value) => Ok(Some(to_record(key, id, value)?)),
            None => Ok(None),
        }
    }
}

fn to_record(key: &str, id: RecordId, value: Value) -> StoreResult<Record> {
    payload_from_value(value)
        .map(|payload| Record::new(id, payload))
        .map_err(|source| StoreError::InvalidData {
            collection: key.to_string(),
            id,
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::{next_id, next_id_from, Record};
    use serde_json::Map;

    fn record(id: i64) -> Record {
        Record::new(id, Map::new())
    }

    #[test]
    fn next_id_uses_baseline_for_empty_set() {
        assert_eq!(next_id(&[]), 1000);
        assert_eq!(next_id_from(&[], 1), 1);
    }

    #[test]
    fn next_id_takes_maximum_regardless_of_order() {
        let records = vec![record(1003), record(1010), record(1001)];
        assert_eq!(next_id(&records), 1011);
    }
}
