//! Versioned `kv_entries` schema.
//!
//! Step `n` (1-based) upgrades a database from version `n - 1` to `n`.
//! Steps are append-only; an existing step is never edited.

use crate::backend::{BackendError, BackendResult};
use log::{debug, info};
use rusqlite::Connection;

const STEPS: &[&str] = &[include_str!("sql/0001_kv_entries.sql")];

/// Schema version written by this build.
pub const KV_SCHEMA_VERSION: u32 = STEPS.len() as u32;

/// Index that serves `list_by_key` in append order.
pub const SEQ_INDEX: &str = "idx_kv_entries_collection_seq";

/// Upgrades `conn` to [`KV_SCHEMA_VERSION`] in one transaction.
///
/// Returns the version found before the upgrade.
pub fn upgrade_kv_schema(conn: &mut Connection) -> BackendResult<u32> {
    let found = stored_version(conn)?;
    if found > KV_SCHEMA_VERSION {
        return Err(BackendError::SchemaTooNew {
            found,
            supported: KV_SCHEMA_VERSION,
        });
    }

    let pending = &STEPS[found as usize..];
    if pending.is_empty() {
        debug!("event=kv_schema module=db status=current version={found}");
        return Ok(found);
    }

    let tx = conn.transaction()?;
    for sql in pending {
        tx.execute_batch(sql)?;
    }
    tx.pragma_update(None, "user_version", KV_SCHEMA_VERSION)?;
    tx.commit()?;

    info!(
        "event=kv_schema module=db status=upgraded from_version={found} to_version={KV_SCHEMA_VERSION} steps={}",
        pending.len()
    );
    Ok(found)
}

/// Reads the schema version recorded in `conn`.
pub fn stored_version(conn: &Connection) -> BackendResult<u32> {
    Ok(conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?)
}
