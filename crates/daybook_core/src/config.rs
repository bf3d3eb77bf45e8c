//! Runtime configuration.
//!
//! # Responsibility
//! - Collect tunables shared by stores, sessions and controllers.
//! - Deserialize from JSON with every field optional.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Id assigned to the first record of an empty collection.
pub const DEFAULT_ID_BASELINE: i64 = 1000;
/// Lifetime of a toast notification.
pub const DEFAULT_TOAST_DURATION_MS: u64 = 1000;

/// Top-level settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaybookConfig {
    pub toast_duration_ms: u64,
    pub id_baseline: i64,
    pub storage: StorageConfig,
}

impl Default for DaybookConfig {
    fn default() -> Self {
        Self {
            toast_duration_ms: DEFAULT_TOAST_DURATION_MS,
            id_baseline: DEFAULT_ID_BASELINE,
            storage: StorageConfig::default(),
        }
    }
}

impl DaybookConfig {
    /// Parses a JSON document; absent fields take their defaults.
    pub fn from_json_str(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn toast_duration(&self) -> Duration {
        Duration::from_millis(self.toast_duration_ms)
    }
}

/// Backend settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Serve repeated single-record reads from memory.
    pub enable_cache: bool,
    /// Expiry applied to every write. `None` keeps records forever.
    pub default_expiry_secs: Option<u64>,
}
