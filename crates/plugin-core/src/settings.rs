//! Persistent key/value settings
//!
//! The manager keeps three kinds of state in the host's settings:
//!
//! - `plugins.metadata`: install metadata keyed by plugin UUID
//! - `plugins.enabled`: UUIDs of enabled plugins
//! - `plugin.<uuid>`: options saved by the plugin itself
//!
//! [`SettingsStore`] is the seam to the host's own settings system;
//! [`JsonSettings`] is a standalone file-backed implementation.

use std::collections::BTreeMap;
use std::path::Path;

use plugin_fs::{ConfigStore, NormalizedPath};
use serde_json::Value;

use crate::Result;

pub const METADATA_KEY: &str = "plugins.metadata";
pub const ENABLED_KEY: &str = "plugins.enabled";
const OPTIONS_PREFIX: &str = "plugin.";

/// Settings key holding a plugin's saved options.
pub fn options_key(uuid: &str) -> String {
    format!("{OPTIONS_PREFIX}{uuid}")
}

/// UUID of a `plugin.<uuid>` options key.
pub fn uuid_from_options_key(key: &str) -> Option<&str> {
    key.strip_prefix(OPTIONS_PREFIX).filter(|uuid| !uuid.is_empty())
}

/// Key/value settings backend.
pub trait SettingsStore {
    fn get(&self, key: &str) -> Option<Value>;

    /// Store `value` and persist it.
    fn set(&mut self, key: &str, value: Value) -> Result<()>;

    /// Remove `key`, returning whether it existed.
    fn remove(&mut self, key: &str) -> Result<bool>;

    fn keys(&self) -> Vec<String>;
}

/// Settings kept in a single JSON file, rewritten atomically on every
/// change.
#[derive(Debug)]
pub struct JsonSettings {
    path: NormalizedPath,
    values: BTreeMap<String, Value>,
    store: ConfigStore,
}

impl JsonSettings {
    /// Open the settings file, starting empty when it does not exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = NormalizedPath::new(path.as_ref());
        let store = ConfigStore::new();
        let values = store.load_optional(&path)?.unwrap_or_default();
        tracing::debug!(path = %path, "Opened settings");
        Ok(Self {
            path,
            values,
            store,
        })
    }

    pub fn path(&self) -> &NormalizedPath {
        &self.path
    }

    fn persist(&self) -> Result<()> {
        self.store.save(&self.path, &self.values)?;
        Ok(())
    }
}

impl SettingsStore for JsonSettings {
    fn get(&self, key: &str) -> Option<Value> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: Value) -> Result<()> {
        self.values.insert(key.to_string(), value);
        self.persist()
    }

    fn remove(&mut self, key: &str) -> Result<bool> {
        if self.values.remove(key).is_none() {
            return Ok(false);
        }
        self.persist()?;
        Ok(true)
    }

    fn keys(&self) -> Vec<String> {
        self.values.keys().cloned().collect()
    }
}

/// Settings that live only as long as the process.
#[derive(Debug, Default, Clone)]
pub struct MemorySettings {
    values: BTreeMap<String, Value>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemorySettings {
    fn get(&self, key: &str) -> Option<Value> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: Value) -> Result<()> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<bool> {
        Ok(self.values.remove(key).is_some())
    }

    fn keys(&self) -> Vec<String> {
        self.values.keys().cloned().collect()
    }
}
