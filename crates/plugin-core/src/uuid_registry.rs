//! UUID to plugin id mapping
//!
//! Extension points identify their owner by UUID; the host resolves it to
//! the plugin directory through this registry.

use std::collections::BTreeMap;

#[derive(Debug, Default, Clone)]
pub struct UuidRegistry {
    entries: BTreeMap<String, String>,
}

impl UuidRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `uuid` to `plugin_id`, replacing any previous mapping.
    pub fn register(&mut self, uuid: &str, plugin_id: &str) {
        if let Some(previous) = self.entries.insert(uuid.to_string(), plugin_id.to_string())
            && previous != plugin_id
        {
            tracing::debug!(uuid, previous = %previous, plugin_id, "Remapped plugin UUID");
        }
    }

    pub fn unregister(&mut self, uuid: &str) -> Option<String> {
        self.entries.remove(uuid)
    }

    pub fn plugin_id(&self, uuid: &str) -> Option<&str> {
        self.entries.get(uuid).map(String::as_str)
    }

    pub fn contains(&self, uuid: &str) -> bool {
        self.entries.contains_key(uuid)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forget every mapping.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
