//! A complete plugin host on disk: plugin directory, settings file and a
//! registry document served from a local file.

#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;

use plugin_core::{InitReport, ManagerConfig, PluginManager, PluginMetadata};
use plugin_fs::NormalizedPath;
use plugin_fs::digest::sha256_hex;
use plugin_registry::RegistryConfig;
use plugin_test_utils::registry_json;
use serde_json::Value;
use tempfile::TempDir;

pub const UUID: &str = "550e8400-e29b-41d4-a716-446655440000";
pub const OTHER_UUID: &str = "6ba7b810-9dad-41d1-80b4-00c04fd430c8";

pub struct World {
    pub root: TempDir,
    pub manager: PluginManager,
}

impl World {
    pub fn new() -> Self {
        Self::with_registry(&[], &[])
    }

    pub fn with_registry(plugins: &[&str], blacklist: &[&str]) -> Self {
        let root = TempDir::new().unwrap();
        fs::write(root.path().join("registry.json"), registry_json(plugins, blacklist)).unwrap();
        let manager = start(&root).0;
        Self { root, manager }
    }

    /// Replace the registry document. The running manager sees it after a
    /// refresh or a restart.
    pub fn publish_registry(&self, plugins: &[&str], blacklist: &[&str]) {
        fs::write(self.registry_file(), registry_json(plugins, blacklist)).unwrap();
    }

    /// Start a new manager over the same files, as the host does on launch.
    pub fn restart(&mut self) -> InitReport {
        let (manager, report) = start(&self.root);
        self.manager = manager;
        report
    }

    pub fn registry_file(&self) -> PathBuf {
        self.root.path().join("registry.json")
    }

    pub fn plugin_dir(&self) -> PathBuf {
        self.root.path().join("plugins")
    }

    /// The settings file as the host would read it.
    pub fn settings(&self) -> Value {
        let path = self.root.path().join("settings.json");
        match fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text).unwrap(),
            Err(_) => Value::Object(Default::default()),
        }
    }

    pub fn metadata_records(&self) -> serde_json::Map<String, Value> {
        match self.settings().get("plugins.metadata") {
            Some(Value::Object(records)) => records.clone(),
            _ => Default::default(),
        }
    }

    pub fn metadata(&mut self, plugin_id: &str) -> PluginMetadata {
        self.manager.plugin_metadata(plugin_id).unwrap().unwrap()
    }

    /// Digest of a file inside an installed plugin.
    pub fn file_digest(&self, plugin_id: &str, file: &str) -> String {
        let path = NormalizedPath::new(self.plugin_dir().join(plugin_id).join(file));
        sha256_hex(&plugin_fs::io::read_text(&path).unwrap())
    }
}

fn start(root: &TempDir) -> (PluginManager, InitReport) {
    let registry_url = root.path().join("registry.json").to_string_lossy().into_owned();
    let config = ManagerConfig::from_root(root.path())
        .with_registry(RegistryConfig::new(vec![registry_url]));
    let mut manager = PluginManager::new(config).unwrap();
    let report = manager.init_plugins().unwrap();
    (manager, report)
}

/// Registry entry JSON for a plugin.
pub fn entry(id: &str, uuid: &str, git_url: &str, extra: &str) -> String {
    let git_url = serde_json::to_string(git_url).unwrap();
    let extra = if extra.is_empty() {
        String::new()
    } else {
        format!(", {extra}")
    };
    format!(r#"{{"id": "{id}", "uuid": "{uuid}", "name": "{id}", "git_url": {git_url}{extra}}}"#)
}

/// Blacklist entry JSON from optional uuid and url.
pub fn ban(uuid: Option<&str>, url: Option<&str>, reason: &str) -> String {
    let mut fields = Vec::new();
    if let Some(uuid) = uuid {
        fields.push(format!(r#""uuid": "{uuid}""#));
    }
    if let Some(url) = url {
        fields.push(format!(r#""url": {}"#, serde_json::to_string(url).unwrap()));
    }
    fields.push(format!(r#""reason": "{reason}""#));
    format!("{{{}}}", fields.join(", "))
}
