//! Shared setup for plugin-core integration tests

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::path::PathBuf;
use std::rc::Rc;

use plugin_core::{
    HookError, JsonSettings, ManagerConfig, Plugin, PluginEvent, PluginHooks, PluginManager,
};
use plugin_git::Git2Backend;
use plugin_registry::{PluginRegistry, RegistryDocument};
use plugin_test_utils::registry_json;
use tempfile::TempDir;

pub const UUID: &str = "550e8400-e29b-41d4-a716-446655440000";
pub const OTHER_UUID: &str = "6ba7b810-9dad-41d1-80b4-00c04fd430c8";

/// Hooks that record every call and can be told to refuse enabling.
#[derive(Clone, Default)]
pub struct RecordingHooks {
    pub calls: Rc<RefCell<Vec<String>>>,
    pub events: Rc<RefCell<Vec<PluginEvent>>>,
    pub fail_enable: Rc<Cell<bool>>,
}

impl PluginHooks for RecordingHooks {
    fn enable(&mut self, plugin: &Plugin) -> Result<(), HookError> {
        self.calls.borrow_mut().push(format!("enable {}", plugin.plugin_id));
        if self.fail_enable.get() {
            return Err("plugin crashed on load".into());
        }
        Ok(())
    }

    fn disable(&mut self, plugin: &Plugin) -> Result<(), HookError> {
        self.calls.borrow_mut().push(format!("disable {}", plugin.plugin_id));
        Ok(())
    }

    fn on_event(&mut self, event: &PluginEvent) {
        self.events.borrow_mut().push(event.clone());
    }
}

/// A manager rooted in a temp directory with a fixed registry document.
pub struct Harness {
    pub root: TempDir,
    pub hooks: RecordingHooks,
    pub manager: PluginManager,
    document: RegistryDocument,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_document(RegistryDocument::default())
    }

    /// Registry built from raw JSON plugin and blacklist entries.
    pub fn with_registry(plugins: &[&str], blacklist: &[&str]) -> Self {
        let document = serde_json::from_str(&registry_json(plugins, blacklist)).unwrap();
        Self::with_document(document)
    }

    pub fn with_document(document: RegistryDocument) -> Self {
        let root = TempDir::new().unwrap();
        let hooks = RecordingHooks::default();
        let manager = build(&root, &document, &hooks);
        Self {
            root,
            hooks,
            manager,
            document,
        }
    }

    /// Fresh manager over the same directories and settings, as after a
    /// restart.
    pub fn restart(&mut self) {
        self.hooks = RecordingHooks::default();
        self.manager = build(&self.root, &self.document, &self.hooks);
    }

    pub fn config(&self) -> ManagerConfig {
        ManagerConfig::from_root(self.root.path())
    }

    pub fn primary_dir(&self) -> PathBuf {
        self.config().primary_dir().to_path_buf()
    }

    pub fn events(&self) -> Vec<String> {
        self.hooks.events.borrow().iter().map(ToString::to_string).collect()
    }

    pub fn calls(&self) -> Vec<String> {
        self.hooks.calls.borrow().clone()
    }

    pub fn clear_log(&self) {
        self.hooks.calls.borrow_mut().clear();
        self.hooks.events.borrow_mut().clear();
    }
}

fn build(root: &TempDir, document: &RegistryDocument, hooks: &RecordingHooks) -> PluginManager {
    let config = ManagerConfig::from_root(root.path());
    let settings = JsonSettings::open(&config.settings_path).unwrap();
    PluginManager::with_parts(
        config,
        Box::new(Git2Backend::new()),
        PluginRegistry::with_document(document.clone()),
        Box::new(settings),
        Box::new(hooks.clone()),
    )
}

/// Registry entry JSON for a plugin.
pub fn registry_entry(id: &str, uuid: &str, git_url: &str, extra: &str) -> String {
    let git_url = serde_json::to_string(git_url).unwrap();
    let extra = if extra.is_empty() {
        String::new()
    } else {
        format!(", {extra}")
    };
    format!(r#"{{"id": "{id}", "uuid": "{uuid}", "name": "{id}", "git_url": {git_url}{extra}}}"#)
}
