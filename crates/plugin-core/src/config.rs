//! Manager configuration
//!
//! Paths default to the platform's data, cache and config directories.
//! `PLUGIN_MANAGER_DIR` relocates all three under one root, and an
//! optional config file (`config.toml` next to the settings, or an
//! explicit path in any format [`ConfigStore`] understands) overrides
//! individual values.

use std::path::{Path, PathBuf};
use std::time::Duration;

use plugin_fs::{ConfigStore, NormalizedPath};
use plugin_registry::{RegistryConfig, RetryPolicy};
use serde::{Deserialize, Serialize};

use crate::Result;

/// Environment variable that relocates every manager path under one root.
pub const MANAGER_DIR_ENV: &str = "PLUGIN_MANAGER_DIR";

/// Host API versions supported when the config does not say otherwise.
pub const DEFAULT_API_VERSIONS: &[&str] = &["3.0"];

const APP_DIR: &str = "plugin-manager";
const CONFIG_FILE: &str = "config.toml";

/// Contents of the optional config file. Every field may be omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub plugin_dirs: Vec<PathBuf>,
    pub cache_dir: Option<PathBuf>,
    pub settings_path: Option<PathBuf>,
    pub host_api_versions: Vec<String>,
    pub registry: RegistrySection,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySection {
    pub urls: Vec<String>,
    pub max_attempts: Option<u32>,
    pub timeout_secs: Option<u64>,
}

/// Resolved configuration for a [`PluginManager`](crate::PluginManager).
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Plugin roots; the first is the primary directory installs go to.
    pub plugin_dirs: Vec<PathBuf>,
    pub cache_dir: PathBuf,
    pub settings_path: PathBuf,
    pub registry: RegistryConfig,
    pub host_api_versions: Vec<String>,
}

impl ManagerConfig {
    /// Everything under `root`: `plugins/`, `cache/` and `settings.json`.
    pub fn from_root(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self::with_paths(
            root.join("plugins"),
            root.join("cache"),
            root.join("settings.json"),
        )
    }

    fn with_paths(plugin_dir: PathBuf, cache_dir: PathBuf, settings_path: PathBuf) -> Self {
        Self {
            plugin_dirs: vec![plugin_dir],
            registry: RegistryConfig::default().with_cache_dir(&cache_dir),
            cache_dir,
            settings_path,
            host_api_versions: DEFAULT_API_VERSIONS.iter().map(|v| v.to_string()).collect(),
        }
    }

    /// Platform defaults, or everything under `PLUGIN_MANAGER_DIR` when set.
    pub fn defaults() -> Self {
        if let Some(root) = std::env::var_os(MANAGER_DIR_ENV).filter(|v| !v.is_empty()) {
            return Self::from_root(PathBuf::from(root));
        }
        let fallback = || PathBuf::from(".").join(format!(".{APP_DIR}"));
        let data = dirs::data_dir().unwrap_or_else(fallback).join(APP_DIR);
        let cache = dirs::cache_dir().unwrap_or_else(fallback).join(APP_DIR);
        let config = config_root();
        Self::with_paths(data.join("plugins"), cache, config.join("settings.json"))
    }

    /// Defaults overlaid with a config file.
    ///
    /// An explicit `path` must exist. Without one, the default
    /// `config.toml` is read when present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::defaults();
        let store = ConfigStore::new();
        let file = match path {
            Some(path) => Some(store.load::<ConfigFile>(&NormalizedPath::new(path))?),
            None => {
                let default_path = match std::env::var_os(MANAGER_DIR_ENV).filter(|v| !v.is_empty()) {
                    Some(root) => PathBuf::from(root).join(CONFIG_FILE),
                    None => config_root().join(CONFIG_FILE),
                };
                store.load_optional::<ConfigFile>(&NormalizedPath::new(default_path))?
            }
        };
        if let Some(file) = file {
            tracing::debug!(?file, "Applying config file");
            config.apply(file);
        }
        Ok(config)
    }

    /// Overlay the values a config file sets.
    pub fn apply(&mut self, file: ConfigFile) {
        if !file.plugin_dirs.is_empty() {
            self.plugin_dirs = file.plugin_dirs;
        }
        if let Some(cache_dir) = file.cache_dir {
            self.registry.cache_dir = Some(cache_dir.clone());
            self.cache_dir = cache_dir;
        }
        if let Some(settings_path) = file.settings_path {
            self.settings_path = settings_path;
        }
        if !file.host_api_versions.is_empty() {
            self.host_api_versions = file.host_api_versions;
        }
        if !file.registry.urls.is_empty() {
            self.registry.urls = file.registry.urls;
        }
        if let Some(max_attempts) = file.registry.max_attempts {
            self.registry.retry.max_attempts = max_attempts.max(1);
        }
        if let Some(secs) = file.registry.timeout_secs {
            self.registry.retry.initial_timeout = Duration::from_secs(secs);
        }
    }

    /// Put `dir` first so installs go there.
    pub fn with_primary_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        self.plugin_dirs.retain(|d| d != &dir);
        self.plugin_dirs.insert(0, dir);
        self
    }

    pub fn with_registry(mut self, registry: RegistryConfig) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.registry.retry = retry;
        self
    }

    /// Directory new plugins are installed into.
    pub fn primary_dir(&self) -> &Path {
        self.plugin_dirs
            .first()
            .map(PathBuf::as_path)
            .unwrap_or_else(|| Path::new("plugins"))
    }

    /// Host API version used to pick registry refs (the newest supported).
    pub fn host_api(&self) -> &str {
        self.host_api_versions
            .iter()
            .max_by(|a, b| {
                let parse = |v: &str| plugin_registry::versioning::parse_version(v);
                parse(a).cmp(&parse(b))
            })
            .map(String::as_str)
            .unwrap_or("")
    }
}

fn config_root() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from(".").join(format!(".{APP_DIR}")))
        .join(APP_DIR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn root_layout() {
        let config = ManagerConfig::from_root("/srv/pm");
        assert_eq!(config.primary_dir(), Path::new("/srv/pm/plugins"));
        assert_eq!(config.cache_dir, PathBuf::from("/srv/pm/cache"));
        assert_eq!(config.settings_path, PathBuf::from("/srv/pm/settings.json"));
        assert_eq!(config.registry.cache_dir, Some(PathBuf::from("/srv/pm/cache")));
        assert_eq!(config.host_api_versions, vec!["3.0".to_string()]);
    }

    #[test]
    fn config_file_overrides_selected_values() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(
            &path,
            r#"
            host_api_versions = ["3.0", "3.1"]

            [registry]
            urls = ["file:///srv/registry.json"]
            max_attempts = 0
            timeout_secs = 2
            "#,
        )
        .unwrap();

        let mut config = ManagerConfig::from_root(dir.path());
        config.apply(ConfigStore::new().load(&NormalizedPath::new(&path)).unwrap());
        assert_eq!(config.registry.urls, vec!["file:///srv/registry.json".to_string()]);
        assert_eq!(config.registry.retry.max_attempts, 1);
        assert_eq!(config.registry.retry.initial_timeout, Duration::from_secs(2));
        assert_eq!(config.host_api(), "3.1");
        assert_eq!(config.primary_dir(), dir.path().join("plugins"));
    }

    #[test]
    fn explicit_missing_config_file_is_an_error() {
        assert!(ManagerConfig::load(Some(Path::new("/definitely/not/here.toml"))).is_err());
    }

    #[test]
    fn primary_dir_moves_to_front() {
        let config = ManagerConfig::from_root("/a").with_primary_dir("/b");
        assert_eq!(
            config.plugin_dirs,
            vec![PathBuf::from("/b"), PathBuf::from("/a/plugins")]
        );
    }
}
