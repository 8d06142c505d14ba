//! The on-disk plugin entity

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::Result;
use crate::manifest::Manifest;

static NON_ALNUM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9]+").unwrap());

const MAX_NAME_LEN: usize = 50;

/// Lifecycle state of a discovered plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PluginState {
    Discovered,
    Loaded,
    Enabled,
    Disabled,
    Error,
}

impl PluginState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discovered => "discovered",
            Self::Loaded => "loaded",
            Self::Enabled => "enabled",
            Self::Disabled => "disabled",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for PluginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A plugin directory found under one of the plugin roots.
#[derive(Debug, Clone)]
pub struct Plugin {
    /// Directory name: sanitized display name plus UUID.
    pub plugin_id: String,
    pub path: PathBuf,
    pub state: PluginState,
    pub manifest: Option<Manifest>,
    uuid: Option<String>,
}

impl Plugin {
    /// A plugin at `<root>/<plugin_id>` with no manifest read yet.
    pub fn new(root: &Path, plugin_id: impl Into<String>) -> Self {
        let plugin_id = plugin_id.into();
        Self {
            path: root.join(&plugin_id),
            plugin_id,
            state: PluginState::Discovered,
            manifest: None,
            uuid: None,
        }
    }

    /// Discover the plugin at `<root>/<plugin_id>` and read its manifest.
    pub fn load(root: &Path, plugin_id: &str) -> Result<Self> {
        let mut plugin = Self::new(root, plugin_id);
        plugin.read_manifest()?;
        Ok(plugin)
    }

    /// Switch to the UUID of the loaded manifest, returning the previous
    /// one if it differed.
    pub(crate) fn adopt_manifest_uuid(&mut self) -> Option<String> {
        let declared = self.manifest.as_ref()?.uuid.clone();
        if self.uuid.as_deref() == Some(declared.as_str()) {
            return None;
        }
        self.uuid.replace(declared)
    }

    /// (Re-)read `MANIFEST.toml`.
    ///
    /// The UUID is taken from the first manifest read and changes only when
    /// an update adopts the new one. On failure the previous manifest stays
    /// in place.
    pub fn read_manifest(&mut self) -> Result<&Manifest> {
        let manifest = Manifest::from_dir(&self.path)?;
        if self.uuid.is_none() {
            self.uuid = Some(manifest.uuid.clone());
        } else if self.uuid.as_deref() != Some(manifest.uuid.as_str()) {
            tracing::warn!(
                plugin_id = %self.plugin_id,
                uuid = ?self.uuid,
                manifest_uuid = %manifest.uuid,
                "Manifest UUID changed, keeping the original"
            );
        }
        if self.state == PluginState::Discovered {
            self.state = PluginState::Loaded;
        }
        Ok(self.manifest.insert(manifest))
    }

    pub fn uuid(&self) -> Option<&str> {
        self.uuid.as_deref()
    }

    /// Display name from the manifest, falling back to the directory name.
    pub fn name(&self) -> &str {
        self.manifest
            .as_ref()
            .map(|m| m.name.as_str())
            .unwrap_or(&self.plugin_id)
    }

    pub fn version(&self) -> &str {
        self.manifest
            .as_ref()
            .map(Manifest::version_or_default)
            .unwrap_or("")
    }

    pub fn is_enabled(&self) -> bool {
        self.state == PluginState::Enabled
    }
}

/// Directory name for a plugin: the lowercased name with every run of
/// non-alphanumerics replaced by `_`, cut to 50 characters, then the UUID.
pub fn directory_name(manifest: &Manifest) -> String {
    let lowered = manifest.name.to_lowercase();
    let replaced = NON_ALNUM.replace_all(&lowered, "_");
    let trimmed = replaced.trim_matches('_');
    let sanitized: String = trimmed.chars().take(MAX_NAME_LEN).collect();
    let sanitized = if sanitized.is_empty() {
        "plugin".to_string()
    } else {
        sanitized
    };
    format!("{sanitized}_{}", manifest.uuid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    const UUID: &str = "550e8400-e29b-41d4-a716-446655440000";

    fn manifest(name: &str) -> Manifest {
        let content = format!(
            "uuid = \"{UUID}\"\nname = \"{name}\"\ndescription = \"d\"\napi = [\"3.0\"]\n"
        );
        Manifest::parse(&content, Path::new("x")).unwrap()
    }

    #[rstest]
    #[case("My Plugin", "my_plugin")]
    #[case("  Über--Cool!! Plugin ", "ber_cool_plugin")]
    #[case("!!!", "plugin")]
    #[case("ÄÖÜ", "plugin")]
    fn directory_names_are_sanitized(#[case] name: &str, #[case] expected: &str) {
        assert_eq!(directory_name(&manifest(name)), format!("{expected}_{UUID}"));
    }

    #[test]
    fn long_names_are_truncated() {
        let dir = directory_name(&manifest(&"a".repeat(80)));
        assert_eq!(dir, format!("{}_{UUID}", "a".repeat(50)));
    }

    #[test]
    fn load_reads_manifest_and_uuid() {
        let root = tempfile::TempDir::new().unwrap();
        let dir = root.path().join("demo");
        std::fs::create_dir(&dir).unwrap();
        std::fs::write(
            dir.join("MANIFEST.toml"),
            format!("uuid = \"{UUID}\"\nname = \"Demo\"\ndescription = \"d\"\napi = [\"3.0\"]\n"),
        )
        .unwrap();

        let plugin = Plugin::load(root.path(), "demo").unwrap();
        assert_eq!(plugin.uuid(), Some(UUID));
        assert_eq!(plugin.name(), "Demo");
        assert_eq!(plugin.state, PluginState::Loaded);
        assert_eq!(plugin.path, dir);
    }

    #[test]
    fn uuid_survives_manifest_changes() {
        let root = tempfile::TempDir::new().unwrap();
        let dir = root.path().join("demo");
        std::fs::create_dir(&dir).unwrap();
        let write = |uuid: &str| {
            std::fs::write(
                dir.join("MANIFEST.toml"),
                format!("uuid = \"{uuid}\"\nname = \"Demo\"\ndescription = \"d\"\napi = [\"3.0\"]\n"),
            )
            .unwrap()
        };
        write(UUID);
        let mut plugin = Plugin::load(root.path(), "demo").unwrap();
        write("6ba7b810-9dad-41d1-80b4-00c04fd430c8");
        plugin.read_manifest().unwrap();
        assert_eq!(plugin.uuid(), Some(UUID));

        assert_eq!(plugin.adopt_manifest_uuid().as_deref(), Some(UUID));
        assert_eq!(plugin.uuid(), Some("6ba7b810-9dad-41d1-80b4-00c04fd430c8"));
        assert_eq!(plugin.adopt_manifest_uuid(), None);
    }
}
