//! Install metadata persisted per plugin UUID

use std::collections::BTreeMap;

use plugin_git::RefType;
use plugin_registry::url::same_repository;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::settings::{METADATA_KEY, SettingsStore};
use crate::{Error, Result};

/// Where an installed plugin came from and what it is checked out at.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PluginMetadata {
    #[serde(default)]
    pub name: String,
    /// Normalized source URL.
    #[serde(default)]
    pub url: String,
    #[serde(default, rename = "ref")]
    pub git_ref: String,
    #[serde(default)]
    pub commit: String,
    /// `branch`, `tag` or `commit`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ref_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    /// Source URL before the registry redirected the plugin.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_uuid: Option<String>,
}

impl PluginMetadata {
    pub fn ref_type(&self) -> Option<RefType> {
        self.ref_type.as_deref().map(RefType::parse)
    }

    pub fn set_ref_type(&mut self, ref_type: RefType) {
        self.ref_type = Some(ref_type.as_str().to_string());
    }

    /// Installed at a fixed commit, so updates do not apply.
    pub fn is_commit_pin(&self) -> bool {
        self.ref_type() == Some(RefType::Commit)
    }
}

/// View over the `plugins.metadata` settings entry.
///
/// Records are keyed by UUID, so there is never more than one per plugin.
/// Older settings stored a plain list of records; that form is upgraded
/// the first time it is read.
pub struct MetadataStore<'a> {
    settings: &'a mut dyn SettingsStore,
}

impl<'a> MetadataStore<'a> {
    pub fn new(settings: &'a mut dyn SettingsStore) -> Self {
        Self { settings }
    }

    /// Every record, keyed by UUID.
    pub fn all(&mut self) -> Result<BTreeMap<String, PluginMetadata>> {
        match self.settings.get(METADATA_KEY) {
            None | Some(Value::Null) => Ok(BTreeMap::new()),
            Some(Value::Object(entries)) => Ok(entries
                .into_iter()
                .filter_map(|(uuid, value)| match serde_json::from_value(value) {
                    Ok(record) => Some((uuid, record)),
                    Err(e) => {
                        tracing::warn!(uuid = %uuid, error = %e, "Dropping unreadable plugin metadata");
                        None
                    }
                })
                .collect()),
            Some(Value::Array(records)) => self.upgrade_legacy(records),
            Some(other) => {
                tracing::warn!(value = %other, "Ignoring malformed plugin metadata");
                Ok(BTreeMap::new())
            }
        }
    }

    fn upgrade_legacy(&mut self, records: Vec<Value>) -> Result<BTreeMap<String, PluginMetadata>> {
        let total = records.len();
        let keyed: BTreeMap<String, PluginMetadata> = records
            .into_iter()
            .filter_map(|value| serde_json::from_value::<PluginMetadata>(value).ok())
            .filter_map(|record| Some((record.uuid.clone()?, record)))
            .collect();
        tracing::info!(
            kept = keyed.len(),
            dropped = total - keyed.len(),
            "Upgraded legacy plugin metadata list"
        );
        self.write(&keyed)?;
        Ok(keyed)
    }

    fn write(&mut self, records: &BTreeMap<String, PluginMetadata>) -> Result<()> {
        self.settings
            .set(METADATA_KEY, serde_json::to_value(records)?)
    }

    pub fn get(&mut self, uuid: &str) -> Result<Option<PluginMetadata>> {
        Ok(self.all()?.remove(uuid))
    }

    /// Record for a plugin whose manifest carries `uuid`.
    ///
    /// When the registry moved the plugin to a new UUID the record is kept
    /// under the new one, with the manifest UUID in `original_uuid`.
    pub fn lookup(&mut self, uuid: &str) -> Result<Option<PluginMetadata>> {
        let mut records = self.all()?;
        if let Some(record) = records.remove(uuid) {
            return Ok(Some(record));
        }
        Ok(records
            .into_values()
            .find(|record| record.original_uuid.as_deref() == Some(uuid)))
    }

    /// Delete the record [`lookup`](Self::lookup) would return for `uuid`.
    pub fn forget(&mut self, uuid: &str) -> Result<bool> {
        let mut records = self.all()?;
        let before = records.len();
        records.retain(|key, record| key != uuid && record.original_uuid.as_deref() != Some(uuid));
        if records.len() == before {
            return Ok(false);
        }
        self.write(&records)?;
        Ok(true)
    }

    /// Insert or replace the record for `metadata.uuid`.
    pub fn save(&mut self, metadata: PluginMetadata) -> Result<()> {
        let Some(uuid) = metadata.uuid.clone() else {
            return Err(Error::NoUuid {
                plugin_id: metadata.name,
            });
        };
        let mut records = self.all()?;
        tracing::debug!(uuid = %uuid, url = %metadata.url, git_ref = %metadata.git_ref, "Saving plugin metadata");
        records.insert(uuid, metadata);
        self.write(&records)
    }

    /// Delete the record for `uuid`, returning whether one existed.
    pub fn remove(&mut self, uuid: &str) -> Result<bool> {
        let mut records = self.all()?;
        if records.remove(uuid).is_none() {
            return Ok(false);
        }
        self.write(&records)?;
        Ok(true)
    }

    /// First record whose source is the same repository as `url`.
    pub fn find_by_url(&mut self, url: &str) -> Result<Option<PluginMetadata>> {
        Ok(self
            .all()?
            .into_values()
            .find(|record| !record.url.is_empty() && same_repository(&record.url, url)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::MemorySettings;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn record(uuid: &str, url: &str) -> PluginMetadata {
        PluginMetadata {
            name: "demo".into(),
            url: url.into(),
            git_ref: "main".into(),
            commit: "abc".into(),
            ref_type: Some("branch".into()),
            uuid: Some(uuid.into()),
            ..Default::default()
        }
    }

    #[test]
    fn save_replaces_record_for_same_uuid() {
        let mut settings = MemorySettings::new();
        let mut store = MetadataStore::new(&mut settings);
        store.save(record("u1", "https://a/x")).unwrap();
        store.save(record("u1", "https://a/y")).unwrap();
        store.save(record("u2", "https://a/z")).unwrap();

        let all = store.all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all["u1"].url, "https://a/y");
        assert!(store.remove("u1").unwrap());
        assert!(!store.remove("u1").unwrap());
        assert_eq!(store.get("u2").unwrap().unwrap().url, "https://a/z");
    }

    #[test]
    fn record_without_uuid_cannot_be_saved() {
        let mut settings = MemorySettings::new();
        let err = MetadataStore::new(&mut settings)
            .save(PluginMetadata::default())
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::NoUuid);
    }

    #[test]
    fn legacy_list_is_upgraded_and_resaved() {
        let mut settings = MemorySettings::new();
        settings
            .set(
                METADATA_KEY,
                json!([
                    {"name": "a", "url": "https://h/a", "ref": "main", "commit": "1", "uuid": "u1"},
                    {"name": "b", "url": "https://h/b", "ref": "main", "commit": "2"}
                ]),
            )
            .unwrap();

        let all = MetadataStore::new(&mut settings).all().unwrap();
        assert_eq!(all.keys().collect::<Vec<_>>(), vec!["u1"]);
        assert_eq!(all["u1"].git_ref, "main");

        let stored = settings.get(METADATA_KEY).unwrap();
        assert!(stored.is_object());
        assert_eq!(stored["u1"]["url"], "https://h/a");
    }

    #[test]
    fn lookup_follows_uuid_redirect() {
        let mut settings = MemorySettings::new();
        let mut store = MetadataStore::new(&mut settings);
        store
            .save(PluginMetadata {
                original_uuid: Some("old".into()),
                ..record("new", "https://a/x")
            })
            .unwrap();
        store.save(record("other", "https://a/y")).unwrap();

        assert_eq!(store.lookup("old").unwrap().unwrap().uuid.as_deref(), Some("new"));
        assert_eq!(store.lookup("new").unwrap().unwrap().url, "https://a/x");
        assert!(store.lookup("missing").unwrap().is_none());

        assert!(store.forget("old").unwrap());
        assert!(!store.forget("old").unwrap());
        assert_eq!(store.all().unwrap().keys().collect::<Vec<_>>(), vec!["other"]);
    }

    #[test]
    fn find_by_url_ignores_git_suffix() {
        let mut settings = MemorySettings::new();
        let mut store = MetadataStore::new(&mut settings);
        store.save(record("u1", "https://host/org/repo.git")).unwrap();
        let found = store.find_by_url("https://HOST/org/repo/").unwrap();
        assert_eq!(found.map(|r| r.uuid), Some(Some("u1".to_string())));
    }

    #[test]
    fn ref_type_helpers() {
        let mut metadata = record("u1", "x");
        assert_eq!(metadata.ref_type(), Some(RefType::Branch));
        metadata.set_ref_type(RefType::Commit);
        assert!(metadata.is_commit_pin());
        let json = serde_json::to_value(&metadata).unwrap();
        assert_eq!(json["ref"], "main");
        assert_eq!(json["ref_type"], "commit");
    }
}
