//! Updating plugins and switching their refs

use std::path::Path;

use chrono::{DateTime, Utc};
use plugin_git::{
    GitRepository, RefKind, RefType, check_dirty_working_dir, check_ref_type, short_id, switch_ref,
};
use plugin_registry::{PluginQuery, VersioningScheme, normalize_git_url};
use serde::Serialize;

use super::{ORIGIN, PluginManager, discard_path};
use crate::hooks::PluginEvent;
use crate::metadata::PluginMetadata;
use crate::{Error, ErrorKind, Result};

/// What an update or ref switch changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateResult {
    pub plugin_id: String,
    pub old_version: String,
    pub new_version: String,
    pub old_ref: String,
    pub new_ref: String,
    pub old_commit: String,
    pub new_commit: String,
    pub commit_date: DateTime<Utc>,
}

impl UpdateResult {
    /// Whether HEAD moved.
    pub fn changed(&self) -> bool {
        self.old_commit != self.new_commit
    }
}

/// Per-plugin outcome of [`PluginManager::update_all_plugins`].
#[derive(Debug)]
pub enum UpdateOutcome {
    Updated(UpdateResult),
    /// Not updatable, e.g. pinned to a commit.
    Skipped(String),
    Failed(Error),
}

impl UpdateOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed(_))
    }
}

/// An available update found by [`PluginManager::check_updates`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateCheck {
    pub plugin_id: String,
    pub current_ref: String,
    pub current_commit: String,
    pub latest_commit: String,
    /// Newer version tag, when the plugin tracks tags.
    pub latest_ref: Option<String>,
    pub commit_date: Option<DateTime<Utc>>,
}

impl PluginManager {
    /// Update a plugin to the latest commit of its ref.
    ///
    /// A plugin installed from a tag moves to the newest tag when the
    /// registry declares a versioning scheme for it. An enabled plugin is
    /// disabled during the update and enabled again afterwards, whether or
    /// not the update succeeded.
    ///
    /// # Errors
    ///
    /// * `NoSource` if the plugin has no known source URL
    /// * `Dirty` if the working tree has local changes and
    ///   `discard_changes` is not set
    /// * `CommitPinned` if the plugin is installed at a fixed commit
    /// * `ManifestInvalid` and friends if the new version's manifest is bad;
    ///   the plugin is rolled back to the previous commit
    /// * `RollbackFailed` if that rollback failed and the plugin was removed
    pub fn update_plugin(&mut self, plugin_id: &str, discard_changes: bool) -> Result<UpdateResult> {
        let idx = self.index_of(plugin_id)?;
        let metadata = self.ensure_plugin_url(idx, "update")?;
        let path = self.plugins[idx].path.clone();
        self.prepare_worktree(plugin_id, &path, discard_changes)?;

        if metadata.is_commit_pin() {
            let commit = if metadata.git_ref.is_empty() {
                short_id(&metadata.commit)
            } else {
                metadata.git_ref.clone()
            };
            return Err(Error::CommitPinned {
                plugin_id: plugin_id.to_string(),
                commit,
            });
        }
        if metadata.git_ref.is_empty() {
            let repo = self.backend.open(&path)?;
            if repo.is_head_detached()? {
                return Err(Error::CommitPinned {
                    plugin_id: plugin_id.to_string(),
                    commit: short_id(&repo.head_target()?),
                });
            }
        }

        let was_enabled = self.plugins[idx].is_enabled();
        if was_enabled {
            self.deactivate(idx)?;
        }

        let result = self.perform_update(plugin_id, metadata);

        if was_enabled && let Ok(idx) = self.index_of(plugin_id) {
            if let Err(e) = self.activate(idx) {
                tracing::warn!(plugin_id, error = %e, "Failed to re-enable plugin after update");
            }
        }
        result
    }

    fn perform_update(&mut self, plugin_id: &str, metadata: PluginMetadata) -> Result<UpdateResult> {
        let idx = self.index_of(plugin_id)?;
        let uuid = self.plugin_uuid(idx)?;
        let path = self.plugins[idx].path.clone();
        let old_version = self.plugins[idx].version().to_string();

        let redirect = self.registry.check_redirects(&metadata.url, Some(&uuid));
        let url = if redirect.url_changed {
            let url = normalize_git_url(&redirect.url);
            tracing::info!(plugin_id, old = %metadata.url, new = %url, "Plugin moved, updating origin");
            let repo = self.backend.open(&path)?;
            if repo.find_remote(ORIGIN)?.is_some() {
                repo.set_remote_url(ORIGIN, &url)?;
            } else {
                repo.create_remote(ORIGIN, &url)?;
            }
            url
        } else {
            metadata.url.clone()
        };

        let repo = self.backend.open(&path)?;
        let old_commit = repo.head_target()?;
        let mut target = if metadata.git_ref.is_empty() {
            repo.head_shorthand()?
        } else {
            metadata.git_ref.clone()
        };
        let on_tag = match metadata.ref_type() {
            Some(ref_type) => ref_type == RefType::Tag,
            None => check_ref_type(self.backend.as_ref(), &path, Some(&target))?.0 == RefType::Tag,
        };
        if on_tag && let Some(scheme) = self.versioning_scheme(&url, &uuid) {
            if let Err(e) = repo.fetch_with_tags(ORIGIN) {
                tracing::warn!(plugin_id, error = %e, "Failed to fetch tags");
            }
            if let Some(newer) = newer_tag(&*repo, &scheme, &target)? {
                tracing::info!(plugin_id, current = %target, newer = %newer, "Found newer version tag");
                target = newer;
            }
        }
        drop(repo);

        tracing::debug!(plugin_id, target = %target, "Updating plugin");
        let outcome = switch_ref(self.backend.as_ref(), &path, &target)
            .map_err(|e| Error::from_switch(plugin_id, &target, e))?;

        self.validate_or_rollback(plugin_id, &old_commit)?;
        let new_commit = outcome.new_commit.clone();
        let commit_date = self.backend.open(&path)?.commit_date(&new_commit)?;
        let new_version = self.plugin(plugin_id).map(|p| p.version().to_string()).unwrap_or_default();

        let idx = self.index_of(plugin_id)?;
        if self.plugins[idx].adopt_manifest_uuid().is_some() {
            let declared = self.plugin_uuid(idx)?;
            self.follow_uuid_change(plugin_id, &uuid, &declared)?;
        }
        let manifest_uuid = self.plugin_uuid(idx)?;
        let redirected_uuid = if redirect.uuid_changed { redirect.uuid.clone() } else { None };
        let record_uuid = match redirected_uuid {
            Some(redirected) => {
                tracing::info!(plugin_id, old = %uuid, new = %redirected, "Plugin UUID redirected by registry");
                self.uuids.register(&redirected, plugin_id);
                redirected
            }
            None => manifest_uuid,
        };

        let mut updated = metadata.clone();
        updated.url = url;
        updated.git_ref = outcome.new_ref.clone();
        updated.commit = new_commit.clone();
        updated.uuid = Some(record_uuid.clone());
        updated.set_ref_type(outcome.ref_type);
        if redirect.url_changed {
            updated.original_url = metadata.original_url.clone().or(Some(metadata.url.clone()));
        }
        if record_uuid != uuid {
            updated.original_uuid = metadata.original_uuid.clone().or(Some(uuid));
        }
        let mut store = self.metadata();
        if let Some(old_key) = metadata.uuid.as_deref()
            && old_key != record_uuid
        {
            store.remove(old_key)?;
        }
        store.save(updated)?;

        tracing::info!(plugin_id, old = %short_id(&old_commit), new = %short_id(&new_commit), "Updated plugin");
        self.emit(PluginEvent::RefSwitched {
            plugin_id: plugin_id.to_string(),
            reference: outcome.new_ref.clone(),
        });
        Ok(UpdateResult {
            plugin_id: plugin_id.to_string(),
            old_version,
            new_version,
            old_ref: outcome.old_ref,
            new_ref: outcome.new_ref,
            old_commit,
            new_commit,
            commit_date,
        })
    }

    /// Update every installed plugin.
    ///
    /// Commit-pinned plugins are skipped; every other failure is collected
    /// and does not stop the remaining updates.
    pub fn update_all_plugins(&mut self, discard_changes: bool) -> Vec<(String, UpdateOutcome)> {
        let ids: Vec<String> = self.plugins.iter().map(|p| p.plugin_id.clone()).collect();
        ids.into_iter()
            .map(|plugin_id| {
                let outcome = match self.update_plugin(&plugin_id, discard_changes) {
                    Ok(result) => UpdateOutcome::Updated(result),
                    Err(e) if e.kind() == ErrorKind::CommitPinned => {
                        tracing::info!(plugin_id = %plugin_id, "Skipping commit-pinned plugin");
                        UpdateOutcome::Skipped(e.to_string())
                    }
                    Err(e) => {
                        tracing::warn!(plugin_id = %plugin_id, error = %e, "Update failed");
                        UpdateOutcome::Failed(e)
                    }
                };
                (plugin_id, outcome)
            })
            .collect()
    }

    /// Plugins with a newer commit or version tag upstream.
    ///
    /// Commit pins and plugins without a source are skipped. A plugin whose
    /// check fails is logged and left out. Each fetch refreshes the refs
    /// cache entry of the plugin's URL.
    pub fn check_updates(&mut self) -> Vec<UpdateCheck> {
        let ids: Vec<String> = self.plugins.iter().map(|p| p.plugin_id.clone()).collect();
        ids.into_iter()
            .filter_map(|plugin_id| match self.check_plugin_update(&plugin_id) {
                Ok(check) => check,
                Err(e) => {
                    tracing::warn!(plugin_id = %plugin_id, error = %e, "Update check failed");
                    None
                }
            })
            .collect()
    }

    fn check_plugin_update(&mut self, plugin_id: &str) -> Result<Option<UpdateCheck>> {
        let idx = self.index_of(plugin_id)?;
        let uuid = self.plugin_uuid(idx)?;
        let path = self.plugins[idx].path.clone();
        let Some(metadata) = self.metadata().lookup(&uuid)?.filter(|m| !m.url.is_empty()) else {
            return Ok(None);
        };
        if metadata.is_commit_pin() {
            return Ok(None);
        }

        let repo = self.backend.open(&path)?;
        if repo.find_remote(ORIGIN)?.is_none() {
            tracing::debug!(plugin_id, "No origin remote, skipping update check");
            return Ok(None);
        }
        repo.fetch_with_tags(ORIGIN)?;
        let current_commit = repo.head_target()?;
        let scheme = self.versioning_scheme(&metadata.url, &uuid);
        self.cache_origin_refs(&metadata.url, &repo.list_references()?, scheme.as_ref());

        let current_ref = if !metadata.git_ref.is_empty() {
            metadata.git_ref.clone()
        } else if repo.is_head_detached()? {
            let first_branch = repo
                .list_references()?
                .into_iter()
                .find(|r| r.kind == RefKind::Branch && !r.is_remote);
            match first_branch {
                Some(branch) => branch.shortname().to_string(),
                None => return Ok(None),
            }
        } else {
            repo.head_shorthand()?
        };

        if metadata.ref_type() == Some(RefType::Tag) {
            let Some(scheme) = scheme else {
                return Ok(None);
            };
            let Some(newer) = newer_tag(&*repo, &scheme, &current_ref)? else {
                return Ok(None);
            };
            let latest_commit = repo.peel_to_commit(&format!("refs/tags/{newer}"))?;
            return Ok(Some(UpdateCheck {
                plugin_id: plugin_id.to_string(),
                commit_date: repo.commit_date(&latest_commit).ok(),
                current_ref,
                current_commit,
                latest_commit,
                latest_ref: Some(newer),
            }));
        }

        let latest_commit = repo
            .peel_to_commit(&format!("{ORIGIN}/{current_ref}"))
            .or_else(|_| repo.peel_to_commit(&current_ref))?;
        if latest_commit == current_commit {
            return Ok(None);
        }
        Ok(Some(UpdateCheck {
            plugin_id: plugin_id.to_string(),
            commit_date: repo.commit_date(&latest_commit).ok(),
            current_ref,
            current_commit,
            latest_commit,
            latest_ref: None,
        }))
    }

    /// Check out a different branch, tag or commit of an installed plugin.
    ///
    /// Like [`update_plugin`](Self::update_plugin), a new manifest that
    /// fails validation rolls the plugin back.
    pub fn switch_ref(
        &mut self,
        plugin_id: &str,
        reference: &str,
        discard_changes: bool,
    ) -> Result<UpdateResult> {
        let idx = self.index_of(plugin_id)?;
        let uuid = self.plugin_uuid(idx)?;
        let path = self.plugins[idx].path.clone();
        let old_version = self.plugins[idx].version().to_string();
        self.prepare_worktree(plugin_id, &path, discard_changes)?;

        tracing::info!(plugin_id, reference, "Switching plugin ref");
        let outcome = switch_ref(self.backend.as_ref(), &path, reference)
            .map_err(|e| Error::from_switch(plugin_id, reference, e))?;

        self.validate_or_rollback(plugin_id, &outcome.old_commit)?;
        let commit_date = self.backend.open(&path)?.commit_date(&outcome.new_commit)?;
        let new_version = self.plugin(plugin_id).map(|p| p.version().to_string()).unwrap_or_default();

        let mut metadata = match self.metadata().lookup(&uuid)? {
            Some(metadata) => metadata,
            None => PluginMetadata {
                name: plugin_id.to_string(),
                url: self
                    .backend
                    .open(&path)?
                    .find_remote(ORIGIN)?
                    .map(|url| normalize_git_url(&url))
                    .unwrap_or_default(),
                uuid: Some(uuid),
                ..Default::default()
            },
        };
        metadata.git_ref = outcome.new_ref.clone();
        metadata.commit = outcome.new_commit.clone();
        metadata.set_ref_type(outcome.ref_type);
        self.metadata().save(metadata)?;

        self.emit(PluginEvent::RefSwitched {
            plugin_id: plugin_id.to_string(),
            reference: outcome.new_ref.clone(),
        });
        Ok(UpdateResult {
            plugin_id: plugin_id.to_string(),
            old_version,
            new_version,
            old_ref: outcome.old_ref,
            new_ref: outcome.new_ref,
            old_commit: outcome.old_commit,
            new_commit: outcome.new_commit,
            commit_date,
        })
    }

    /// Carry the enabled flag and UUID mapping over to a plugin whose new
    /// manifest declares a different UUID.
    fn follow_uuid_change(&mut self, plugin_id: &str, old: &str, new: &str) -> Result<()> {
        tracing::info!(plugin_id, old, new, "Plugin manifest UUID changed");
        self.uuids.unregister(old);
        self.uuids.register(new, plugin_id);
        if self.enabled.remove(old) {
            self.enabled.insert(new.to_string());
            self.save_enabled()?;
        }
        Ok(())
    }

    /// Stored metadata with a source URL, created from the registry entry
    /// when the plugin has none.
    pub(super) fn ensure_plugin_url(&mut self, idx: usize, operation: &'static str) -> Result<PluginMetadata> {
        let uuid = self.plugin_uuid(idx)?;
        let plugin_id = self.plugins[idx].plugin_id.clone();
        if let Some(metadata) = self.metadata().lookup(&uuid)?
            && !metadata.url.is_empty()
        {
            return Ok(metadata);
        }

        let Some(entry) = self.registry.find_plugin(PluginQuery::Uuid(&uuid)) else {
            return Err(Error::NoSource {
                plugin_id,
                operation,
            });
        };
        tracing::info!(plugin_id = %plugin_id, url = %entry.git_url, "Using registry URL for plugin without metadata");

        let path = self.plugins[idx].path.clone();
        let (ref_type, git_ref) = check_ref_type(self.backend.as_ref(), &path, None)?;
        let commit = self.backend.open(&path)?.head_target()?;
        let mut metadata = PluginMetadata {
            name: plugin_id,
            url: normalize_git_url(&entry.git_url),
            git_ref,
            commit,
            uuid: Some(uuid),
            ..Default::default()
        };
        metadata.set_ref_type(ref_type);
        self.metadata().save(metadata.clone())?;
        Ok(metadata)
    }

    /// Fail on local changes, or throw them away when `discard_changes`.
    fn prepare_worktree(&self, plugin_id: &str, path: &Path, discard_changes: bool) -> Result<()> {
        if discard_changes {
            let repo = self.backend.open(path)?;
            let head = repo.head_target()?;
            repo.reset_hard(&head)?;
            tracing::info!(plugin_id, "Discarded local changes");
            return Ok(());
        }
        let changes = check_dirty_working_dir(self.backend.as_ref(), path)?;
        if changes.is_empty() {
            return Ok(());
        }
        Err(Error::Dirty {
            plugin_id: plugin_id.to_string(),
            changes,
        })
    }

    /// Re-read the manifest after a checkout, resetting to `old_commit` if
    /// it no longer validates.
    ///
    /// A plugin whose rollback also fails is removed entirely.
    fn validate_or_rollback(&mut self, plugin_id: &str, old_commit: &str) -> Result<()> {
        let idx = self.index_of(plugin_id)?;
        let Err(manifest_error) = self.plugins[idx].read_manifest().map(|_| ()) else {
            return Ok(());
        };
        tracing::warn!(plugin_id, error = %manifest_error, "New manifest is invalid, rolling back");

        let path = self.plugins[idx].path.clone();
        let rollback = self
            .backend
            .open(&path)
            .and_then(|repo| repo.reset_hard(old_commit))
            .map_err(Error::from)
            .and_then(|()| self.plugins[idx].read_manifest().map(|_| ()));

        match rollback {
            Ok(()) => {
                tracing::info!(plugin_id, commit = %short_id(old_commit), "Rolled back plugin");
                Err(manifest_error)
            }
            Err(e) => {
                tracing::error!(plugin_id, error = %e, "Rollback failed, removing plugin");
                if let Some(uuid) = self.plugins[idx].uuid().map(str::to_string) {
                    self.uuids.unregister(&uuid);
                    if let Err(e) = self.metadata().forget(&uuid) {
                        tracing::warn!(plugin_id, error = %e, "Failed to remove plugin metadata");
                    }
                    if self.enabled.remove(&uuid)
                        && let Err(e) = self.save_enabled()
                    {
                        tracing::warn!(plugin_id, error = %e, "Failed to save enabled plugins");
                    }
                }
                self.plugins.remove(idx);
                discard_path(&path);
                Err(Error::RollbackFailed {
                    plugin_id: plugin_id.to_string(),
                    message: e.to_string(),
                })
            }
        }
    }

    /// Versioning scheme the registry declares for a plugin.
    pub(super) fn versioning_scheme(&mut self, url: &str, uuid: &str) -> Option<VersioningScheme> {
        self.registry
            .find_plugin(PluginQuery::Uuid(uuid))
            .or_else(|| self.registry.find_plugin(PluginQuery::Url(url)))
            .and_then(|entry| entry.versioning())
    }
}

/// Newest scheme-matching tag in `repo` that is newer than `current`.
fn newer_tag(repo: &dyn GitRepository, scheme: &VersioningScheme, current: &str) -> Result<Option<String>> {
    let refs = repo.list_references()?;
    let tags = scheme.filter_tags(
        refs.iter()
            .filter(|r| r.kind == RefKind::Tag)
            .map(|r| r.name.as_str()),
    );
    Ok(scheme.find_newer_tag(current, &tags))
}
