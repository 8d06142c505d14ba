//! Listing a plugin's branches and tags

use std::collections::BTreeSet;

use plugin_git::{GitRef, RefKind, short_id};
use plugin_registry::{PluginQuery, VersioningScheme, normalize_git_url};
use serde::Serialize;
use tempfile::Builder;

use super::{ORIGIN, PluginManager};
use crate::Result;
use crate::refs_cache::CachedRefs;

/// Branches and tags available to a plugin.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefListing {
    /// Checked-out branch, or abbreviated commit when detached. Only set
    /// for installed plugins.
    pub current: Option<String>,
    /// Local and `origin` branches, merged by name.
    pub branches: Vec<String>,
    /// Newest first: by the registry's versioning scheme when there is
    /// one, otherwise reverse name order.
    pub tags: Vec<String>,
}

impl PluginManager {
    /// Refs of an installed plugin, or of a repository given by URL,
    /// local path or registry id.
    ///
    /// Installed plugins fetch from `origin` first; a fetch failure only
    /// means the listing may be stale. Repositories that are not installed
    /// are answered from the refs cache while it is fresh, unless `refresh`
    /// is set, and otherwise fetched into a throwaway bare repository.
    pub fn list_refs(&mut self, target: &str, refresh: bool) -> Result<RefListing> {
        match self.find_plugin(target) {
            Ok(plugin_id) => self.list_installed_refs(&plugin_id),
            Err(_) => {
                let source = self.resolve_source(target);
                self.list_remote_refs(&source, refresh)
            }
        }
    }

    /// Drop cached refs of URLs that are neither in the registry nor
    /// installed.
    pub fn prune_refs_cache(&mut self) -> Result<usize> {
        let mut keep: Vec<String> = self
            .registry
            .list_plugins(None, None)
            .iter()
            .map(|entry| normalize_git_url(&entry.git_url))
            .collect();
        keep.extend(self.metadata().all()?.into_values().map(|m| m.url));
        Ok(self.refs_cache.retain_urls(&keep))
    }

    fn list_installed_refs(&mut self, plugin_id: &str) -> Result<RefListing> {
        let idx = self.index_of(plugin_id)?;
        let uuid = self.plugin_uuid(idx)?;
        let path = self.plugins[idx].path.clone();
        let url = self
            .metadata()
            .lookup(&uuid)?
            .map(|m| m.url)
            .unwrap_or_default();

        let repo = self.backend.open(&path)?;
        let fetched = match repo.find_remote(ORIGIN)? {
            Some(_) => match repo.fetch_with_tags(ORIGIN) {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(plugin_id, error = %e, "Failed to fetch refs, listing local state");
                    false
                }
            },
            None => false,
        };
        let refs = repo.list_references()?;
        let current = if repo.is_head_detached()? {
            short_id(&repo.head_target()?)
        } else {
            repo.head_shorthand()?
        };
        drop(repo);

        let scheme = self.versioning_scheme(&url, &uuid);
        if fetched && !url.is_empty() {
            self.cache_origin_refs(&url, &refs, scheme.as_ref());
        }
        let mut listing = build_listing(&refs, scheme.as_ref());
        listing.current = Some(current);
        Ok(listing)
    }

    fn list_remote_refs(&mut self, source: &str, refresh: bool) -> Result<RefListing> {
        let url = normalize_git_url(source);
        if !refresh && let Some(cached) = self.refs_cache.all_refs(&url, false) {
            tracing::debug!(url = %url, "Listing refs from cache");
            return Ok(cached.into());
        }

        let scheme = self
            .registry
            .find_plugin(PluginQuery::Url(&url))
            .and_then(|entry| entry.versioning());
        match self.fetch_remote_refs(&url) {
            Ok(refs) => {
                let listing = build_listing(&refs, scheme.as_ref());
                self.refs_cache
                    .store_all_refs(&url, listing.branches.clone(), listing.tags.clone());
                Ok(listing)
            }
            Err(e) => match self.refs_cache.all_refs(&url, true) {
                Some(cached) => {
                    tracing::warn!(url = %url, error = %e, "Failed to fetch refs, listing cached state");
                    Ok(cached.into())
                }
                None => Err(e),
            },
        }
    }

    fn fetch_remote_refs(&self, url: &str) -> Result<Vec<GitRef>> {
        let temp = Builder::new().prefix("plugin-refs-").tempdir()?;
        tracing::debug!(url, "Listing remote refs");

        let repo = self.backend.init_bare(temp.path())?;
        repo.create_remote(ORIGIN, url)?;
        repo.fetch_with_tags(ORIGIN)?;
        Ok(repo.list_references()?)
    }

    /// Record what a plugin clone just fetched from `origin` as the
    /// listing of `url`. Local branches are left out.
    pub(super) fn cache_origin_refs(&mut self, url: &str, refs: &[GitRef], scheme: Option<&VersioningScheme>) {
        let upstream: Vec<GitRef> = refs
            .iter()
            .filter(|r| r.kind == RefKind::Tag || (r.kind == RefKind::Branch && r.is_remote))
            .cloned()
            .collect();
        let listing = build_listing(&upstream, scheme);
        self.refs_cache.store_all_refs(url, listing.branches, listing.tags);
    }
}

impl From<CachedRefs> for RefListing {
    fn from(cached: CachedRefs) -> Self {
        Self {
            current: None,
            branches: cached.branches,
            tags: cached.tags,
        }
    }
}

fn build_listing(refs: &[GitRef], scheme: Option<&VersioningScheme>) -> RefListing {
    let origin_prefix = format!("{ORIGIN}/");
    let mut branches = BTreeSet::new();
    let mut tags = Vec::new();

    for reference in refs {
        match reference.kind {
            RefKind::Branch if reference.is_remote => {
                if let Some(name) = reference.shortname().strip_prefix(&origin_prefix) {
                    branches.insert(name.to_string());
                }
            }
            RefKind::Branch => {
                branches.insert(reference.shortname().to_string());
            }
            RefKind::Tag => tags.push(reference.shortname().to_string()),
            RefKind::Head => {}
        }
    }

    let tags = match scheme {
        Some(scheme) => scheme.sort_tags(&tags),
        None => {
            tags.sort_by(|a, b| b.cmp(a));
            tags
        }
    };
    RefListing {
        current: None,
        branches: branches.into_iter().collect(),
        tags,
    }
}
