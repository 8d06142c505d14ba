//! Lazily loaded, cached registry client

use std::collections::BTreeSet;
use std::path::PathBuf;

use plugin_fs::{ConfigStore, NormalizedPath, digest};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::fetch::{RetryPolicy, fetch_document};
use crate::model::{
    BlacklistEntry, BlacklistVerdict, PluginQuery, Redirect, RegistryDocument, RegistryInfo,
    RegistryPlugin, TrustLevel,
};
use crate::url::{normalize_git_url, same_repository, url_match_key};
use crate::versioning::parse_version;
use crate::{DEFAULT_REGISTRY_URLS, Error, REGISTRY_CACHE_VERSION, REGISTRY_URL_ENV, Result};

/// Where to load the registry from and where to cache it.
#[derive(Debug, Clone, Default)]
pub struct RegistryConfig {
    /// Explicit URLs. When empty, `PLUGIN_REGISTRY_URL` (if set) followed
    /// by the built-in defaults are used.
    pub urls: Vec<String>,
    /// Directory for the cache file; no caching when `None`.
    pub cache_dir: Option<PathBuf>,
    pub retry: RetryPolicy,
}

impl RegistryConfig {
    pub fn new(urls: Vec<String>) -> Self {
        Self {
            urls,
            ..Default::default()
        }
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Priority: explicit URLs, else the environment override followed by the
/// defaults, else the defaults.
pub fn resolve_urls(explicit: &[String], env_url: Option<String>) -> Vec<String> {
    if !explicit.is_empty() {
        return explicit.to_vec();
    }
    let defaults = DEFAULT_REGISTRY_URLS.iter().map(|u| u.to_string());
    match env_url.filter(|u| !u.trim().is_empty()) {
        Some(url) => std::iter::once(url).chain(defaults).collect(),
        None => defaults.collect(),
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheEnvelope {
    cache_version: u32,
    data: RegistryDocument,
}

/// Client for the plugin registry.
///
/// The document is fetched on first query and cached on disk. If every
/// URL fails, the client remembers the failure and all queries answer
/// with their least restrictive result until [`refresh`](Self::refresh)
/// succeeds.
#[derive(Debug)]
pub struct PluginRegistry {
    urls: Vec<String>,
    registry_url: String,
    cache_path: Option<NormalizedPath>,
    retry: RetryPolicy,
    store: ConfigStore,
    data: Option<RegistryDocument>,
    fetch_failed: bool,
}

impl PluginRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        let urls = resolve_urls(&config.urls, std::env::var(REGISTRY_URL_ENV).ok());
        let registry_url = urls.first().cloned().unwrap_or_default();
        let cache_path = config.cache_dir.as_ref().map(|dir| {
            NormalizedPath::new(dir).join(&format!(
                "plugin_registry_{}.json",
                digest::short_digest(&registry_url)
            ))
        });

        Self {
            urls,
            registry_url,
            cache_path,
            retry: config.retry,
            store: ConfigStore::new(),
            data: None,
            fetch_failed: false,
        }
    }

    /// A registry already holding `document`; never touches the network.
    pub fn with_document(document: RegistryDocument) -> Self {
        Self {
            urls: Vec::new(),
            registry_url: String::new(),
            cache_path: None,
            retry: RetryPolicy::default(),
            store: ConfigStore::new(),
            data: Some(document),
            fetch_failed: false,
        }
    }

    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    /// The primary URL, or the one that last served the document.
    pub fn registry_url(&self) -> &str {
        &self.registry_url
    }

    pub fn cache_path(&self) -> Option<PathBuf> {
        self.cache_path.as_ref().map(NormalizedPath::to_native)
    }

    pub fn is_loaded(&self) -> bool {
        self.data.is_some()
    }

    pub fn fetch_failed(&self) -> bool {
        self.fetch_failed
    }

    /// Load the document, from the cache when allowed, else from the
    /// first URL that serves a valid one.
    pub fn fetch_registry(&mut self, use_cache: bool) -> Result<()> {
        if use_cache && let Some(document) = self.load_cache() {
            self.data = Some(document);
            self.fetch_failed = false;
            return Ok(());
        }

        let mut last_error = None;
        for (index, url) in self.urls.iter().enumerate() {
            tracing::debug!(url, index = index + 1, total = self.urls.len(), "Fetching registry");
            match fetch_document(url, &self.retry) {
                Ok(document) => {
                    tracing::info!(url, plugins = document.plugins.len(), "Registry loaded");
                    self.registry_url = url.clone();
                    self.fetch_failed = false;
                    self.save_cache(&document);
                    self.data = Some(document);
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(url, error = %e, "Failed to fetch registry");
                    last_error = Some(e);
                }
            }
        }

        self.fetch_failed = true;
        Err(last_error.unwrap_or(Error::NoUrls))
    }

    /// Bypass the cache and fetch again, clearing any earlier failure.
    pub fn refresh(&mut self) -> Result<()> {
        self.fetch_failed = false;
        self.fetch_registry(false)
    }

    /// Delete the cache file if present.
    pub fn clear_cache(&self) -> Result<()> {
        let Some(path) = &self.cache_path else {
            return Ok(());
        };
        match std::fs::remove_file(path.to_native()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Cache {
                path: path.to_native(),
                operation: "remove",
                message: e.to_string(),
            }),
        }
    }

    fn load_cache(&self) -> Option<RegistryDocument> {
        let path = self.cache_path.as_ref()?;
        match self.store.load_optional::<CacheEnvelope>(path) {
            Ok(Some(envelope)) if envelope.cache_version == REGISTRY_CACHE_VERSION => {
                tracing::debug!(path = %path, "Loaded registry from cache");
                Some(envelope.data)
            }
            Ok(Some(envelope)) => {
                tracing::warn!(
                    path = %path,
                    found = envelope.cache_version,
                    expected = REGISTRY_CACHE_VERSION,
                    "Registry cache is stale, fetching from URL"
                );
                None
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "Registry cache unreadable, fetching from URL");
                None
            }
        }
    }

    fn save_cache(&self, document: &RegistryDocument) {
        let Some(path) = &self.cache_path else {
            return;
        };
        let envelope = CacheEnvelope {
            cache_version: REGISTRY_CACHE_VERSION,
            data: document.clone(),
        };
        match self.store.save(path, &envelope) {
            Ok(()) => tracing::debug!(path = %path, "Saved registry cache"),
            Err(e) => tracing::warn!(path = %path, error = %e, "Failed to save registry cache"),
        }
    }

    fn ensure_loaded(&mut self) -> bool {
        if self.fetch_failed {
            return false;
        }
        if self.data.is_none()
            && let Err(e) = self.fetch_registry(true)
        {
            tracing::warn!(error = %e, "Registry unavailable, continuing without it");
            return false;
        }
        self.data.is_some()
    }

    fn document(&mut self) -> Option<&RegistryDocument> {
        if !self.ensure_loaded() {
            return None;
        }
        self.data.as_ref()
    }

    /// Check `url` (and `uuid`, once known) against the blacklist.
    ///
    /// Entries are scanned in four passes: UUID+URL pairs, UUID only, exact
    /// URL, URL pattern. The first hit wins.
    pub fn is_blacklisted(&mut self, url: &str, uuid: Option<&str>) -> BlacklistVerdict {
        let Some(document) = self.document() else {
            return BlacklistVerdict::clear();
        };
        let key = (!url.is_empty()).then(|| url_match_key(url));
        let normalized = normalize_git_url(url);
        let uuid = uuid.filter(|u| !u.is_empty());
        let same_uuid = |entry: &BlacklistEntry| uuid.is_some() && entry.uuid.as_deref() == uuid;
        let same_url = |entry_url: &str| key.as_deref() == Some(url_match_key(entry_url).as_str());

        for entry in &document.blacklist {
            if let Some(entry_url) = &entry.url
                && entry.uuid.is_some()
                && same_uuid(entry)
                && same_url(entry_url)
            {
                return BlacklistVerdict::hit(&entry.reason, "Plugin is blacklisted");
            }
        }
        for entry in &document.blacklist {
            if entry.url.is_none() && same_uuid(entry) {
                return BlacklistVerdict::hit(&entry.reason, "Plugin UUID is blacklisted");
            }
        }
        for entry in &document.blacklist {
            if let Some(entry_url) = &entry.url
                && entry.uuid.is_none()
                && same_url(entry_url)
            {
                return BlacklistVerdict::hit(&entry.reason, "Plugin is blacklisted");
            }
        }
        if key.is_some() {
            for entry in &document.blacklist {
                let (Some(pattern), None, None) = (&entry.url_regex, &entry.uuid, &entry.url) else {
                    continue;
                };
                match Regex::new(pattern) {
                    Ok(re) if re.find(&normalized).is_some_and(|m| m.start() == 0) => {
                        return BlacklistVerdict::hit(
                            &entry.reason,
                            "Plugin matches blacklisted pattern",
                        );
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!(pattern, error = %e, "Invalid regex in blacklist"),
                }
            }
        }
        BlacklistVerdict::clear()
    }

    /// Trust level of the plugin served from `url`.
    pub fn get_trust_level(&mut self, url: &str) -> TrustLevel {
        let Some(document) = self.document() else {
            return TrustLevel::Unregistered;
        };
        document
            .plugins
            .iter()
            .find(|p| same_repository(&p.git_url, url))
            .map(RegistryPlugin::trust)
            .unwrap_or(TrustLevel::Unregistered)
    }

    /// Look a plugin up by id, URL or UUID, following redirects.
    pub fn find_plugin(&mut self, query: PluginQuery<'_>) -> Option<RegistryPlugin> {
        let document = self.document()?;
        let plugins = &document.plugins;

        let direct = plugins.iter().find(|p| match query {
            PluginQuery::Id(id) => p.id == id,
            PluginQuery::Uuid(uuid) => p.uuid.as_deref() == Some(uuid),
            PluginQuery::Url(url) => !p.git_url.is_empty() && same_repository(&p.git_url, url),
        });
        if let Some(plugin) = direct {
            return Some(plugin.clone());
        }

        let redirected = plugins.iter().find(|p| match query {
            PluginQuery::Id(_) => false,
            PluginQuery::Uuid(uuid) => p.redirect_from_uuid.iter().any(|old| old == uuid),
            PluginQuery::Url(url) => p.redirect_from.iter().any(|old| same_repository(old, url)),
        });
        if let Some(plugin) = redirected {
            tracing::info!(?query, now = %plugin.git_url, "Found plugin via redirect");
        }
        redirected.cloned()
    }

    /// Registry id of the plugin with this UUID or URL.
    pub fn get_registry_id(&mut self, url: Option<&str>, uuid: Option<&str>) -> Option<String> {
        if let Some(uuid) = uuid
            && let Some(plugin) = self.find_plugin(PluginQuery::Uuid(uuid))
        {
            return Some(plugin.id);
        }
        let url = url?;
        self.find_plugin(PluginQuery::Url(url)).map(|p| p.id)
    }

    /// All plugins, optionally filtered by category and trust level.
    pub fn list_plugins(
        &mut self,
        category: Option<&str>,
        trust_level: Option<TrustLevel>,
    ) -> Vec<RegistryPlugin> {
        let Some(document) = self.document() else {
            return Vec::new();
        };
        document
            .plugins
            .iter()
            .filter(|p| trust_level.is_none_or(|t| p.trust() == t))
            .filter(|p| category.is_none_or(|c| p.categories.iter().any(|pc| pc == c)))
            .cloned()
            .collect()
    }

    /// Case-insensitive substring search over id, name and description.
    pub fn search(&mut self, query: &str) -> Vec<RegistryPlugin> {
        let needle = query.to_lowercase();
        self.list_plugins(None, None)
            .into_iter()
            .filter(|p| {
                [Some(p.id.as_str()), p.name.as_deref(), p.description.as_deref()]
                    .into_iter()
                    .flatten()
                    .any(|field| field.to_lowercase().contains(&needle))
            })
            .collect()
    }

    /// Registry ids containing `query`, case-insensitively.
    ///
    /// Empty when nothing matches or when more than `max_results` do.
    pub fn find_similar_plugin_ids(&mut self, query: &str, max_results: usize) -> Vec<String> {
        let needle = query.to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        let matches: Vec<String> = self
            .list_plugins(None, None)
            .into_iter()
            .map(|p| p.id)
            .filter(|id| id.to_lowercase().contains(&needle))
            .collect();
        if matches.len() > max_results {
            return Vec::new();
        }
        matches
    }

    /// Which kinds of blacklist rule the registry uses (`uuid`, `url`,
    /// `url_regex`).
    pub fn get_blacklist_types(&mut self) -> BTreeSet<&'static str> {
        let Some(document) = self.document() else {
            return BTreeSet::new();
        };
        let mut types = BTreeSet::new();
        for entry in &document.blacklist {
            if entry.uuid.is_some() {
                types.insert("uuid");
            }
            if entry.url.is_some() {
                types.insert("url");
            }
            if entry.url_regex.is_some() {
                types.insert("url_regex");
            }
        }
        types
    }

    pub fn get_registry_info(&mut self) -> Option<RegistryInfo> {
        let registry_url = self.registry_url.clone();
        let document = self.document()?;
        Some(RegistryInfo {
            plugin_count: document.plugins.len(),
            api_version: document.api_version.clone(),
            registry_url,
        })
    }

    /// Where a plugin installed from `url` with `uuid` lives now.
    ///
    /// A UUID match with a different repository moves the URL; otherwise a
    /// URL match with a different UUID changes the UUID.
    pub fn check_redirects(&mut self, url: &str, uuid: Option<&str>) -> Redirect {
        if let Some(uuid) = uuid
            && let Some(plugin) = self.find_plugin(PluginQuery::Uuid(uuid))
            && !plugin.git_url.is_empty()
            && !same_repository(&plugin.git_url, url)
        {
            tracing::info!(uuid, from = url, to = %plugin.git_url, "Plugin moved to a new URL");
            return Redirect {
                url: plugin.git_url,
                uuid: Some(uuid.to_string()),
                url_changed: true,
                uuid_changed: false,
            };
        }

        if let Some(plugin) = self.find_plugin(PluginQuery::Url(url))
            && let Some(new_uuid) = plugin.uuid
            && uuid != Some(new_uuid.as_str())
        {
            tracing::info!(url, ?uuid, to = %new_uuid, "Plugin changed UUID");
            return Redirect {
                url: url.to_string(),
                uuid: Some(new_uuid),
                url_changed: false,
                uuid_changed: true,
            };
        }

        Redirect::unchanged(url, uuid)
    }
}

/// Pick the ref to install for a registry entry.
///
/// With a versioning scheme and at least one matching tag, the newest tag
/// wins. Otherwise the first declared ref whose API range contains
/// `host_api`, else the first declared ref.
pub fn select_ref_for_plugin(
    plugin: &RegistryPlugin,
    available_tags: &[String],
    host_api: &str,
) -> Option<String> {
    if let Some(scheme) = plugin.versioning() {
        let tags = scheme.filter_tags(available_tags.iter().map(String::as_str));
        if let Some(newest) = scheme.sort_tags(&tags).into_iter().next() {
            return Some(newest);
        }
        tracing::warn!(plugin = %plugin.id, "No version tags match the declared scheme");
    }

    let host = parse_version(host_api);
    let compatible = plugin.refs.iter().find(|r| {
        let below_min = r
            .min_api_version
            .as_deref()
            .and_then(parse_version)
            .zip(host.as_ref())
            .is_some_and(|(min, host)| *host < min);
        let above_max = r
            .max_api_version
            .as_deref()
            .and_then(parse_version)
            .zip(host.as_ref())
            .is_some_and(|(max, host)| *host > max);
        !below_min && !above_max
    });

    compatible
        .or_else(|| plugin.refs.first())
        .map(|r| r.name.clone())
}
