//! On-disk cache of remote branch and tag listings
//!
//! Listing the refs of a repository that is not installed means a full
//! fetch into a scratch repository. Results are kept per normalized URL in
//! `plugin_refs_cache.json` next to the registry cache and reused until
//! they are older than [`REFS_CACHE_TTL`]. Expired entries still serve as
//! a fallback when the remote cannot be reached.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use plugin_fs::{ConfigStore, NormalizedPath};
use serde::{Deserialize, Serialize};

use crate::Result;

pub const REFS_CACHE_FILE: &str = "plugin_refs_cache.json";
pub const REFS_CACHE_TTL: Duration = Duration::from_secs(3600);
/// Bumped whenever the file layout changes; other versions are discarded.
pub const REFS_CACHE_VERSION: u32 = 2;

/// Slot holding the full branch and tag listing of a URL.
const ALL_REFS: &str = "all_refs";

/// Branches and tags of one repository at the time they were fetched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedRefs {
    #[serde(default)]
    pub branches: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Unix seconds.
    #[serde(default)]
    pub timestamp: i64,
}

impl CachedRefs {
    fn age(&self, now: i64) -> Duration {
        Duration::from_secs(now.saturating_sub(self.timestamp).max(0) as u64)
    }
}

/// `url -> slot -> refs`; full listings live in the `all_refs` slot.
type CacheData = BTreeMap<String, BTreeMap<String, CachedRefs>>;

#[derive(Debug, Serialize, Deserialize)]
struct CacheEnvelope {
    version: u32,
    #[serde(default)]
    data: CacheData,
}

/// Lazily loaded refs cache.
///
/// Write failures are logged and otherwise ignored: the cache only ever
/// saves a fetch.
#[derive(Debug)]
pub struct RefsCache {
    path: NormalizedPath,
    store: ConfigStore,
    data: Option<CacheData>,
}

impl RefsCache {
    /// Cache stored in `cache_dir`.
    pub fn new(cache_dir: &Path) -> Self {
        Self {
            path: NormalizedPath::new(cache_dir.join(REFS_CACHE_FILE)),
            store: ConfigStore::new(),
            data: None,
        }
    }

    pub fn path(&self) -> &NormalizedPath {
        &self.path
    }

    /// Full listing of `url`, if cached and fresh, or any age when
    /// `allow_expired` is set.
    pub fn all_refs(&mut self, url: &str, allow_expired: bool) -> Option<CachedRefs> {
        self.lookup(url, ALL_REFS, allow_expired)
    }

    pub fn store_all_refs(&mut self, url: &str, branches: Vec<String>, tags: Vec<String>) {
        tracing::debug!(url, branches = branches.len(), tags = tags.len(), "Caching refs");
        self.insert(url, ALL_REFS, CachedRefs { branches, tags, timestamp: now() });
    }

    /// Drop entries for URLs not in `keep`. Returns how many were removed.
    pub fn retain_urls(&mut self, keep: &[String]) -> usize {
        let data = self.load();
        let before = data.len();
        data.retain(|url, _| keep.iter().any(|k| k == url));
        let removed = before - data.len();
        if removed > 0 {
            tracing::debug!(removed, "Pruned refs cache");
            self.save();
        }
        removed
    }

    /// Forget everything, on disk and in memory.
    pub fn clear(&mut self) -> Result<()> {
        self.data = None;
        match std::fs::remove_file(self.path.to_native()) {
            Ok(()) => {
                tracing::debug!(path = %self.path, "Cleared refs cache");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn lookup(&mut self, url: &str, slot: &str, allow_expired: bool) -> Option<CachedRefs> {
        let entry = self.load().get(url)?.get(slot)?.clone();
        let age = entry.age(now());
        if age > REFS_CACHE_TTL {
            if !allow_expired {
                tracing::debug!(url, slot, age_secs = age.as_secs(), "Refs cache entry expired");
                return None;
            }
            tracing::debug!(url, slot, age_secs = age.as_secs(), "Using expired refs cache entry");
        }
        Some(entry)
    }

    fn insert(&mut self, url: &str, slot: &str, entry: CachedRefs) {
        self.load()
            .entry(url.to_string())
            .or_default()
            .insert(slot.to_string(), entry);
        self.save();
    }

    fn load(&mut self) -> &mut CacheData {
        let path = &self.path;
        let store = &self.store;
        self.data.get_or_insert_with(|| match store.load_optional::<CacheEnvelope>(path) {
            Ok(Some(envelope)) if envelope.version == REFS_CACHE_VERSION => envelope.data,
            Ok(Some(envelope)) => {
                tracing::debug!(
                    path = %path,
                    found = envelope.version,
                    expected = REFS_CACHE_VERSION,
                    "Refs cache version mismatch, discarding"
                );
                CacheData::new()
            }
            Ok(None) => CacheData::new(),
            Err(e) => {
                tracing::debug!(path = %path, error = %e, "Refs cache unreadable, discarding");
                CacheData::new()
            }
        })
    }

    fn save(&self) {
        let Some(data) = &self.data else {
            return;
        };
        let envelope = CacheEnvelope {
            version: REFS_CACHE_VERSION,
            data: data.clone(),
        };
        if let Err(e) = self.store.save(&self.path, &envelope) {
            tracing::warn!(path = %self.path, error = %e, "Failed to save refs cache");
        }
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}
