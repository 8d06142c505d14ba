//! Plugin registry client
//!
//! The registry is a JSON catalog of known plugins: trust levels, blacklist
//! entries, redirects and per-plugin ref policy. [`PluginRegistry`] loads it
//! lazily from a prioritized list of URLs (local files or HTTP), caches it
//! on disk, and answers queries. Every query fails open when the catalog
//! could not be fetched.
//!
//! # Modules
//!
//! - [`client`]: [`PluginRegistry`] and its configuration
//! - [`fetch`]: HTTP/local document loading with retry and backoff
//! - [`model`]: registry document types
//! - [`url`]: git URL classification and normalization
//! - [`versioning`]: tag filtering and ordering by versioning scheme

pub mod client;
pub mod error;
pub mod fetch;
pub mod model;
pub mod url;
pub mod versioning;

pub use client::{PluginRegistry, RegistryConfig, select_ref_for_plugin};
pub use error::{Error, Result};
pub use fetch::RetryPolicy;
pub use model::{
    BlacklistEntry, BlacklistVerdict, PluginQuery, Redirect, RegistryDocument, RegistryInfo,
    RegistryPlugin, RegistryRef, TrustLevel,
};
pub use url::{is_local_path, normalize_git_url, url_match_key};
pub use versioning::VersioningScheme;

/// Environment variable holding a registry URL tried before the defaults.
pub const REGISTRY_URL_ENV: &str = "PLUGIN_REGISTRY_URL";

/// Built-in registry locations, in priority order.
pub const DEFAULT_REGISTRY_URLS: &[&str] = &[
    "https://plugins.plugin-manager.dev/api/v1/registry.json",
    "https://raw.githubusercontent.com/plugin-manager/registry/main/registry.json",
];

/// Format version of the on-disk cache wrapper. Bump when the layout of
/// [`RegistryDocument`] changes incompatibly.
pub const REGISTRY_CACHE_VERSION: u32 = 1;
