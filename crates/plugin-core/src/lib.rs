//! Plugin lifecycle management
//!
//! This crate sits above the Layer 0 crates and implements everything the
//! host needs to manage git-hosted plugins:
//!
//! - **Manifests**: parsing and validating `MANIFEST.toml`
//! - **Metadata**: where each plugin came from, keyed by UUID
//! - **PluginManager**: install, update, switch-ref, enable/disable,
//!   uninstall and startup discovery
//!
//! # Architecture
//!
//! ```text
//!                  plugins CLI / host
//!                          |
//!                     plugin-core
//!                          |
//!        +-----------------+-----------------+
//!        |                 |                 |
//!    plugin-fs        plugin-git      plugin-registry
//! ```
//!
//! # Example
//!
//! ```ignore
//! use plugin_core::{InstallOptions, ManagerConfig, PluginManager, Result};
//!
//! fn example() -> Result<()> {
//!     let mut manager = PluginManager::new(ManagerConfig::load(None)?)?;
//!     manager.init_plugins()?;
//!     let plugin_id = manager.install_plugin(
//!         "https://github.com/example/my-plugin",
//!         InstallOptions::default().enable(true),
//!     )?;
//!     println!("installed {plugin_id}");
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod hooks;
pub mod manager;
pub mod manifest;
pub mod metadata;
pub mod plugin;
pub mod refs_cache;
pub mod settings;
pub mod uuid_registry;

pub use config::{ConfigFile, ManagerConfig};
pub use error::{Error, ErrorKind, Result};
pub use hooks::{HookError, NoopHooks, PluginEvent, PluginHooks};
pub use manager::{
    FailedPlugin, InitReport, InstallOptions, PluginManager, RefListing, UpdateCheck, UpdateOutcome,
    UpdateResult,
};
pub use manifest::{MANIFEST_FILE, Manifest, manifest_template, validate_manifest};
pub use metadata::{MetadataStore, PluginMetadata};
pub use plugin::{Plugin, PluginState, directory_name};
pub use refs_cache::{CachedRefs, REFS_CACHE_TTL, RefsCache};
pub use settings::{JsonSettings, MemorySettings, SettingsStore};
pub use uuid_registry::UuidRegistry;
