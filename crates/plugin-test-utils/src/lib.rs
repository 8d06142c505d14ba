//! Shared test utilities for the plugin-manager workspace.
//!
//! Dev-dependency only, never published.
//!
//! # Modules
//!
//! - [`git`]: plugin source repositories built with `git2` (commits, tags,
//!   branches, bare mirrors)
//! - [`manifest`]: manifest and registry document builders

pub mod git;
pub mod manifest;

pub use git::PluginSource;
pub use manifest::{manifest_toml, registry_json};
