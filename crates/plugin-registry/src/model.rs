//! Registry document types
//!
//! These mirror the JSON served by registry endpoints. Optional fields
//! default when absent so older documents keep parsing.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::versioning::VersioningScheme;

/// How much the registry vouches for a plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustLevel {
    Official,
    Trusted,
    Community,
    /// Not listed in the registry at all.
    Unregistered,
}

impl TrustLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Official => "official",
            Self::Trusted => "trusted",
            Self::Community => "community",
            Self::Unregistered => "unregistered",
        }
    }
}

impl fmt::Display for TrustLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrustLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "official" => Ok(Self::Official),
            "trusted" => Ok(Self::Trusted),
            "community" => Ok(Self::Community),
            "unregistered" => Ok(Self::Unregistered),
            other => Err(format!(
                "unknown trust level '{other}' (expected official, trusted, community or unregistered)"
            )),
        }
    }
}

/// A ref the registry recommends, with the host API range it supports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_api_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_api_version: Option<String>,
}

/// One catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryPlugin {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub git_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trust_level: Option<TrustLevel>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub versioning_scheme: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub refs: Vec<RegistryRef>,
    /// Previous repository URLs of this plugin.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub redirect_from: Vec<String>,
    /// Previous UUIDs of this plugin.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub redirect_from_uuid: Vec<String>,
}

impl RegistryPlugin {
    /// Declared trust level; entries without one are community plugins.
    pub fn trust(&self) -> TrustLevel {
        self.trust_level.unwrap_or(TrustLevel::Community)
    }

    /// Parsed versioning scheme, if declared and valid.
    pub fn versioning(&self) -> Option<VersioningScheme> {
        self.versioning_scheme
            .as_deref()
            .and_then(VersioningScheme::parse)
    }

    /// Display name, falling back to the registry id.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// A blacklist rule. Which fields are present decides how it matches.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BlacklistEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_regex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// The whole registry document.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RegistryDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(default)]
    pub plugins: Vec<RegistryPlugin>,
    #[serde(default)]
    pub blacklist: Vec<BlacklistEntry>,
}

/// Outcome of a blacklist check.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BlacklistVerdict {
    pub blacklisted: bool,
    pub reason: Option<String>,
}

impl BlacklistVerdict {
    pub fn clear() -> Self {
        Self::default()
    }

    pub(crate) fn hit(reason: &Option<String>, default: &str) -> Self {
        Self {
            blacklisted: true,
            reason: Some(reason.clone().unwrap_or_else(|| default.to_string())),
        }
    }
}

/// Where a plugin lives now according to the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub url: String,
    pub uuid: Option<String>,
    pub url_changed: bool,
    pub uuid_changed: bool,
}

impl Redirect {
    pub fn unchanged(url: &str, uuid: Option<&str>) -> Self {
        Self {
            url: url.to_string(),
            uuid: uuid.map(str::to_string),
            url_changed: false,
            uuid_changed: false,
        }
    }

    pub fn redirected(&self) -> bool {
        self.url_changed || self.uuid_changed
    }
}

/// Summary of the loaded registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistryInfo {
    pub plugin_count: usize,
    pub api_version: Option<String>,
    pub registry_url: String,
}

/// Lookup key for [`PluginRegistry::find_plugin`].
///
/// [`PluginRegistry::find_plugin`]: crate::PluginRegistry::find_plugin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginQuery<'a> {
    Id(&'a str),
    Url(&'a str),
    Uuid(&'a str),
}
