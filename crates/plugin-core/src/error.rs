//! Error types for plugin-core

use std::path::PathBuf;

/// Result type for plugin-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Category of a manager failure.
///
/// Front ends switch on this instead of matching every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Repository,
    RefNotFound,
    RefSwitch,
    Blacklisted,
    AlreadyInstalled,
    NotFound,
    NotARepository,
    ManifestNotFound,
    ManifestRead,
    ManifestInvalid,
    NoSource,
    CommitPinned,
    UuidConflict,
    NoUuid,
    Dirty,
    IncompatibleApi,
    Hook,
    RollbackFailed,
    OutsidePluginDir,
    Registry,
    Io,
}

/// Errors that can occur in plugin-core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Requested ref does not exist in the plugin repository
    #[error(
        "Ref '{reference}' not found for plugin {plugin_id}{}",
        .hint.as_ref().map(|h| format!(" (did you mean '{h}'?)")).unwrap_or_default()
    )]
    RefNotFound {
        plugin_id: String,
        reference: String,
        hint: Option<String>,
    },

    #[error("Cannot switch plugin {plugin_id} to ref {reference}: {message}")]
    RefSwitch {
        plugin_id: String,
        reference: String,
        message: String,
    },

    #[error("Plugin is blacklisted: {reason}")]
    Blacklisted {
        url: String,
        uuid: Option<String>,
        reason: String,
    },

    #[error("Plugin {plugin_id} is already installed")]
    AlreadyInstalled { plugin_id: String },

    #[error("Plugin not found: {plugin_id}")]
    NotFound { plugin_id: String },

    #[error(
        "{} is not a git repository; plugins must be installed from git repositories",
        path.display()
    )]
    NotARepository { path: PathBuf },

    #[error("No MANIFEST.toml found in {}", path.display())]
    ManifestNotFound { path: PathBuf },

    #[error("Failed to read MANIFEST.toml in {}: {message}", path.display())]
    ManifestRead { path: PathBuf, message: String },

    #[error("Invalid MANIFEST.toml:\n  {}", errors.join("\n  "))]
    ManifestInvalid { errors: Vec<String> },

    #[error("Plugin {plugin_id} has no stored URL, cannot {operation}")]
    NoSource {
        plugin_id: String,
        operation: &'static str,
    },

    #[error("Plugin {plugin_id} is pinned to commit \"{commit}\" and cannot be updated")]
    CommitPinned { plugin_id: String, commit: String },

    #[error(
        "Plugin UUID {uuid} already exists in plugin \"{existing_id}\" from source \
         \"{existing_source}\". Cannot install from different source \"{new_source}\"."
    )]
    UuidConflict {
        uuid: String,
        existing_id: String,
        existing_source: String,
        new_source: String,
    },

    #[error("Plugin {plugin_id} has no UUID")]
    NoUuid { plugin_id: String },

    #[error("Plugin {plugin_id} has uncommitted changes")]
    Dirty {
        plugin_id: String,
        changes: Vec<String>,
    },

    #[error(
        "Plugin {plugin_id} requires API versions {} but this host supports {}",
        required.join(", "),
        supported.join(", ")
    )]
    IncompatibleApi {
        plugin_id: String,
        required: Vec<String>,
        supported: Vec<String>,
    },

    /// A host hook refused to enable or disable the plugin
    #[error("Plugin {plugin_id} failed to {action}: {message}")]
    Hook {
        plugin_id: String,
        action: &'static str,
        message: String,
    },

    #[error("Rollback of plugin {plugin_id} failed, plugin was removed: {message}")]
    RollbackFailed { plugin_id: String, message: String },

    #[error("Plugin path {} is not inside the plugin directory {}", path.display(), root.display())]
    OutsidePluginDir { path: PathBuf, root: PathBuf },

    // Transparent wrappers for underlying crate errors
    /// Git error from plugin-git
    #[error(transparent)]
    Repository(#[from] plugin_git::Error),

    /// Registry error from plugin-registry
    #[error(transparent)]
    Registry(#[from] plugin_registry::Error),

    /// Filesystem error from plugin-fs
    #[error(transparent)]
    Fs(#[from] plugin_fs::Error),

    /// Standard I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Settings value with an unexpected shape
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RefNotFound { .. } => ErrorKind::RefNotFound,
            Self::RefSwitch { .. } => ErrorKind::RefSwitch,
            Self::Blacklisted { .. } => ErrorKind::Blacklisted,
            Self::AlreadyInstalled { .. } => ErrorKind::AlreadyInstalled,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::NotARepository { .. } => ErrorKind::NotARepository,
            Self::ManifestNotFound { .. } => ErrorKind::ManifestNotFound,
            Self::ManifestRead { .. } => ErrorKind::ManifestRead,
            Self::ManifestInvalid { .. } => ErrorKind::ManifestInvalid,
            Self::NoSource { .. } => ErrorKind::NoSource,
            Self::CommitPinned { .. } => ErrorKind::CommitPinned,
            Self::UuidConflict { .. } => ErrorKind::UuidConflict,
            Self::NoUuid { .. } => ErrorKind::NoUuid,
            Self::Dirty { .. } => ErrorKind::Dirty,
            Self::IncompatibleApi { .. } => ErrorKind::IncompatibleApi,
            Self::Hook { .. } => ErrorKind::Hook,
            Self::RollbackFailed { .. } => ErrorKind::RollbackFailed,
            Self::OutsidePluginDir { .. } => ErrorKind::OutsidePluginDir,
            Self::Repository(_) => ErrorKind::Repository,
            Self::Registry(_) => ErrorKind::Registry,
            Self::Fs(_) | Self::Io(_) | Self::Json(_) => ErrorKind::Io,
        }
    }

    /// Whether the failure is about something that does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::NotFound | ErrorKind::RefNotFound | ErrorKind::ManifestNotFound
        )
    }

    pub(crate) fn manifest_read(path: impl Into<PathBuf>, message: impl std::fmt::Display) -> Self {
        Self::ManifestRead {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Attribute a ref-switch failure to `plugin_id`.
    pub(crate) fn from_switch(plugin_id: &str, reference: &str, error: plugin_git::Error) -> Self {
        match error {
            plugin_git::Error::RefNotFound { reference, hint } => Self::RefNotFound {
                plugin_id: plugin_id.to_string(),
                reference,
                hint,
            },
            other => Self::RefSwitch {
                plugin_id: plugin_id.to_string(),
                reference: reference.to_string(),
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn switch_not_found_keeps_hint() {
        let err = Error::from_switch(
            "demo",
            "dev~1",
            plugin_git::Error::RefNotFound {
                reference: "dev~1".into(),
                hint: Some("origin/dev".into()),
            },
        );
        assert_eq!(err.kind(), ErrorKind::RefNotFound);
        assert_eq!(
            err.to_string(),
            "Ref 'dev~1' not found for plugin demo (did you mean 'origin/dev'?)"
        );
        assert!(err.is_not_found());
    }

    #[test]
    fn other_switch_failures_become_ref_switch() {
        let err = Error::from_switch("demo", "main", plugin_git::Error::repository("offline"));
        assert_eq!(err.kind(), ErrorKind::RefSwitch);
        assert!(err.to_string().contains("offline"));
    }

    #[test]
    fn invalid_manifest_lists_every_error() {
        let err = Error::ManifestInvalid {
            errors: vec!["Missing required field: uuid".into(), "Invalid API version".into()],
        };
        assert_eq!(
            err.to_string(),
            "Invalid MANIFEST.toml:\n  Missing required field: uuid\n  Invalid API version"
        );
    }

    #[test]
    fn wrapped_git_errors_are_repository_kind() {
        let err: Error = plugin_git::Error::repository("broken").into();
        assert_eq!(err.kind(), ErrorKind::Repository);
    }
}
