//! Error types for plugin-cli

use plugin_core::ErrorKind;

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

/// Exit code for any failure without a more specific code
pub const EXIT_ERROR: i32 = 1;
/// Exit code when a plugin, ref or manifest does not exist
pub const EXIT_NOT_FOUND: i32 = 2;
/// Exit code when the user declined a confirmation
pub const EXIT_CANCELLED: i32 = 130;

/// Errors that can occur in CLI operations
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Error from plugin-core
    #[error(transparent)]
    Core(#[from] plugin_core::Error),

    /// Error from plugin-registry
    #[error(transparent)]
    Registry(#[from] plugin_registry::Error),

    /// Error from plugin-git
    #[error(transparent)]
    Git(#[from] plugin_git::Error),

    /// Standard I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON output error
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Interactive prompt error
    #[error("Interactive prompt error: {0}")]
    Dialoguer(#[from] dialoguer::Error),

    /// User-facing error with a message
    #[error("{message}")]
    User { message: String },

    /// No plugin matched an identifier
    #[error("{source}")]
    UnknownPlugin {
        source: plugin_core::Error,
        suggestions: Vec<String>,
    },

    /// The user declined a confirmation
    #[error("Cancelled")]
    Cancelled,
}

impl CliError {
    /// Create a new user error with the given message
    pub fn user(message: impl Into<String>) -> Self {
        Self::User {
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Cancelled => EXIT_CANCELLED,
            Self::UnknownPlugin { .. } => EXIT_NOT_FOUND,
            Self::Core(e) if e.is_not_found() => EXIT_NOT_FOUND,
            Self::Git(plugin_git::Error::RefNotFound { .. }) => EXIT_NOT_FOUND,
            _ => EXIT_ERROR,
        }
    }

    /// A follow-up suggestion printed under the error message.
    pub fn hint(&self) -> Option<&'static str> {
        let e = match self {
            Self::Core(e) => e,
            Self::UnknownPlugin { suggestions, .. } if suggestions.is_empty() => {
                return Some("run `plugins list` or `plugins search` to find plugins");
            }
            _ => return None,
        };
        match e.kind() {
            ErrorKind::Blacklisted => Some("use --force-blacklisted to install anyway"),
            ErrorKind::UuidConflict => Some("use --reinstall to replace the installed plugin"),
            ErrorKind::AlreadyInstalled => Some("use --reinstall to install it again"),
            ErrorKind::Dirty => Some("use --discard-changes to throw away local changes"),
            ErrorKind::CommitPinned => Some("use switch-ref to move the plugin to a branch or tag"),
            ErrorKind::NotFound => Some("run `plugins list` to see installed plugins"),
            _ => None,
        }
    }
}
