//! Error types for plugin-git
//!
//! Every backend failure surfaces as one of three kinds: repository-level,
//! reference-level or commit-level. Callers switch on [`Error::kind`]
//! rather than inspecting messages.

/// Result type for plugin-git operations
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of a git failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Repository,
    Reference,
    Commit,
}

/// Errors that can occur in plugin-git operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Repository error: {message}")]
    Repository {
        message: String,
        #[source]
        source: Option<git2::Error>,
    },

    #[error("Reference error: {message}")]
    Reference {
        message: String,
        #[source]
        source: Option<git2::Error>,
    },

    #[error("Commit error: {message}")]
    Commit {
        message: String,
        #[source]
        source: Option<git2::Error>,
    },

    #[error(
        "Ref '{reference}' not found{}",
        .hint.as_ref().map(|h| format!(" (did you mean '{h}'?)")).unwrap_or_default()
    )]
    RefNotFound {
        reference: String,
        hint: Option<String>,
    },
}

impl Error {
    pub fn repository(message: impl Into<String>) -> Self {
        Self::Repository {
            message: message.into(),
            source: None,
        }
    }

    pub fn reference(message: impl Into<String>) -> Self {
        Self::Reference {
            message: message.into(),
            source: None,
        }
    }

    pub fn commit(message: impl Into<String>) -> Self {
        Self::Commit {
            message: message.into(),
            source: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Repository { .. } => ErrorKind::Repository,
            Self::Reference { .. } | Self::RefNotFound { .. } => ErrorKind::Reference,
            Self::Commit { .. } => ErrorKind::Commit,
        }
    }
}

impl From<git2::Error> for Error {
    fn from(e: git2::Error) -> Self {
        use git2::{ErrorClass, ErrorCode};

        let message = e.message().to_string();
        match (e.class(), e.code()) {
            (ErrorClass::Reference, _) | (_, ErrorCode::InvalidSpec) => Self::Reference {
                message,
                source: Some(e),
            },
            (ErrorClass::Object | ErrorClass::Odb | ErrorClass::Tag, _)
            | (_, ErrorCode::Peel | ErrorCode::Ambiguous) => Self::Commit {
                message,
                source: Some(e),
            },
            _ => Self::Repository {
                message,
                source: Some(e),
            },
        }
    }
}
