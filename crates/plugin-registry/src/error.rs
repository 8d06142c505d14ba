use std::path::PathBuf;

/// Errors raised while loading the registry.
///
/// Queries never return these: once loading fails they answer with their
/// fail-open defaults.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The document could not be retrieved from `url`.
    #[error("failed to fetch registry from {url}: {message}")]
    Fetch { url: String, message: String },

    /// The document was retrieved but is not a valid registry.
    #[error("failed to parse registry from {url}: {message}")]
    Parse { url: String, message: String },

    /// The cache file could not be read or written.
    #[error("failed to {operation} registry cache {}: {message}", path.display())]
    Cache {
        path: PathBuf,
        operation: &'static str,
        message: String,
    },

    /// No registry URLs are configured.
    #[error("no registry URLs configured")]
    NoUrls,
}

impl Error {
    pub(crate) fn fetch(url: &str, message: impl std::fmt::Display) -> Self {
        Self::Fetch {
            url: url.to_string(),
            message: message.to_string(),
        }
    }

    pub(crate) fn parse(url: &str, message: impl std::fmt::Display) -> Self {
        Self::Parse {
            url: url.to_string(),
            message: message.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
