//! Git URL classification and normalization
//!
//! Every URL equality test in the workspace goes through
//! [`url_match_key`], so `https://Host/x.git/` and `https://host/x`
//! identify the same plugin.

use std::path::PathBuf;

use plugin_fs::NormalizedPath;

const FILE_SCHEME: &str = "file://";

/// Whether `url` refers to the local filesystem.
///
/// `file://` URLs are local; any other `scheme://` URL is remote; scp-like
/// `user@host:path` (with `@` before the first `:` and no `/` before it) is
/// remote. Everything else is treated as a path.
pub fn is_local_path(url: &str) -> bool {
    if url.is_empty() {
        return false;
    }
    if url.contains("://") {
        return url.starts_with(FILE_SCHEME);
    }
    if let (Some(at), Some(colon)) = (url.find('@'), url.find(':'))
        && at < colon
        && !url[..colon].contains('/')
    {
        return false;
    }
    true
}

/// Absolute filesystem path for a local `url`, or `None` for remote URLs.
pub fn local_path(url: &str) -> Option<PathBuf> {
    if !is_local_path(url) {
        return None;
    }
    let raw = url.strip_prefix(FILE_SCHEME).unwrap_or(url);
    Some(NormalizedPath::absolutize(raw).to_native())
}

/// Canonical spelling of a git URL.
///
/// Local paths lose any `file://` prefix, have `~` expanded and are made
/// absolute. Remote URLs get a lowercase scheme and host and lose trailing
/// slashes. The function is idempotent.
pub fn normalize_git_url(url: &str) -> String {
    if url.is_empty() {
        return String::new();
    }
    if is_local_path(url) {
        let raw = url.strip_prefix(FILE_SCHEME).unwrap_or(url);
        return NormalizedPath::absolutize(raw).as_str().to_string();
    }

    let trimmed = url.trim_end_matches('/');
    let Some((scheme, rest)) = trimmed.split_once("://") else {
        return trimmed.to_string();
    };
    let (authority, path) = match rest.find('/') {
        Some(idx) => rest.split_at(idx),
        None => (rest, ""),
    };
    let authority = match authority.rsplit_once('@') {
        Some((user, host)) => format!("{user}@{}", host.to_ascii_lowercase()),
        None => authority.to_ascii_lowercase(),
    };
    format!("{}://{authority}{path}", scheme.to_ascii_lowercase())
}

/// Comparison key: the normalized URL without a trailing `.git`.
pub fn url_match_key(url: &str) -> String {
    let normalized = normalize_git_url(url);
    match normalized.strip_suffix(".git") {
        Some(stripped) => stripped.trim_end_matches('/').to_string(),
        None => normalized,
    }
}

/// Whether two URLs name the same repository.
pub fn same_repository(a: &str, b: &str) -> bool {
    url_match_key(a) == url_match_key(b)
}
