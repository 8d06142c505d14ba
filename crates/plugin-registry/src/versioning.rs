//! Tag versioning schemes
//!
//! A registry entry may declare how its release tags are named:
//!
//! - `semver`: `v1.2.3`, `release-1.2.3` (any non-digit prefix)
//! - `calver`: `2024.01.15`
//! - `regex:<pattern>`: anything matching the pattern at the start of the tag
//!
//! The scheme decides which tags count as releases and how they are ordered.

use std::cmp::Ordering;

use regex::Regex;

const SEMVER_PATTERN: &str = r"^\D*\d+\.\d+\.\d+$";
const CALVER_PATTERN: &str = r"^\d{4}\.\d{2}\.\d{2}$";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemeKind {
    Semver,
    Calver,
    Regex,
}

/// A parsed versioning scheme with its compiled tag pattern.
#[derive(Debug, Clone)]
pub struct VersioningScheme {
    kind: SchemeKind,
    pattern: Regex,
}

impl VersioningScheme {
    /// Parse `semver`, `calver` or `regex:<pattern>`.
    ///
    /// Unknown schemes and invalid patterns yield `None` and are logged.
    pub fn parse(scheme: &str) -> Option<Self> {
        let (kind, pattern) = match scheme {
            "semver" => (SchemeKind::Semver, SEMVER_PATTERN),
            "calver" => (SchemeKind::Calver, CALVER_PATTERN),
            other => match other.strip_prefix("regex:") {
                Some(pattern) => (SchemeKind::Regex, pattern),
                None => {
                    tracing::warn!(scheme, "Unknown versioning scheme");
                    return None;
                }
            },
        };

        match Regex::new(pattern) {
            Ok(pattern) => Some(Self { kind, pattern }),
            Err(e) => {
                tracing::error!(scheme, error = %e, "Invalid regex in versioning scheme");
                None
            }
        }
    }

    pub fn kind(&self) -> SchemeKind {
        self.kind
    }

    /// Whether `tag` is a release tag under this scheme.
    pub fn matches(&self, tag: &str) -> bool {
        self.pattern.find(tag).is_some_and(|m| m.start() == 0)
    }

    /// Keep release tags from a list of ref names.
    ///
    /// Accepts full `refs/tags/<name>` entries or bare tag names. Other
    /// `refs/` namespaces and peeled `^{}` entries are dropped. Returned
    /// names carry no prefix.
    pub fn filter_tags<'a>(&self, ref_names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        ref_names
            .into_iter()
            .filter_map(|name| match name.strip_prefix("refs/tags/") {
                Some(tag) => Some(tag),
                None if name.starts_with("refs/") => None,
                None => Some(name),
            })
            .filter(|tag| !tag.ends_with("^{}") && self.matches(tag))
            .map(str::to_string)
            .collect()
    }

    /// Sort tags newest first.
    pub fn sort_tags(&self, tags: &[String]) -> Vec<String> {
        let mut sorted = tags.to_vec();
        sorted.sort_by(|a, b| self.compare(b, a));
        sorted
    }

    /// The newest tag strictly newer than `current`, if any.
    pub fn find_newer_tag(&self, current: &str, tags: &[String]) -> Option<String> {
        if self.kind == SchemeKind::Semver && parse_version(current).is_none() {
            tracing::debug!(current, "Current tag is not a semantic version");
            return None;
        }
        self.sort_tags(tags)
            .into_iter()
            .find(|tag| self.compare(tag, current) == Ordering::Greater)
    }

    /// Order two tags under this scheme (older is `Less`).
    pub fn compare(&self, a: &str, b: &str) -> Ordering {
        match self.kind {
            SchemeKind::Semver => {
                let key = |t: &str| (parse_version(t), strip_prefix(t).to_string());
                key(a).cmp(&key(b))
            }
            SchemeKind::Calver => strip_prefix(a).cmp(strip_prefix(b)),
            SchemeKind::Regex => regex_key(a).cmp(&regex_key(b)),
        }
    }
}

/// Drop everything before the first ASCII digit.
pub fn strip_prefix(tag: &str) -> &str {
    match tag.find(|c: char| c.is_ascii_digit()) {
        Some(idx) => &tag[idx..],
        None => tag,
    }
}

/// Parse a tag as a semantic version, padding missing minor/patch parts.
pub fn parse_version(tag: &str) -> Option<semver::Version> {
    let stripped = strip_prefix(tag);
    let (core, suffix) = match stripped.find(['-', '+']) {
        Some(idx) => stripped.split_at(idx),
        None => (stripped, ""),
    };
    let padded = match core.split('.').count() {
        1 => format!("{core}.0.0{suffix}"),
        2 => format!("{core}.0{suffix}"),
        _ => stripped.to_string(),
    };
    semver::Version::parse(&padded).ok()
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Part {
    Num(u64),
    Text(String),
}

fn natural_parts(s: &str) -> Vec<Part> {
    let mut parts = Vec::new();
    let mut rest = s;
    while let Some(first) = rest.chars().next() {
        let is_digit = first.is_ascii_digit();
        let end = rest
            .find(|c: char| c.is_ascii_digit() != is_digit)
            .unwrap_or(rest.len());
        let (chunk, tail) = rest.split_at(end);
        parts.push(if is_digit {
            Part::Num(chunk.parse().unwrap_or(u64::MAX))
        } else {
            Part::Text(chunk.to_string())
        });
        rest = tail;
    }
    parts
}

/// Parseable versions rank above everything else; the rest use
/// digit-aware natural ordering.
fn regex_key(tag: &str) -> (Option<semver::Version>, Vec<Part>) {
    (parse_version(tag), natural_parts(strip_prefix(tag)))
}
