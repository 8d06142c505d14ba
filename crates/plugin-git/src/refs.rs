//! Value types produced by backend queries

use std::fmt;

/// Kind of a listed reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefKind {
    Branch,
    Tag,
    Head,
}

/// A reference descriptor as returned by [`GitRepository::list_references`].
///
/// [`GitRepository::list_references`]: crate::GitRepository::list_references
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitRef {
    /// Full name, e.g. `refs/remotes/origin/main`.
    pub name: String,
    /// Object id the reference points at (for annotated tags, the tag object).
    pub target: Option<String>,
    pub kind: RefKind,
    pub is_remote: bool,
    pub is_annotated: bool,
}

impl GitRef {
    /// Build a descriptor, deriving kind and remote flag from the name.
    pub fn from_name(name: impl Into<String>, target: Option<String>, is_annotated: bool) -> Self {
        let name = name.into();
        let kind = if name == "HEAD" || name.ends_with("/HEAD") {
            RefKind::Head
        } else if name.starts_with("refs/tags/") {
            RefKind::Tag
        } else {
            RefKind::Branch
        };
        let is_remote = name.starts_with("refs/remotes/");
        Self {
            name,
            target,
            kind,
            is_remote,
            is_annotated,
        }
    }

    /// Display name with the `refs/heads/`, `refs/tags/` or `refs/remotes/`
    /// prefix stripped.
    pub fn shortname(&self) -> &str {
        ["refs/heads/", "refs/tags/", "refs/remotes/"]
            .iter()
            .find_map(|prefix| self.name.strip_prefix(prefix))
            .unwrap_or(&self.name)
    }
}

/// Classification of a user-supplied ref string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefType {
    Tag,
    Branch,
    Commit,
    Unknown,
}

impl RefType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tag => "tag",
            Self::Branch => "branch",
            Self::Commit => "commit",
            Self::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "tag" => Self::Tag,
            "branch" => Self::Branch,
            "commit" => Self::Commit,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for RefType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Commit,
    Tag,
    Tree,
    Blob,
    Other,
}

/// A resolved object: its id and kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitObject {
    pub id: String,
    pub kind: ObjectKind,
}

/// Per-path working directory state, collapsed to what callers act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    Current,
    Ignored,
    Modified,
}

/// New value for HEAD.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeadTarget {
    /// Symbolic: point HEAD at a full reference name.
    Reference(String),
    /// Detached at a commit id.
    Detached(String),
}

/// Abbreviate an object id to seven characters.
pub fn short_id(id: &str) -> String {
    id.chars().take(7).collect()
}
