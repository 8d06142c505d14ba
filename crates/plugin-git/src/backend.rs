//! Git backend capability interface
//!
//! Two roles: [`GitBackend`] is a process-wide factory that opens, creates
//! and clones repositories; [`GitRepository`] is a resource bound to one
//! working directory. Repositories are only ever handed out wrapped in a
//! [`RepositoryHandle`], which releases them when dropped.

use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};
use std::path::Path;

use chrono::{DateTime, Utc};

use crate::Result;
use crate::refs::{FileStatus, GitObject, GitRef, HeadTarget};

/// Authentication policy applied to every network operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteAuth {
    /// Offer keys from a running SSH agent.
    pub use_ssh_agent: bool,
    /// Consult the user's git credential helper for HTTPS.
    pub use_credential_helper: bool,
}

impl Default for RemoteAuth {
    fn default() -> Self {
        Self {
            use_ssh_agent: true,
            use_credential_helper: true,
        }
    }
}

/// Process-wide repository factory.
pub trait GitBackend: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Open an existing repository (working tree or bare).
    fn open(&self, path: &Path) -> Result<RepositoryHandle>;

    /// Create an empty repository with a working tree.
    fn init(&self, path: &Path) -> Result<RepositoryHandle>;

    /// Create an empty bare repository.
    fn init_bare(&self, path: &Path) -> Result<RepositoryHandle>;

    /// Clone `url` into `path`, optionally checking out `branch`.
    ///
    /// # Arguments
    /// * `url` - Remote URL or local filesystem path
    /// * `path` - Destination directory; must not exist or be empty
    /// * `branch` - Branch to check out instead of the remote's default
    fn clone_repository(
        &self,
        url: &str,
        path: &Path,
        branch: Option<&str>,
    ) -> Result<RepositoryHandle>;

    /// Authentication callbacks handed to repositories for fetches.
    fn remote_callbacks(&self) -> RemoteAuth;
}

/// Operations on one repository.
///
/// Implementations must tolerate calls after [`free`](Self::free) by
/// returning a repository-level error.
pub trait GitRepository {
    /// Working directory (or git dir for bare repositories).
    fn path(&self) -> &Path;

    fn is_bare(&self) -> Result<bool>;

    /// Status of every non-clean path, keyed by repository-relative path.
    fn status(&self) -> Result<BTreeMap<String, FileStatus>>;

    /// Object id HEAD resolves to.
    fn head_target(&self) -> Result<String>;

    /// Short name of HEAD: branch name, or `HEAD` when detached.
    fn head_shorthand(&self) -> Result<String>;

    fn is_head_detached(&self) -> Result<bool>;

    fn list_references(&self) -> Result<Vec<GitRef>>;

    /// Resolve a revision expression to a single object.
    fn revparse_single(&self, spec: &str) -> Result<GitObject>;

    /// Resolve a revision expression, peeling tags, to a commit id.
    fn peel_to_commit(&self, spec: &str) -> Result<String>;

    /// Hard-reset index and working tree to `commit`.
    fn reset_hard(&self, commit: &str) -> Result<()>;

    /// Force-checkout the tree of `spec` into the working directory.
    fn checkout_tree(&self, spec: &str) -> Result<()>;

    fn set_head(&self, target: &HeadTarget) -> Result<()>;

    /// URL configured for a remote.
    fn find_remote(&self, name: &str) -> Result<Option<String>>;

    fn create_remote(&self, name: &str, url: &str) -> Result<()>;

    fn set_remote_url(&self, name: &str, url: &str) -> Result<()>;

    /// Fetch from a remote; an empty `refspecs` uses the configured ones.
    fn fetch(&self, remote: &str, refspecs: &[&str]) -> Result<()>;

    /// Fetch configured refspecs plus every tag.
    fn fetch_with_tags(&self, remote: &str) -> Result<()>;

    fn create_branch(&self, name: &str, commit: &str, force: bool) -> Result<()>;

    fn set_upstream(&self, branch: &str, upstream: Option<&str>) -> Result<()>;

    /// Whether `commit` has `ancestor` in its history.
    fn is_descendant_of(&self, commit: &str, ancestor: &str) -> Result<bool>;

    /// Committer timestamp of the commit `spec` resolves to.
    fn commit_date(&self, spec: &str) -> Result<DateTime<Utc>>;

    /// Release the underlying resources. Idempotent.
    fn free(&mut self);
}

/// Scoped owner of a repository; frees it on drop.
pub struct RepositoryHandle {
    inner: Box<dyn GitRepository>,
}

impl RepositoryHandle {
    pub fn new(inner: Box<dyn GitRepository>) -> Self {
        Self { inner }
    }
}

impl Deref for RepositoryHandle {
    type Target = dyn GitRepository;

    fn deref(&self) -> &Self::Target {
        self.inner.as_ref()
    }
}

impl DerefMut for RepositoryHandle {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.inner.as_mut()
    }
}

impl Drop for RepositoryHandle {
    fn drop(&mut self) {
        self.inner.free();
    }
}

impl std::fmt::Debug for RepositoryHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryHandle")
            .field("path", &self.inner.path())
            .finish()
    }
}
