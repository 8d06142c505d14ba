//! Stateless git routines used by the plugin manager
//!
//! Each function opens the repository through the supplied backend and
//! releases it before returning.

use std::collections::HashSet;
use std::path::Path;

use crate::backend::{GitBackend, GitRepository};
use crate::refs::{FileStatus, HeadTarget, ObjectKind, RefType, short_id};
use crate::{Error, Result};

/// Directory names whose contents are build caches, never user changes.
pub const BUILD_CACHE_DIRS: &[&str] = &["__pycache__"];

/// File suffixes of build-cache artifacts.
pub const BUILD_CACHE_SUFFIXES: &[&str] = &[".pyc", ".pyo"];

/// Characters that make a ref string a relative revision expression.
const REVISION_SYNTAX: &[char] = &['^', '~', ':', '@'];

const ORIGIN: &str = "origin";

/// Result of a successful [`switch_ref`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchOutcome {
    /// Branch name before the switch, or the abbreviated commit if detached.
    pub old_ref: String,
    /// Ref now checked out (abbreviated commit for raw revisions).
    pub new_ref: String,
    pub old_commit: String,
    pub new_commit: String,
    /// Which pass matched.
    pub ref_type: RefType,
}

fn is_build_artifact(path: &str) -> bool {
    path.split('/').any(|part| BUILD_CACHE_DIRS.contains(&part))
        || BUILD_CACHE_SUFFIXES
            .iter()
            .any(|suffix| path.ends_with(suffix))
}

/// List paths with uncommitted changes, ignoring build-cache artifacts.
///
/// An empty vector means the working directory is clean.
pub fn check_dirty_working_dir(backend: &dyn GitBackend, path: &Path) -> Result<Vec<String>> {
    let repo = backend.open(path)?;
    let changes: Vec<String> = repo
        .status()?
        .into_iter()
        .filter(|(file, status)| *status == FileStatus::Modified && !is_build_artifact(file))
        .map(|(file, _)| file)
        .collect();

    if !changes.is_empty() {
        tracing::debug!(path = %path.display(), count = changes.len(), "Working directory is dirty");
    }
    Ok(changes)
}

/// Classify `reference` (or the current HEAD) as tag, branch or commit.
///
/// Returns the classification and the name to record: for HEAD this is
/// the branch shorthand, or the abbreviated commit when detached.
pub fn check_ref_type(
    backend: &dyn GitBackend,
    path: &Path,
    reference: Option<&str>,
) -> Result<(RefType, String)> {
    let repo = backend.open(path)?;

    let Some(reference) = reference else {
        if repo.is_head_detached()? {
            return Ok((RefType::Commit, short_id(&repo.head_target()?)));
        }
        return Ok((RefType::Branch, repo.head_shorthand()?));
    };

    let names = reference_names(&*repo)?;
    if names.contains(&format!("refs/tags/{reference}")) {
        return Ok((RefType::Tag, reference.to_string()));
    }
    if names.contains(&format!("refs/heads/{reference}"))
        || names.contains(&format!("refs/remotes/{ORIGIN}/{reference}"))
    {
        return Ok((RefType::Branch, reference.to_string()));
    }

    let ref_type = match repo.revparse_single(reference) {
        Ok(object) => match object.kind {
            ObjectKind::Commit => RefType::Commit,
            ObjectKind::Tag => RefType::Tag,
            _ => RefType::Unknown,
        },
        Err(_) => RefType::Unknown,
    };
    Ok((ref_type, reference.to_string()))
}

fn reference_names(repo: &dyn GitRepository) -> Result<HashSet<String>> {
    Ok(repo
        .list_references()?
        .into_iter()
        .map(|r| r.name)
        .collect())
}

/// Check out `reference` in the repository at `path`.
///
/// Resolution order is branch, then tag, then raw revision: a tag sharing
/// a branch's name is only reachable when no such branch exists. An
/// existing local branch is fast-forwarded to `origin` when possible, and
/// a remote-only branch is promoted to a local tracking branch.
///
/// The caller is responsible for ensuring the working tree is clean.
pub fn switch_ref(backend: &dyn GitBackend, path: &Path, reference: &str) -> Result<SwitchOutcome> {
    let repo = backend.open(path)?;

    let old_commit = repo.head_target()?;
    let old_ref = if repo.is_head_detached()? {
        short_id(&old_commit)
    } else {
        repo.head_shorthand()?
    };

    let has_origin = repo.find_remote(ORIGIN)?.is_some();
    if has_origin {
        tracing::debug!(path = %path.display(), "Fetching origin");
        repo.fetch(ORIGIN, &[])?;
    }

    let tag_ref = format!("refs/tags/{reference}");
    let mut names = reference_names(&*repo)?;

    if has_origin && !names.contains(&tag_ref) && !reference.contains(REVISION_SYNTAX) {
        let refspec = format!("+{tag_ref}:{tag_ref}");
        match repo.fetch(ORIGIN, &[refspec.as_str()]) {
            Ok(()) => names = reference_names(&*repo)?,
            Err(e) => tracing::debug!(reference, error = %e, "Speculative tag fetch failed"),
        }
    }

    let outcome = |new_ref: String, new_commit: String, ref_type: RefType| SwitchOutcome {
        old_ref: old_ref.clone(),
        new_ref,
        old_commit: old_commit.clone(),
        new_commit,
        ref_type,
    };

    if let Some(commit) = switch_to_branch(&*repo, &names, reference)? {
        tracing::info!(path = %path.display(), branch = reference, "Switched to branch");
        return Ok(outcome(reference.to_string(), commit, RefType::Branch));
    }

    if names.contains(&tag_ref) {
        let commit = repo.peel_to_commit(&tag_ref)?;
        repo.checkout_tree(&commit)?;
        repo.set_head(&HeadTarget::Detached(commit.clone()))?;
        tracing::info!(path = %path.display(), tag = reference, "Switched to tag");
        return Ok(outcome(reference.to_string(), commit, RefType::Tag));
    }

    match repo.peel_to_commit(reference) {
        Ok(commit) => {
            repo.checkout_tree(&commit)?;
            repo.set_head(&HeadTarget::Detached(commit.clone()))?;
            tracing::info!(path = %path.display(), revision = reference, "Switched to commit");
            Ok(outcome(short_id(reference), commit, RefType::Commit))
        }
        Err(e) => {
            tracing::debug!(reference, error = %e, "Ref did not resolve as a revision");
            Err(Error::RefNotFound {
                reference: reference.to_string(),
                hint: remote_hint(&names, reference),
            })
        }
    }
}

/// Branch pass of [`switch_ref`]. Returns the checked-out commit, or
/// `None` if no branch of that name exists locally or on origin.
fn switch_to_branch(
    repo: &dyn GitRepository,
    names: &HashSet<String>,
    branch: &str,
) -> Result<Option<String>> {
    let local_ref = format!("refs/heads/{branch}");
    let remote_ref = format!("refs/remotes/{ORIGIN}/{branch}");
    let has_local = names.contains(&local_ref);
    let has_remote = names.contains(&remote_ref);

    let target = match (has_local, has_remote) {
        (false, false) => return Ok(None),
        (true, false) => repo.peel_to_commit(&local_ref)?,
        (false, true) => repo.peel_to_commit(&remote_ref)?,
        (true, true) => {
            let local = repo.peel_to_commit(&local_ref)?;
            let remote = repo.peel_to_commit(&remote_ref)?;
            if repo.is_descendant_of(&remote, &local)? {
                remote
            } else {
                tracing::warn!(branch, "Local branch has diverged from origin, keeping local");
                local
            }
        }
    };

    repo.checkout_tree(&target)?;
    // Detached first: libgit2 refuses to force-move the branch HEAD points at
    repo.set_head(&HeadTarget::Detached(target.clone()))?;
    repo.create_branch(branch, &target, true)?;
    if has_remote {
        repo.set_upstream(branch, Some(&format!("{ORIGIN}/{branch}")))?;
    }
    repo.set_head(&HeadTarget::Reference(local_ref))?;
    Ok(Some(target))
}

/// Suggest `origin/<base>` for a relative revision whose base only exists
/// as a remote-tracking branch.
fn remote_hint(names: &HashSet<String>, reference: &str) -> Option<String> {
    let base = reference
        .split(|c| REVISION_SYNTAX.contains(&c))
        .next()
        .filter(|base| !base.is_empty() && *base != reference)?;
    let has_local = names.contains(&format!("refs/heads/{base}"));
    let has_remote = names.contains(&format!("refs/remotes/{ORIGIN}/{base}"));
    (has_remote && !has_local).then(|| format!("{ORIGIN}/{base}"))
}
