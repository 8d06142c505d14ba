//! libgit2-backed implementation of the backend interface

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone, Utc};
use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{
    AutotagOption, BranchType, Cred, CredentialType, FetchOptions, Oid, RemoteCallbacks,
    Repository, ResetType, StatusOptions,
};

use crate::backend::{GitBackend, GitRepository, RemoteAuth, RepositoryHandle};
use crate::refs::{FileStatus, GitObject, GitRef, HeadTarget, ObjectKind};
use crate::{Error, Result};

/// Credential prompts libgit2 may issue before we give up on a remote.
const MAX_CREDENTIAL_ATTEMPTS: u32 = 3;

/// [`GitBackend`] on top of the `git2` crate.
#[derive(Debug, Clone, Default)]
pub struct Git2Backend {
    auth: RemoteAuth,
}

impl Git2Backend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_auth(auth: RemoteAuth) -> Self {
        Self { auth }
    }

    fn wrap(&self, repo: Repository) -> RepositoryHandle {
        let path = repo
            .workdir()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| repo.path().to_path_buf());
        tracing::trace!(path = %path.display(), "Acquired repository");
        RepositoryHandle::new(Box::new(Git2Repository {
            repo: Some(repo),
            path,
            auth: self.auth,
        }))
    }
}

impl GitBackend for Git2Backend {
    fn name(&self) -> &'static str {
        "git2"
    }

    fn open(&self, path: &Path) -> Result<RepositoryHandle> {
        let repo = Repository::open(path).map_err(|e| Error::Repository {
            message: format!("cannot open repository at {}: {}", path.display(), e.message()),
            source: Some(e),
        })?;
        Ok(self.wrap(repo))
    }

    fn init(&self, path: &Path) -> Result<RepositoryHandle> {
        Ok(self.wrap(Repository::init(path)?))
    }

    fn init_bare(&self, path: &Path) -> Result<RepositoryHandle> {
        Ok(self.wrap(Repository::init_bare(path)?))
    }

    fn clone_repository(
        &self,
        url: &str,
        path: &Path,
        branch: Option<&str>,
    ) -> Result<RepositoryHandle> {
        tracing::debug!(url, path = %path.display(), ?branch, "Cloning repository");

        let mut fetch_opts = FetchOptions::new();
        fetch_opts.remote_callbacks(callbacks(self.auth));
        fetch_opts.download_tags(AutotagOption::All);

        let mut builder = RepoBuilder::new();
        builder.fetch_options(fetch_opts);
        if let Some(branch) = branch {
            builder.branch(branch);
        }

        let repo = builder.clone(url, path).map_err(|e| Error::Repository {
            message: format!("failed to clone {url}: {}", e.message()),
            source: Some(e),
        })?;
        Ok(self.wrap(repo))
    }

    fn remote_callbacks(&self) -> RemoteAuth {
        self.auth
    }
}

/// Build libgit2 callbacks for one network operation.
fn callbacks<'a>(auth: RemoteAuth) -> RemoteCallbacks<'a> {
    let mut attempts = 0;
    let mut callbacks = RemoteCallbacks::new();
    callbacks.credentials(move |url, username, allowed| {
        attempts += 1;
        if attempts > MAX_CREDENTIAL_ATTEMPTS {
            return Err(git2::Error::from_str("authentication failed"));
        }
        if allowed.contains(CredentialType::SSH_KEY)
            && auth.use_ssh_agent
            && let Some(user) = username
        {
            return Cred::ssh_key_from_agent(user);
        }
        if allowed.contains(CredentialType::USER_PASS_PLAINTEXT)
            && auth.use_credential_helper
            && let Ok(config) = git2::Config::open_default()
        {
            return Cred::credential_helper(&config, url, username);
        }
        if allowed.contains(CredentialType::DEFAULT) {
            return Cred::default();
        }
        Err(git2::Error::from_str("no usable credentials"))
    });
    callbacks
}

/// A repository opened through [`Git2Backend`].
pub struct Git2Repository {
    repo: Option<Repository>,
    path: PathBuf,
    auth: RemoteAuth,
}

impl Git2Repository {
    fn repo(&self) -> Result<&Repository> {
        self.repo.as_ref().ok_or_else(|| {
            Error::repository(format!(
                "repository at {} has already been released",
                self.path.display()
            ))
        })
    }

    fn fetch_options(&self) -> FetchOptions<'static> {
        let mut opts = FetchOptions::new();
        opts.remote_callbacks(callbacks(self.auth));
        opts
    }
}

impl GitRepository for Git2Repository {
    fn path(&self) -> &Path {
        &self.path
    }

    fn is_bare(&self) -> Result<bool> {
        Ok(self.repo()?.is_bare())
    }

    fn status(&self) -> Result<BTreeMap<String, FileStatus>> {
        let repo = self.repo()?;
        let mut opts = StatusOptions::new();
        opts.include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_ignored(false);

        let statuses = repo.statuses(Some(&mut opts))?;
        let mut result = BTreeMap::new();
        for entry in statuses.iter() {
            let Some(path) = entry.path() else {
                continue;
            };
            let status = entry.status();
            let mapped = if status.is_ignored() {
                FileStatus::Ignored
            } else if status == git2::Status::CURRENT {
                FileStatus::Current
            } else {
                FileStatus::Modified
            };
            result.insert(path.to_string(), mapped);
        }
        Ok(result)
    }

    fn head_target(&self) -> Result<String> {
        let head = self.repo()?.head()?;
        head.target()
            .map(|oid| oid.to_string())
            .ok_or_else(|| Error::reference("HEAD has no target"))
    }

    fn head_shorthand(&self) -> Result<String> {
        let head = self.repo()?.head()?;
        Ok(head.shorthand().unwrap_or("HEAD").to_string())
    }

    fn is_head_detached(&self) -> Result<bool> {
        Ok(self.repo()?.head_detached()?)
    }

    fn list_references(&self) -> Result<Vec<GitRef>> {
        let repo = self.repo()?;
        let mut refs = Vec::new();
        for reference in repo.references()? {
            let reference = reference?;
            let Some(name) = reference.name() else {
                continue;
            };
            let target = reference
                .resolve()
                .ok()
                .and_then(|r| r.target())
                .or_else(|| reference.target());
            let is_annotated = target.is_some_and(|oid| repo.find_tag(oid).is_ok());
            refs.push(GitRef::from_name(
                name,
                target.map(|oid| oid.to_string()),
                is_annotated,
            ));
        }
        Ok(refs)
    }

    fn revparse_single(&self, spec: &str) -> Result<GitObject> {
        let object = self.repo()?.revparse_single(spec)?;
        let kind = match object.kind() {
            Some(git2::ObjectType::Commit) => ObjectKind::Commit,
            Some(git2::ObjectType::Tag) => ObjectKind::Tag,
            Some(git2::ObjectType::Tree) => ObjectKind::Tree,
            Some(git2::ObjectType::Blob) => ObjectKind::Blob,
            _ => ObjectKind::Other,
        };
        Ok(GitObject {
            id: object.id().to_string(),
            kind,
        })
    }

    fn peel_to_commit(&self, spec: &str) -> Result<String> {
        let commit = self.repo()?.revparse_single(spec)?.peel_to_commit()?;
        Ok(commit.id().to_string())
    }

    fn reset_hard(&self, commit: &str) -> Result<()> {
        let repo = self.repo()?;
        let object = repo.revparse_single(commit)?.peel(git2::ObjectType::Commit)?;
        let mut checkout = CheckoutBuilder::new();
        checkout.force();
        repo.reset(&object, ResetType::Hard, Some(&mut checkout))?;
        Ok(())
    }

    fn checkout_tree(&self, spec: &str) -> Result<()> {
        let repo = self.repo()?;
        let object = repo.revparse_single(spec)?;
        let mut checkout = CheckoutBuilder::new();
        checkout.force();
        repo.checkout_tree(&object, Some(&mut checkout))?;
        Ok(())
    }

    fn set_head(&self, target: &HeadTarget) -> Result<()> {
        let repo = self.repo()?;
        match target {
            HeadTarget::Reference(name) => repo.set_head(name)?,
            HeadTarget::Detached(id) => {
                let oid = Oid::from_str(id)?;
                repo.set_head_detached(oid)?;
            }
        }
        Ok(())
    }

    fn find_remote(&self, name: &str) -> Result<Option<String>> {
        match self.repo()?.find_remote(name) {
            Ok(remote) => Ok(Some(remote.url().unwrap_or_default().to_string())),
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn create_remote(&self, name: &str, url: &str) -> Result<()> {
        self.repo()?.remote(name, url)?;
        Ok(())
    }

    fn set_remote_url(&self, name: &str, url: &str) -> Result<()> {
        self.repo()?.remote_set_url(name, url)?;
        Ok(())
    }

    fn fetch(&self, remote: &str, refspecs: &[&str]) -> Result<()> {
        let repo = self.repo()?;
        let mut remote = repo.find_remote(remote)?;
        let mut opts = self.fetch_options();
        remote.fetch(refspecs, Some(&mut opts), None)?;
        Ok(())
    }

    fn fetch_with_tags(&self, remote: &str) -> Result<()> {
        let repo = self.repo()?;
        let mut remote = repo.find_remote(remote)?;

        let configured = remote.fetch_refspecs()?;
        let mut refspecs: Vec<&str> = configured.iter().flatten().collect();
        refspecs.push("+refs/tags/*:refs/tags/*");

        let mut opts = self.fetch_options();
        opts.download_tags(AutotagOption::All);
        remote.fetch(&refspecs, Some(&mut opts), None)?;
        Ok(())
    }

    fn create_branch(&self, name: &str, commit: &str, force: bool) -> Result<()> {
        let repo = self.repo()?;
        let commit = repo.find_commit(Oid::from_str(commit)?)?;
        repo.branch(name, &commit, force)?;
        Ok(())
    }

    fn set_upstream(&self, branch: &str, upstream: Option<&str>) -> Result<()> {
        let mut branch = self.repo()?.find_branch(branch, BranchType::Local)?;
        branch.set_upstream(upstream)?;
        Ok(())
    }

    fn is_descendant_of(&self, commit: &str, ancestor: &str) -> Result<bool> {
        let repo = self.repo()?;
        let commit = Oid::from_str(commit)?;
        let ancestor = Oid::from_str(ancestor)?;
        if commit == ancestor {
            return Ok(true);
        }
        Ok(repo.graph_descendant_of(commit, ancestor)?)
    }

    fn commit_date(&self, spec: &str) -> Result<DateTime<Utc>> {
        let commit = self.repo()?.revparse_single(spec)?.peel_to_commit()?;
        let seconds = commit.time().seconds();
        Utc.timestamp_opt(seconds, 0)
            .single()
            .ok_or_else(|| Error::commit(format!("commit {} has invalid timestamp {seconds}", commit.id())))
    }

    fn free(&mut self) {
        if self.repo.take().is_some() {
            tracing::trace!(path = %self.path.display(), "Released repository");
        }
    }
}
