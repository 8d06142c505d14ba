//! Plugin source repositories for tests.
//!
//! Everything is built through `git2`, so tests do not need a `git`
//! executable on `PATH`.

use std::fs;
use std::path::{Path, PathBuf};

use git2::{IndexAddOption, Oid, Repository, RepositoryInitOptions, Signature};
use tempfile::TempDir;

use crate::manifest::manifest_toml;

/// A plugin's upstream: a working repository where commits are authored
/// and a bare mirror that installs clone from.
///
/// # Example
///
/// ```rust,no_run
/// use plugin_test_utils::PluginSource;
///
/// let source = PluginSource::with_manifest("550e8400-e29b-41d4-a716-446655440000", "Demo", "1.0.0");
/// source.tag("v1.0.0");
/// source.publish();
/// let url = source.bare_url();
/// ```
pub struct PluginSource {
    temp_dir: TempDir,
    repo: Repository,
}

impl PluginSource {
    /// Create an empty working repository on branch `main`, no commits.
    ///
    /// # Panics
    /// Panics if the temp directory or the repository cannot be created.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("PluginSource: failed to create temp dir");
        let work = temp_dir.path().join("work");
        let mut opts = RepositoryInitOptions::new();
        opts.initial_head("main");
        let repo = Repository::init_opts(&work, &opts)
            .unwrap_or_else(|e| panic!("PluginSource: failed to init {}: {e}", work.display()));
        Self { temp_dir, repo }
    }

    /// Create a source whose first commit carries a valid manifest.
    pub fn with_manifest(uuid: &str, name: &str, version: &str) -> Self {
        let source = Self::new();
        source.write_file("MANIFEST.toml", &manifest_toml(uuid, name, version));
        source.write_file("__init__.py", "");
        source.commit(&format!("Release {version}"));
        source
    }

    /// Working tree path.
    pub fn work_path(&self) -> PathBuf {
        self.temp_dir.path().join("work")
    }

    /// Bare mirror path (exists after the first [`publish`](Self::publish)).
    pub fn bare_path(&self) -> PathBuf {
        self.temp_dir.path().join("upstream.git")
    }

    /// Bare mirror path as a string suitable for install sources.
    pub fn bare_url(&self) -> String {
        self.bare_path().to_string_lossy().into_owned()
    }

    /// The underlying working repository.
    pub fn repo(&self) -> &Repository {
        &self.repo
    }

    /// Write a file relative to the working tree, creating parents.
    pub fn write_file(&self, rel: &str, content: &str) {
        let path = self.work_path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content)
            .unwrap_or_else(|e| panic!("PluginSource: failed to write {}: {e}", path.display()));
    }

    /// Replace the manifest with one for the given identity and version.
    pub fn write_manifest(&self, uuid: &str, name: &str, version: &str) {
        self.write_file("MANIFEST.toml", &manifest_toml(uuid, name, version));
    }

    /// Stage everything and commit on HEAD. Returns the commit id.
    pub fn commit(&self, message: &str) -> String {
        let mut index = self.repo.index().unwrap();
        index
            .add_all(["*"].iter(), IndexAddOption::DEFAULT, None)
            .unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = self.repo.find_tree(tree_id).unwrap();

        let sig = Signature::now("Test User", "test@test.com").unwrap();
        let parent = self
            .repo
            .head()
            .ok()
            .and_then(|h| h.target())
            .map(|oid| self.repo.find_commit(oid).unwrap());
        let parents: Vec<&git2::Commit> = parent.iter().collect();

        let oid = self
            .repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
            .unwrap_or_else(|e| panic!("PluginSource: commit '{message}' failed: {e}"));
        oid.to_string()
    }

    /// Lightweight tag at HEAD.
    pub fn tag(&self, name: &str) {
        let head = self.head_object();
        self.repo.tag_lightweight(name, &head, false).unwrap();
    }

    /// Annotated tag at HEAD.
    pub fn annotated_tag(&self, name: &str, message: &str) {
        let head = self.head_object();
        let sig = Signature::now("Test User", "test@test.com").unwrap();
        self.repo.tag(name, &head, &sig, message, false).unwrap();
    }

    /// Create a branch at HEAD without switching to it.
    pub fn branch(&self, name: &str) {
        let commit = self.head_object().peel_to_commit().unwrap();
        self.repo.branch(name, &commit, false).unwrap();
    }

    /// Switch the working tree to an existing local branch.
    pub fn checkout_branch(&self, name: &str) {
        let refname = format!("refs/heads/{name}");
        let object = self.repo.revparse_single(&refname).unwrap();
        self.repo
            .checkout_tree(&object, Some(git2::build::CheckoutBuilder::new().force()))
            .unwrap();
        self.repo.set_head(&refname).unwrap();
    }

    /// Current HEAD commit id.
    pub fn head(&self) -> String {
        self.head_object().id().to_string()
    }

    /// Mirror every branch and tag into the bare repository.
    pub fn publish(&self) -> PathBuf {
        let bare_path = self.bare_path();
        let bare = if bare_path.exists() {
            Repository::open_bare(&bare_path).unwrap()
        } else {
            Repository::init_bare(&bare_path).unwrap()
        };
        mirror_into(&bare, &self.work_path());
        bare.set_head("refs/heads/main").unwrap();
        bare_path
    }

    fn head_object(&self) -> git2::Object<'_> {
        self.repo.head().unwrap().peel(git2::ObjectType::Commit).unwrap()
    }
}

impl Default for PluginSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Fetch all branches and tags of `source` into `target` under the same names.
fn mirror_into(target: &Repository, source: &Path) {
    let url = source.to_string_lossy();
    let mut remote = target.remote_anonymous(&url).unwrap();
    remote
        .fetch(
            &["+refs/heads/*:refs/heads/*", "+refs/tags/*:refs/tags/*"],
            None,
            None,
        )
        .unwrap_or_else(|e| panic!("mirror_into: fetch from {url} failed: {e}"));
}

/// Clone `url` into `dest` as a plain working repository.
pub fn clone_to(url: &str, dest: &Path) -> Repository {
    Repository::clone(url, dest)
        .unwrap_or_else(|e| panic!("clone_to: failed to clone {url}: {e}"))
}

/// Commit id a revision resolves to inside `path`.
pub fn rev(path: &Path, spec: &str) -> String {
    let repo = Repository::open(path).unwrap();
    let id: Oid = repo.revparse_single(spec).unwrap().peel_to_commit().unwrap().id();
    id.to_string()
}

/// Create a plain directory containing files but no `.git`.
pub fn non_git_dir(path: &Path) {
    fs::create_dir_all(path).unwrap();
    fs::write(path.join("README.md"), "# not a repository").unwrap();
}
