//! Git abstraction for the plugin manager
//!
//! [`backend`] defines the capability interface (a process-wide factory
//! plus scoped repository handles) and [`git2_backend`] implements it on
//! libgit2. [`ops`] layers the dirty check, ref classification and the
//! ref-switch algorithm on top of any backend.

pub mod backend;
pub mod error;
pub mod git2_backend;
pub mod ops;
pub mod refs;

pub use backend::{GitBackend, GitRepository, RemoteAuth, RepositoryHandle};
pub use error::{Error, ErrorKind, Result};
pub use git2_backend::Git2Backend;
pub use ops::{SwitchOutcome, check_dirty_working_dir, check_ref_type, switch_ref};
pub use refs::{FileStatus, GitObject, GitRef, HeadTarget, ObjectKind, RefKind, RefType, short_id};
