//! Repository management
//!
//! This module provides:
//! - The `RepositoryStore` trait, the narrow interface to local working copies
//! - `SystemGit`, a store backed by the system `git` binary
//! - `MemoryStore`, an in-process store for tests and dry experiments
//! - `RepoRegistry`, mapping packages to working copies and driving ensure,
//!   status, version bump and push
//! - Requirement editing for a project's `pyproject.toml`

mod memory;
mod pyproject;
mod registry;
mod system_git;
mod version_file;

pub use memory::MemoryStore;
pub use pyproject::{RequirementEdit, RequirementPolicy};
pub use registry::{RepoRegistry, DEFAULT_JOBS};
pub use system_git::SystemGit;
pub(crate) use version_file::{bump_version, declared_version};

use crate::error::StoreError;
use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// What a store reports about a working copy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkingCopyStatus {
    /// Checked-out revision, None for a repository without commits
    pub revision: Option<String>,
    /// Current branch, None when detached
    pub branch: Option<String>,
    /// Paths with uncommitted changes, relative to the working copy root
    pub changed: Vec<String>,
}

/// Live view of a package's working copy
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepoState {
    /// Package name
    pub package: String,
    /// Working copy path
    pub path: PathBuf,
    /// Whether the working copy exists
    pub exists: bool,
    /// Checked-out revision
    pub revision: Option<String>,
    /// Current branch
    pub branch: Option<String>,
    /// Whether there are uncommitted changes
    pub dirty: bool,
    /// Paths with uncommitted changes
    pub changed: Vec<String>,
}

impl RepoState {
    /// State of a working copy that has not been cloned
    pub fn missing(package: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            package: package.into(),
            path: path.into(),
            exists: false,
            revision: None,
            branch: None,
            dirty: false,
            changed: Vec::new(),
        }
    }

    /// State built from a store status report
    pub fn from_status(
        package: impl Into<String>,
        path: impl Into<PathBuf>,
        status: WorkingCopyStatus,
    ) -> Self {
        Self {
            package: package.into(),
            path: path.into(),
            exists: true,
            revision: status.revision,
            branch: status.branch,
            dirty: !status.changed.is_empty(),
            changed: status.changed,
        }
    }

    /// Short form of the revision for display
    pub fn short_revision(&self) -> &str {
        match &self.revision {
            Some(rev) if rev.len() > 10 => &rev[..10],
            Some(rev) => rev,
            None => "-",
        }
    }
}

/// Repository Store: the operations the release engine needs from version control
///
/// Paths are working copy roots. Implementations map their failures onto
/// `StoreError` so callers can tell retryable network trouble from rejections.
#[async_trait]
pub trait RepositoryStore: Send + Sync {
    /// Returns true if a working copy exists at `path`
    fn exists(&self, path: &Path) -> bool;

    /// Clone `url` into `path`
    async fn clone_repo(&self, url: &str, path: &Path) -> Result<(), StoreError>;

    /// Fetch remote refs and tags without merging
    async fn fetch(&self, path: &Path) -> Result<(), StoreError>;

    /// Read-only status snapshot
    async fn status(&self, path: &Path) -> Result<WorkingCopyStatus, StoreError>;

    /// Commit the given files with a message
    async fn commit(&self, path: &Path, files: &[&str], message: &str) -> Result<(), StoreError>;

    /// Create a lightweight tag at HEAD
    async fn tag(&self, path: &Path, tag: &str) -> Result<(), StoreError>;

    /// Returns true if the tag exists locally
    async fn has_tag(&self, path: &Path, tag: &str) -> Result<bool, StoreError>;

    /// Content of `file` as committed at HEAD, None when HEAD does not have it
    async fn committed_content(&self, path: &Path, file: &str) -> Result<Option<String>, StoreError>;

    /// Most recent tag reachable from HEAD
    async fn last_tag(&self, path: &Path) -> Result<Option<String>, StoreError>;

    /// Push the branch and, when given, the tag in one atomic update
    async fn push(&self, path: &Path, branch: &str, tag: Option<&str>) -> Result<(), StoreError>;

    /// Check that the remote is reachable without touching any working copy
    async fn probe(&self, url: &str) -> Result<(), StoreError>;
}
