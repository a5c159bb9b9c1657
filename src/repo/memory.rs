//! In-memory Repository Store
//!
//! Simulates remotes and working copies without git. Cloning materializes
//! the remote's seeded files on disk so version files can be edited for
//! real; everything else (revisions, tags, pushes) lives in memory.
//! Failures can be scripted per operation and repository directory.

use super::{RepositoryStore, WorkingCopyStatus};
use crate::error::{RepoOp, StoreError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, Default)]
struct Remote {
    files: Vec<(String, String)>,
    revision: u64,
    tags: Vec<String>,
    unreachable: bool,
}

#[derive(Debug, Clone)]
struct WorkingCopy {
    url: String,
    revision: u64,
    branch: String,
    changed: Vec<String>,
    tags: Vec<String>,
    /// File contents as of the checked-out revision
    committed: HashMap<String, String>,
}

#[derive(Debug, Clone)]
struct ScriptedFailure {
    op: RepoOp,
    repo: String,
    error: StoreError,
    remaining: Option<usize>,
}

#[derive(Debug, Default)]
struct State {
    remotes: HashMap<String, Remote>,
    copies: HashMap<PathBuf, WorkingCopy>,
    failures: Vec<ScriptedFailure>,
    calls: Vec<String>,
}

/// Repository Store that keeps all version-control state in memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

fn dir_name(s: &str) -> String {
    crate::config::repo_dir_name(s).to_string()
}

fn path_dir(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A poisoned lock only means a test panicked mid-call; the data is still usable
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a remote with the files a clone should contain
    pub fn add_remote(&self, url: &str, files: &[(&str, &str)]) {
        let remote = Remote {
            files: files
                .iter()
                .map(|(p, c)| (p.to_string(), c.to_string()))
                .collect(),
            revision: 1,
            ..Remote::default()
        };
        self.lock().remotes.insert(url.to_string(), remote);
    }

    /// Add a tag that already exists on the remote
    pub fn add_remote_tag(&self, url: &str, tag: &str) {
        if let Some(remote) = self.lock().remotes.get_mut(url) {
            remote.tags.push(tag.to_string());
        }
    }

    /// Mark a remote unreachable for reachability checks, clone, fetch and push
    pub fn set_unreachable(&self, url: &str, unreachable: bool) {
        if let Some(remote) = self.lock().remotes.get_mut(url) {
            remote.unreachable = unreachable;
        }
    }

    /// Fail every `op` on the repository directory `repo`
    pub fn fail(&self, op: RepoOp, repo: &str, error: StoreError) {
        self.lock().failures.push(ScriptedFailure {
            op,
            repo: repo.to_string(),
            error,
            remaining: None,
        });
    }

    /// Fail the next `times` attempts of `op` on `repo`
    pub fn fail_times(&self, op: RepoOp, repo: &str, error: StoreError, times: usize) {
        self.lock().failures.push(ScriptedFailure {
            op,
            repo: repo.to_string(),
            error,
            remaining: Some(times),
        });
    }

    /// Report the given paths as modified in a working copy
    pub fn set_changed(&self, path: &Path, changed: &[&str]) {
        if let Some(copy) = self.lock().copies.get_mut(path) {
            copy.changed = changed.iter().map(|s| s.to_string()).collect();
        }
    }

    /// Put a working copy on another branch
    pub fn set_branch(&self, path: &Path, branch: &str) {
        if let Some(copy) = self.lock().copies.get_mut(path) {
            copy.branch = branch.to_string();
        }
    }

    /// Tags that reached the remote
    pub fn remote_tags(&self, url: &str) -> Vec<String> {
        self.lock()
            .remotes
            .get(url)
            .map(|r| r.tags.clone())
            .unwrap_or_default()
    }

    /// Every call made so far, as `"<op> <repo-dir>"`
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Calls of a single operation kind
    pub fn calls_of(&self, op: RepoOp) -> Vec<String> {
        let prefix = format!("{} ", op);
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with(&prefix))
            .collect()
    }

    /// Record the call and return a scripted failure if one applies
    fn enter(&self, op: RepoOp, repo: &str) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.calls.push(format!("{} {}", op, repo));

        let found = state
            .failures
            .iter_mut()
            .find(|f| f.op == op && f.repo == repo && f.remaining != Some(0));
        match found {
            Some(failure) => {
                if let Some(n) = failure.remaining.as_mut() {
                    *n -= 1;
                }
                Err(failure.error.clone())
            }
            None => Ok(()),
        }
    }

    fn with_copy<T>(
        &self,
        op: RepoOp,
        path: &Path,
        f: impl FnOnce(&mut WorkingCopy, &mut HashMap<String, Remote>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut state = self.lock();
        let State {
            copies, remotes, ..
        } = &mut *state;
        let copy = copies.get_mut(path).ok_or_else(|| StoreError::Failed {
            op,
            message: format!("not a working copy: {}", path.display()),
        })?;
        f(copy, remotes)
    }
}

fn unreachable_error(op: RepoOp, url: &str) -> StoreError {
    StoreError::Network {
        op,
        message: format!("could not resolve host for {}", url),
    }
}

#[async_trait]
impl RepositoryStore for MemoryStore {
    fn exists(&self, path: &Path) -> bool {
        self.lock().copies.contains_key(path)
    }

    async fn clone_repo(&self, url: &str, path: &Path) -> Result<(), StoreError> {
        self.enter(RepoOp::Clone, &dir_name(url))?;
        let remote = self
            .lock()
            .remotes
            .get(url)
            .cloned()
            .ok_or_else(|| StoreError::Failed {
                op: RepoOp::Clone,
                message: format!("repository not found: {}", url),
            })?;
        if remote.unreachable {
            return Err(unreachable_error(RepoOp::Clone, url));
        }

        std::fs::create_dir_all(path).map_err(|e| StoreError::Failed {
            op: RepoOp::Clone,
            message: e.to_string(),
        })?;
        for (rel, content) in &remote.files {
            let file = path.join(rel);
            if let Some(parent) = file.parent() {
                std::fs::create_dir_all(parent).map_err(|e| StoreError::Failed {
                    op: RepoOp::Clone,
                    message: e.to_string(),
                })?;
            }
            std::fs::write(&file, content).map_err(|e| StoreError::Failed {
                op: RepoOp::Clone,
                message: e.to_string(),
            })?;
        }

        self.lock().copies.insert(
            path.to_path_buf(),
            WorkingCopy {
                url: url.to_string(),
                revision: remote.revision,
                branch: "main".to_string(),
                changed: Vec::new(),
                tags: remote.tags.clone(),
                committed: remote.files.iter().cloned().collect(),
            },
        );
        Ok(())
    }

    async fn fetch(&self, path: &Path) -> Result<(), StoreError> {
        self.enter(RepoOp::Fetch, &path_dir(path))?;
        self.with_copy(RepoOp::Fetch, path, |copy, remotes| {
            let remote = remotes.get(&copy.url).ok_or_else(|| StoreError::Failed {
                op: RepoOp::Fetch,
                message: "remote vanished".to_string(),
            })?;
            if remote.unreachable {
                return Err(unreachable_error(RepoOp::Fetch, &copy.url));
            }
            for tag in &remote.tags {
                if !copy.tags.contains(tag) {
                    copy.tags.push(tag.clone());
                }
            }
            Ok(())
        })
    }

    async fn status(&self, path: &Path) -> Result<WorkingCopyStatus, StoreError> {
        self.enter(RepoOp::Status, &path_dir(path))?;
        self.with_copy(RepoOp::Status, path, |copy, _| {
            Ok(WorkingCopyStatus {
                revision: Some(format!("{:040x}", copy.revision)),
                branch: Some(copy.branch.clone()),
                changed: copy.changed.clone(),
            })
        })
    }

    async fn commit(&self, path: &Path, files: &[&str], _message: &str) -> Result<(), StoreError> {
        self.enter(RepoOp::Commit, &path_dir(path))?;
        let mut snapshot = Vec::with_capacity(files.len());
        for file in files {
            let content = std::fs::read_to_string(path.join(file)).map_err(|e| StoreError::Failed {
                op: RepoOp::Commit,
                message: format!("{}: {}", file, e),
            })?;
            snapshot.push((file.to_string(), content));
        }
        self.with_copy(RepoOp::Commit, path, |copy, _| {
            copy.revision += 1;
            copy.committed.extend(snapshot);
            copy.changed.retain(|c| !files.contains(&c.as_str()));
            Ok(())
        })
    }

    async fn tag(&self, path: &Path, tag: &str) -> Result<(), StoreError> {
        self.enter(RepoOp::Tag, &path_dir(path))?;
        self.with_copy(RepoOp::Tag, path, |copy, _| {
            if copy.tags.iter().any(|t| t == tag) {
                return Err(StoreError::Failed {
                    op: RepoOp::Tag,
                    message: format!("tag '{}' already exists", tag),
                });
            }
            copy.tags.push(tag.to_string());
            Ok(())
        })
    }

    async fn has_tag(&self, path: &Path, tag: &str) -> Result<bool, StoreError> {
        self.with_copy(RepoOp::Tag, path, |copy, _| {
            Ok(copy.tags.iter().any(|t| t == tag))
        })
    }

    async fn committed_content(&self, path: &Path, file: &str) -> Result<Option<String>, StoreError> {
        self.enter(RepoOp::Show, &path_dir(path))?;
        self.with_copy(RepoOp::Show, path, |copy, _| Ok(copy.committed.get(file).cloned()))
    }

    async fn last_tag(&self, path: &Path) -> Result<Option<String>, StoreError> {
        self.enter(RepoOp::Describe, &path_dir(path))?;
        self.with_copy(RepoOp::Describe, path, |copy, _| Ok(copy.tags.last().cloned()))
    }

    async fn push(&self, path: &Path, _branch: &str, tag: Option<&str>) -> Result<(), StoreError> {
        self.enter(RepoOp::Push, &path_dir(path))?;
        self.with_copy(RepoOp::Push, path, |copy, remotes| {
            let remote = remotes.get_mut(&copy.url).ok_or_else(|| StoreError::Failed {
                op: RepoOp::Push,
                message: "remote vanished".to_string(),
            })?;
            if remote.unreachable {
                return Err(unreachable_error(RepoOp::Push, &copy.url));
            }
            remote.revision = copy.revision;
            if let Some(tag) = tag {
                if !remote.tags.iter().any(|t| t == tag) {
                    remote.tags.push(tag.to_string());
                }
            }
            Ok(())
        })
    }

    async fn probe(&self, url: &str) -> Result<(), StoreError> {
        self.enter(RepoOp::Probe, &dir_name(url))?;
        match self.lock().remotes.get(url) {
            Some(remote) if remote.unreachable => Err(unreachable_error(RepoOp::Probe, url)),
            Some(_) => Ok(()),
            None => Err(StoreError::Failed {
                op: RepoOp::Probe,
                message: format!("repository not found: {}", url),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://example.com/org/alpha";

    #[tokio::test]
    async fn test_clone_materializes_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new();
        store.add_remote(URL, &[("pyproject.toml", "version = \"1.0\"\n")]);

        let path = dir.path().join("alpha");
        assert!(!store.exists(&path));
        store.clone_repo(URL, &path).await.unwrap();
        assert!(store.exists(&path));
        assert_eq!(
            std::fs::read_to_string(path.join("pyproject.toml")).unwrap(),
            "version = \"1.0\"\n"
        );
        assert_eq!(store.calls(), vec!["clone alpha"]);
    }

    #[tokio::test]
    async fn test_commit_tag_push() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new();
        store.add_remote(URL, &[]);
        let path = dir.path().join("alpha");
        store.clone_repo(URL, &path).await.unwrap();

        std::fs::write(path.join("pyproject.toml"), "version = \"1.1\"\n").unwrap();
        let before = store.status(&path).await.unwrap().revision;
        store.commit(&path, &["pyproject.toml"], "bump").await.unwrap();
        assert_eq!(
            store.committed_content(&path, "pyproject.toml").await.unwrap().as_deref(),
            Some("version = \"1.1\"\n")
        );
        assert_eq!(store.committed_content(&path, "setup.py").await.unwrap(), None);
        let after = store.status(&path).await.unwrap().revision;
        assert_ne!(before, after);

        store.tag(&path, "1.1").await.unwrap();
        assert!(store.has_tag(&path, "1.1").await.unwrap());
        assert!(store.tag(&path, "1.1").await.is_err());
        assert_eq!(store.last_tag(&path).await.unwrap().as_deref(), Some("1.1"));

        store.push(&path, "main", Some("1.1")).await.unwrap();
        assert_eq!(store.remote_tags(URL), vec!["1.1"]);
    }

    #[tokio::test]
    async fn test_scripted_failure_times() {
        let store = MemoryStore::new();
        store.add_remote(URL, &[]);
        store.fail_times(
            RepoOp::Probe,
            "alpha",
            StoreError::Timeout { op: RepoOp::Probe },
            1,
        );
        assert!(store.probe(URL).await.is_err());
        assert!(store.probe(URL).await.is_ok());
        assert_eq!(store.calls_of(RepoOp::Probe).len(), 2);
    }

    #[tokio::test]
    async fn test_unreachable_remote() {
        let store = MemoryStore::new();
        store.add_remote(URL, &[]);
        store.set_unreachable(URL, true);
        let err = store.probe(URL).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
