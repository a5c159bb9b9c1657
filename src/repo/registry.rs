//! Package-to-working-copy mapping and the repository operations the
//! release engine performs on them

use super::pyproject::{update_requirements, RequirementEdit, RequirementPolicy};
use super::{bump_version, declared_version, RepoState, RepositoryStore, WorkingCopyStatus};
use crate::config::{repo_dir_name, Config};
use crate::domain::VersionTuple;
use crate::error::{RepoError, RepoOp, StoreError};
use crate::progress::Progress;
use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info};

/// Default number of repositories processed at once
pub const DEFAULT_JOBS: usize = 4;

/// Maps packages to working copies under one root directory
pub struct RepoRegistry {
    store: Arc<dyn RepositoryStore>,
    root: PathBuf,
    /// Repository URL per package, in repos order
    urls: IndexMap<String, String>,
    branch: String,
    version_file: String,
}

impl RepoRegistry {
    /// Create a registry for every repository in the configuration
    pub fn new(store: Arc<dyn RepositoryStore>, root: impl Into<PathBuf>, config: &Config) -> Self {
        let mut urls = IndexMap::new();
        for url in &config.params.repos {
            let name = config.package_for_repo(url).to_string();
            urls.entry(name).or_insert_with(|| url.clone());
        }
        Self {
            store,
            root: root.into(),
            urls,
            branch: config.params.branch().to_string(),
            version_file: config.params.version_file().to_string(),
        }
    }

    /// Root directory holding the working copies
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Release branch
    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// Repository URL of a package
    pub fn url(&self, package: &str) -> Result<&str, RepoError> {
        self.urls
            .get(package)
            .map(String::as_str)
            .ok_or_else(|| RepoError::NotConfigured {
                package: package.to_string(),
            })
    }

    /// Working copy path of a package
    pub fn path_for(&self, package: &str) -> Result<PathBuf, RepoError> {
        let url = self.url(package)?;
        Ok(self.root.join(repo_dir_name(url)))
    }

    /// Clone the working copy if it is missing, otherwise fetch
    pub async fn ensure(&self, package: &str) -> Result<RepoState, RepoError> {
        let url = self.url(package)?;
        let path = self.path_for(package)?;
        let wrap = |e: StoreError| RepoError::store(package, e);

        if self.store.exists(&path) {
            debug!(package, path = %path.display(), "fetching");
            self.store.fetch(&path).await.map_err(wrap)?;
        } else {
            info!(package, url, path = %path.display(), "cloning");
            self.store.clone_repo(url, &path).await.map_err(wrap)?;
        }

        let status = self.store.status(&path).await.map_err(wrap)?;
        Ok(RepoState::from_status(package, path, status))
    }

    /// Ensure many packages concurrently, returning results in input order
    pub async fn ensure_all(
        self: Arc<Self>,
        packages: &[String],
        jobs: usize,
        progress: &Progress,
    ) -> Vec<(String, Result<RepoState, RepoError>)> {
        let semaphore = Arc::new(Semaphore::new(jobs.max(1)));
        let mut set = JoinSet::new();

        for (index, package) in packages.iter().enumerate() {
            let registry = Arc::clone(&self);
            let semaphore = Arc::clone(&semaphore);
            let package = package.clone();
            set.spawn(async move {
                // The semaphore is never closed
                let _permit = semaphore.acquire_owned().await.ok();
                let result = registry.ensure(&package).await;
                (index, package, result)
            });
        }

        let mut slots: Vec<Option<(String, Result<RepoState, RepoError>)>> =
            (0..packages.len()).map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, package, result)) => {
                    progress.set_message(&format!("Ensured {}", package));
                    progress.inc();
                    slots[index] = Some((package, result));
                }
                Err(e) => {
                    // A panicked task leaves its slot empty; reported below
                    debug!(error = %e, "ensure task failed");
                }
            }
        }

        slots
            .into_iter()
            .zip(packages)
            .map(|(slot, package)| {
                slot.unwrap_or_else(|| {
                    (
                        package.clone(),
                        Err(RepoError::store(
                            package.clone(),
                            StoreError::Failed {
                                op: RepoOp::Clone,
                                message: "task aborted".to_string(),
                            },
                        )),
                    )
                })
            })
            .collect()
    }

    /// Read-only status of a package's working copy
    pub async fn status(&self, package: &str) -> Result<RepoState, RepoError> {
        let path = self.path_for(package)?;
        if !self.store.exists(&path) {
            return Ok(RepoState::missing(package, path));
        }
        let status = self
            .store
            .status(&path)
            .await
            .map_err(|e| RepoError::store(package, e))?;
        Ok(RepoState::from_status(package, path, status))
    }

    /// Check that the package's remote is reachable
    pub async fn probe(&self, package: &str) -> Result<(), RepoError> {
        let url = self.url(package)?;
        self.store
            .probe(url)
            .await
            .map_err(|e| RepoError::store(package, e))
    }

    /// Version of the most recent tag, None when the repository has no
    /// tags or the last tag is not a version
    pub async fn last_release(&self, package: &str) -> Result<Option<VersionTuple>, RepoError> {
        let path = self.existing_path(package)?;
        let tag = self
            .store
            .last_tag(&path)
            .await
            .map_err(|e| RepoError::store(package, e))?;
        Ok(tag.and_then(|t| t.parse().ok()))
    }

    /// Whether a release tag already exists locally
    pub async fn has_release(&self, package: &str, version: &VersionTuple) -> Result<bool, RepoError> {
        let path = self.existing_path(package)?;
        self.store
            .has_tag(&path, &version.to_string())
            .await
            .map_err(|e| RepoError::store(package, e))
    }

    /// Check that a release of `version` can be committed without touching
    /// anyone else's work, returning the current state
    ///
    /// A missing working copy passes: ensure will produce a fresh clone.
    pub async fn check_releasable(
        &self,
        package: &str,
        version: &VersionTuple,
    ) -> Result<RepoState, RepoError> {
        let path = self.path_for(package)?;
        if !self.store.exists(&path) {
            return Ok(RepoState::missing(package, path));
        }
        let status = self.releasable_status(package, &path, version).await?;
        Ok(RepoState::from_status(package, path, status))
    }

    /// Status of a working copy that is on the release branch and whose only
    /// uncommitted change, if any, is this version's bump of the version file
    async fn releasable_status(
        &self,
        package: &str,
        path: &Path,
        version: &VersionTuple,
    ) -> Result<WorkingCopyStatus, RepoError> {
        let wrap = |e: StoreError| RepoError::store(package, e);
        let status = self.store.status(path).await.map_err(wrap)?;

        let actual = status.branch.clone().unwrap_or_else(|| "HEAD".to_string());
        if actual != self.branch {
            return Err(RepoError::WrongBranch {
                package: package.to_string(),
                expected: self.branch.clone(),
                actual,
            });
        }
        let foreign: Vec<String> = status
            .changed
            .iter()
            .filter(|p| p.as_str() != self.version_file)
            .cloned()
            .collect();
        if !foreign.is_empty() {
            return Err(RepoError::Dirty {
                package: package.to_string(),
                paths: foreign,
            });
        }

        if status.changed.iter().any(|p| p == &self.version_file)
            && !self.is_pending_bump(package, path, version).await?
        {
            return Err(RepoError::Dirty {
                package: package.to_string(),
                paths: vec![self.version_file.clone()],
            });
        }
        Ok(status)
    }

    /// Whether the version file differs from HEAD only by declaring `version`
    async fn is_pending_bump(
        &self,
        package: &str,
        path: &Path,
        version: &VersionTuple,
    ) -> Result<bool, RepoError> {
        let committed = self
            .store
            .committed_content(path, &self.version_file)
            .await
            .map_err(|e| RepoError::store(package, e))?;
        let Some(committed) = committed else {
            return Ok(false);
        };
        let Some(head_version) = declared_version(&committed) else {
            return Ok(false);
        };

        let file = path.join(&self.version_file);
        let working = std::fs::read_to_string(&file)
            .map_err(|e| RepoError::version_file(package, &file, e.to_string()))?;
        let tag = version.to_string();
        if declared_version(&working) != Some(tag.as_str()) {
            return Ok(false);
        }
        Ok(bump_version(&working, head_version).is_ok_and(|reverted| reverted == committed))
    }

    /// Write the new version, commit it and tag the commit
    ///
    /// Re-entry is safe: when the tag already exists nothing is committed,
    /// and a version file left bumped by an interrupted run is committed as is.
    pub async fn commit_version_bump(
        &self,
        package: &str,
        version: &VersionTuple,
    ) -> Result<RepoState, RepoError> {
        let path = self.existing_path(package)?;
        let wrap = |e: StoreError| RepoError::store(package, e);
        let tag = version.to_string();

        let status = self.releasable_status(package, &path, version).await?;

        if self.store.has_tag(&path, &tag).await.map_err(wrap)? {
            info!(package, %tag, "already tagged, skipping commit");
            return Ok(RepoState::from_status(package, path, status));
        }

        let file = path.join(&self.version_file);
        let content = std::fs::read_to_string(&file)
            .map_err(|e| RepoError::version_file(package, &file, e.to_string()))?;
        let updated = bump_version(&content, &tag)
            .map_err(|e| RepoError::version_file(package, &file, e))?;

        let version_file_dirty = status.changed.iter().any(|p| p == &self.version_file);
        if updated != content || version_file_dirty {
            std::fs::write(&file, &updated)
                .map_err(|e| RepoError::version_file(package, &file, e.to_string()))?;
            self.store
                .commit(&path, &[self.version_file.as_str()], &format!("Release {}", tag))
                .await
                .map_err(wrap)?;
        }
        self.store.tag(&path, &tag).await.map_err(wrap)?;
        info!(package, %tag, "committed and tagged");

        let status = self.store.status(&path).await.map_err(wrap)?;
        Ok(RepoState::from_status(package, path, status))
    }

    /// Push the release branch and tag atomically
    pub async fn push(&self, package: &str, version: &VersionTuple) -> Result<(), RepoError> {
        let path = self.existing_path(package)?;
        let tag = version.to_string();
        info!(package, branch = %self.branch, %tag, "pushing");
        self.store
            .push(&path, &self.branch, Some(&tag))
            .await
            .map_err(|e| RepoError::store(package, e))
    }

    /// Bring a package's requirements in line with `policy`
    ///
    /// In commit mode the version file is rewritten and committed on the
    /// release branch. Nothing is pushed.
    pub async fn update_requirements(
        &self,
        package: &str,
        policy: &RequirementPolicy<'_>,
        commit: bool,
    ) -> Result<Vec<RequirementEdit>, RepoError> {
        let path = self.existing_path(package)?;
        let wrap = |e: StoreError| RepoError::store(package, e);

        let file = path.join(&self.version_file);
        let content = std::fs::read_to_string(&file)
            .map_err(|e| RepoError::version_file(package, &file, e.to_string()))?;
        let project = update_requirements(&content, policy)
            .map_err(|e| RepoError::version_file(package, &file, e))?;
        if !commit || project.is_empty() {
            return Ok(project.edits);
        }

        let status = self.store.status(&path).await.map_err(wrap)?;
        let actual = status.branch.unwrap_or_else(|| "HEAD".to_string());
        if actual != self.branch {
            return Err(RepoError::WrongBranch {
                package: package.to_string(),
                expected: self.branch.clone(),
                actual,
            });
        }
        if status.changed.iter().any(|p| p == &self.version_file) {
            return Err(RepoError::Dirty {
                package: package.to_string(),
                paths: vec![self.version_file.clone()],
            });
        }

        std::fs::write(&file, &project.content)
            .map_err(|e| RepoError::version_file(package, &file, e.to_string()))?;
        self.store
            .commit(&path, &[self.version_file.as_str()], &project.commit_message())
            .await
            .map_err(wrap)?;
        info!(package, edits = project.edits.len(), "committed requirement updates");
        Ok(project.edits)
    }

    fn existing_path(&self, package: &str) -> Result<PathBuf, RepoError> {
        let path = self.path_for(package)?;
        if !self.store.exists(&path) {
            return Err(RepoError::Missing {
                package: package.to_string(),
                path,
            });
        }
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::SAMPLE;
    use crate::repo::MemoryStore;

    const WPIUTIL: &str = "https://github.com/robotpy/robotpy-wpiutil";
    const PYPROJECT: &str = "[project]\nname = \"robotpy-wpiutil\"\nversion = \"2023.4.3.0\"\n";

    fn setup() -> (tempfile::TempDir, Arc<MemoryStore>, Arc<RepoRegistry>) {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::parse(SAMPLE).unwrap();
        let store = Arc::new(MemoryStore::new());
        for url in &config.params.repos {
            store.add_remote(url, &[("pyproject.toml", PYPROJECT)]);
        }
        let registry = Arc::new(RepoRegistry::new(store.clone(), dir.path(), &config));
        (dir, store, registry)
    }

    #[test]
    fn test_path_for_uses_repo_dir_name() {
        let (dir, _store, registry) = setup();
        assert_eq!(
            registry.path_for("robotpy").unwrap(),
            dir.path().join("robotpy-meta")
        );
        assert!(matches!(
            registry.path_for("ghost"),
            Err(RepoError::NotConfigured { .. })
        ));
    }

    #[tokio::test]
    async fn test_ensure_clones_then_fetches() {
        let (_dir, store, registry) = setup();
        let state = registry.ensure("robotpy-wpiutil").await.unwrap();
        assert!(state.exists);
        assert!(!state.dirty);
        registry.ensure("robotpy-wpiutil").await.unwrap();
        assert_eq!(store.calls_of(RepoOp::Clone), vec!["clone robotpy-wpiutil"]);
        assert_eq!(store.calls_of(RepoOp::Fetch), vec!["fetch robotpy-wpiutil"]);
    }

    #[tokio::test]
    async fn test_ensure_all_preserves_order() {
        let (_dir, store, registry) = setup();
        store.fail(
            RepoOp::Clone,
            "robotpy-rev",
            StoreError::Network {
                op: RepoOp::Clone,
                message: "could not resolve host".to_string(),
            },
        );
        let packages: Vec<String> = ["robotpy-rev", "robotpy-wpiutil", "robotpy"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let results = Arc::clone(&registry)
            .ensure_all(&packages, 2, &Progress::disabled())
            .await;
        let names: Vec<_> = results.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["robotpy-rev", "robotpy-wpiutil", "robotpy"]);
        assert!(results[0].1.is_err());
        assert!(results[1].1.is_ok());
        assert!(results[2].1.is_ok());
    }

    #[tokio::test]
    async fn test_status_of_missing_copy() {
        let (_dir, store, registry) = setup();
        let state = registry.status("robotpy-rev").await.unwrap();
        assert!(!state.exists);
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_commit_version_bump() {
        let (_dir, store, registry) = setup();
        registry.ensure("robotpy-wpiutil").await.unwrap();
        let version = VersionTuple::new([2023, 4, 3, 1]);

        registry.commit_version_bump("robotpy-wpiutil", &version).await.unwrap();

        let path = registry.path_for("robotpy-wpiutil").unwrap();
        let content = std::fs::read_to_string(path.join("pyproject.toml")).unwrap();
        assert!(content.contains("version = \"2023.4.3.1\""));
        assert!(registry.has_release("robotpy-wpiutil", &version).await.unwrap());
        assert_eq!(
            registry.last_release("robotpy-wpiutil").await.unwrap(),
            Some(version.clone())
        );

        // Second run finds the tag and commits nothing
        registry.commit_version_bump("robotpy-wpiutil", &version).await.unwrap();
        assert_eq!(store.calls_of(RepoOp::Commit).len(), 1);
        assert_eq!(store.calls_of(RepoOp::Tag).len(), 1);
        assert!(store.remote_tags(WPIUTIL).is_empty());
    }

    #[tokio::test]
    async fn test_commit_refuses_foreign_changes() {
        let (_dir, store, registry) = setup();
        registry.ensure("robotpy-wpiutil").await.unwrap();
        let path = registry.path_for("robotpy-wpiutil").unwrap();
        store.set_changed(&path, &["pyproject.toml", "setup.py"]);

        let err = registry
            .commit_version_bump("robotpy-wpiutil", &VersionTuple::new([2023, 4, 3, 1]))
            .await
            .unwrap_err();
        match err {
            RepoError::Dirty { paths, .. } => assert_eq!(paths, vec!["setup.py"]),
            other => panic!("expected Dirty, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_commit_refuses_edited_version_file() {
        let (_dir, store, registry) = setup();
        registry.ensure("robotpy-wpiutil").await.unwrap();
        let path = registry.path_for("robotpy-wpiutil").unwrap();
        let file = path.join("pyproject.toml");
        let edited = format!("{}deps = [\"hand-edit\"]\n", PYPROJECT);
        std::fs::write(&file, &edited).unwrap();
        store.set_changed(&path, &["pyproject.toml"]);

        let err = registry
            .commit_version_bump("robotpy-wpiutil", &VersionTuple::new([2023, 4, 3, 1]))
            .await
            .unwrap_err();
        match err {
            RepoError::Dirty { paths, .. } => assert_eq!(paths, vec!["pyproject.toml"]),
            other => panic!("expected Dirty, got {:?}", other),
        }
        assert!(store.calls_of(RepoOp::Commit).is_empty());
        assert_eq!(std::fs::read_to_string(&file).unwrap(), edited);
    }

    #[tokio::test]
    async fn test_commit_resumes_interrupted_bump() {
        let (_dir, store, registry) = setup();
        registry.ensure("robotpy-wpiutil").await.unwrap();
        let path = registry.path_for("robotpy-wpiutil").unwrap();
        let file = path.join("pyproject.toml");
        std::fs::write(&file, bump_version(PYPROJECT, "2023.4.3.1").unwrap()).unwrap();
        store.set_changed(&path, &["pyproject.toml"]);

        let version = VersionTuple::new([2023, 4, 3, 1]);
        registry.commit_version_bump("robotpy-wpiutil", &version).await.unwrap();
        assert_eq!(store.calls_of(RepoOp::Commit).len(), 1);
        assert!(registry.has_release("robotpy-wpiutil", &version).await.unwrap());
    }

    #[tokio::test]
    async fn test_bump_to_another_version_is_not_resumable() {
        let (_dir, store, registry) = setup();
        registry.ensure("robotpy-wpiutil").await.unwrap();
        let path = registry.path_for("robotpy-wpiutil").unwrap();
        std::fs::write(
            path.join("pyproject.toml"),
            bump_version(PYPROJECT, "2023.4.3.7").unwrap(),
        )
        .unwrap();
        store.set_changed(&path, &["pyproject.toml"]);

        let result = registry
            .check_releasable("robotpy-wpiutil", &VersionTuple::new([2023, 4, 3, 1]))
            .await;
        assert!(matches!(result, Err(RepoError::Dirty { .. })));
    }

    #[tokio::test]
    async fn test_check_releasable() {
        let (_dir, store, registry) = setup();
        let version = VersionTuple::new([2023, 4, 3, 1]);
        let state = registry.check_releasable("robotpy-wpiutil", &version).await.unwrap();
        assert!(!state.exists);

        registry.ensure("robotpy-wpiutil").await.unwrap();
        assert!(registry.check_releasable("robotpy-wpiutil", &version).await.is_ok());

        let path = registry.path_for("robotpy-wpiutil").unwrap();
        store.set_branch(&path, "feature");
        assert!(matches!(
            registry.check_releasable("robotpy-wpiutil", &version).await,
            Err(RepoError::WrongBranch { .. })
        ));
        assert!(store.calls_of(RepoOp::Commit).is_empty());
    }

    #[tokio::test]
    async fn test_commit_refuses_wrong_branch() {
        let (_dir, store, registry) = setup();
        registry.ensure("robotpy-wpiutil").await.unwrap();
        let path = registry.path_for("robotpy-wpiutil").unwrap();
        store.set_branch(&path, "feature");

        let err = registry
            .commit_version_bump("robotpy-wpiutil", &VersionTuple::new([2023, 4, 3, 1]))
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::WrongBranch { .. }));
    }

    #[tokio::test]
    async fn test_commit_without_working_copy() {
        let (_dir, _store, registry) = setup();
        let err = registry
            .commit_version_bump("robotpy-wpiutil", &VersionTuple::new([2023, 4, 3, 1]))
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::Missing { .. }));
    }

    #[tokio::test]
    async fn test_push_publishes_tag() {
        let (_dir, store, registry) = setup();
        registry.ensure("robotpy-wpiutil").await.unwrap();
        let version = VersionTuple::new([2023, 4, 3, 1]);
        registry.commit_version_bump("robotpy-wpiutil", &version).await.unwrap();
        registry.push("robotpy-wpiutil", &version).await.unwrap();
        assert_eq!(store.remote_tags(WPIUTIL), vec!["2023.4.3.1"]);
    }

    const DEPENDENT: &str = "[project]\nname = \"robotpy-wpinet\"\nversion = \"2023.4.3.0\"\ndependencies = [\"robotpy-wpiutil>=2023.4.0.0,<2024.0.0\"]\n";

    fn dependent_policy_inputs() -> (IndexMap<String, VersionTuple>, VersionTuple) {
        let mut min_versions = IndexMap::new();
        min_versions.insert("robotpy-wpiutil".to_string(), VersionTuple::new([2023, 4, 3, 0]));
        (min_versions, VersionTuple::new([2024, 0, 0]))
    }

    #[tokio::test]
    async fn test_update_requirements_preview_and_commit() {
        let (_dir, store, registry) = setup();
        registry.ensure("robotpy-wpiutil").await.unwrap();
        let file = registry.path_for("robotpy-wpiutil").unwrap().join("pyproject.toml");
        std::fs::write(&file, DEPENDENT).unwrap();
        let (min_versions, max_version) = dependent_policy_inputs();
        let policy = RequirementPolicy {
            min_versions: &min_versions,
            max_version: &max_version,
            lib_version: None,
        };

        let edits = registry
            .update_requirements("robotpy-wpiutil", &policy, false)
            .await
            .unwrap();
        assert_eq!(edits.len(), 1);
        assert_eq!(std::fs::read_to_string(&file).unwrap(), DEPENDENT);
        assert!(store.calls_of(RepoOp::Commit).is_empty());

        registry
            .update_requirements("robotpy-wpiutil", &policy, true)
            .await
            .unwrap();
        assert!(std::fs::read_to_string(&file)
            .unwrap()
            .contains("robotpy-wpiutil>=2023.4.3.0,<2024.0.0"));
        assert_eq!(store.calls_of(RepoOp::Commit).len(), 1);
        assert!(store.calls_of(RepoOp::Push).is_empty());

        // Already up to date
        let edits = registry
            .update_requirements("robotpy-wpiutil", &policy, true)
            .await
            .unwrap();
        assert!(edits.is_empty());
        assert_eq!(store.calls_of(RepoOp::Commit).len(), 1);
    }

    #[tokio::test]
    async fn test_update_requirements_refuses_edited_file() {
        let (_dir, store, registry) = setup();
        registry.ensure("robotpy-wpiutil").await.unwrap();
        let path = registry.path_for("robotpy-wpiutil").unwrap();
        std::fs::write(path.join("pyproject.toml"), DEPENDENT).unwrap();
        store.set_changed(&path, &["pyproject.toml"]);
        let (min_versions, max_version) = dependent_policy_inputs();
        let policy = RequirementPolicy {
            min_versions: &min_versions,
            max_version: &max_version,
            lib_version: None,
        };

        let err = registry
            .update_requirements("robotpy-wpiutil", &policy, true)
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::Dirty { .. }));
        assert!(store.calls_of(RepoOp::Commit).is_empty());
    }
}
