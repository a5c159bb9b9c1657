//! Release orchestrator for driving a plan across repositories
//!
//! This module provides:
//! - Workflow coordination: ensure → commit → push → (wait for publication)
//! - Concurrent ensure phase, strictly sequential commit/push phase
//! - Preview pass that checks remote reachability and working copies
//! - Pre-flight check of every release before the first commit
//! - Fail-fast halt with the success/failure boundary reported
//! - Push retry with exponential backoff for retryable errors
//! - Cancellation checked between packages

use crate::domain::{PackageChange, Plan, VersionTuple};
use crate::error::RepoError;
use crate::progress::Progress;
use crate::registry::VersionSource;
use crate::repo::{RepoRegistry, RepoState};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default number of push retries for retryable errors
pub const DEFAULT_RETRIES: u32 = 2;

/// Base delay before the first push retry
const RETRY_BASE_DELAY: Duration = Duration::from_secs(2);

/// Per-package release state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageState {
    Pending,
    Ensured,
    Committed,
    Pushed,
    Failed,
}

impl fmt::Display for PackageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PackageState::Pending => "pending",
            PackageState::Ensured => "ensured",
            PackageState::Committed => "committed",
            PackageState::Pushed => "pushed",
            PackageState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Outcome for one package of the plan
#[derive(Debug, Clone, Serialize)]
pub struct PackageReport {
    pub change: PackageChange,
    pub state: PackageState,
    /// Error that moved the package to `Failed`
    pub error: Option<String>,
}

impl PackageReport {
    fn fail(&mut self, error: &RepoError) {
        warn!(package = %self.change.package, %error, "package failed");
        self.state = PackageState::Failed;
        self.error = Some(error.to_string());
    }

    fn advance(&mut self, state: PackageState) {
        debug!(package = %self.change.package, from = %self.state, to = %state, "transition");
        self.state = state;
    }

    /// Whether the package reached its terminal success state
    pub fn succeeded(&self) -> bool {
        if self.change.requires_release() {
            self.state == PackageState::Pushed
        } else {
            self.state == PackageState::Ensured
        }
    }
}

/// Result of executing a plan
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReleaseReport {
    /// Reports in plan order
    pub packages: Vec<PackageReport>,
    /// The run was cancelled between packages
    pub cancelled: bool,
    /// When the sequential pass started
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the run stopped, successfully or not
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl ReleaseReport {
    fn pending(plan: &Plan) -> Self {
        Self {
            packages: plan
                .iter()
                .map(|change| PackageReport {
                    change: change.clone(),
                    state: PackageState::Pending,
                    error: None,
                })
                .collect(),
            cancelled: false,
            started_at: Some(Utc::now()),
            finished_at: None,
        }
    }

    /// Wall-clock time between start and finish
    pub fn elapsed(&self) -> Option<chrono::Duration> {
        Some(self.finished_at? - self.started_at?)
    }

    /// State of a package, if it is part of the plan
    pub fn state_of(&self, package: &str) -> Option<PackageState> {
        self.packages
            .iter()
            .find(|r| r.change.package == package)
            .map(|r| r.state)
    }

    /// Last package that completed successfully before the halt
    pub fn last_success(&self) -> Option<&PackageReport> {
        self.packages.iter().take_while(|r| r.succeeded()).last()
    }

    /// First package that failed
    pub fn first_failure(&self) -> Option<&PackageReport> {
        self.packages
            .iter()
            .find(|r| r.state == PackageState::Failed)
    }

    /// Packages never attempted
    pub fn not_attempted(&self) -> Vec<&str> {
        self.packages
            .iter()
            .filter(|r| r.state == PackageState::Pending)
            .map(|r| r.change.package.as_str())
            .collect()
    }

    /// Every package reached its terminal success state
    pub fn is_success(&self) -> bool {
        !self.cancelled && self.packages.iter().all(PackageReport::succeeded)
    }
}

/// Result of a preview pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct PreviewReport {
    /// Intended actions in execution order
    pub actions: Vec<String>,
    /// Repositories that could not be reached
    pub unreachable: Vec<String>,
    /// Working copies that would refuse their release commit
    pub blocked: Vec<String>,
}

impl PreviewReport {
    pub fn is_ready(&self) -> bool {
        self.unreachable.is_empty() && self.blocked.is_empty()
    }
}

/// Polling policy while waiting for a pushed version to be published
///
/// The interval shrinks by `step` after every miss until it reaches `floor`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitPolicy {
    pub initial: Duration,
    pub step: Duration,
    pub floor: Duration,
    pub max_attempts: usize,
    /// Pause after the version shows up, letting mirrors catch up
    pub settle: Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(90),
            step: Duration::from_secs(10),
            floor: Duration::from_secs(20),
            max_attempts: 60,
            settle: Duration::from_secs(300),
        }
    }
}

impl WaitPolicy {
    /// A policy that never sleeps, for tests
    pub fn immediate(max_attempts: usize) -> Self {
        Self {
            initial: Duration::ZERO,
            step: Duration::ZERO,
            floor: Duration::ZERO,
            max_attempts,
            settle: Duration::ZERO,
        }
    }
}

/// Tunables for a release run
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    /// Concurrent ensure operations
    pub jobs: usize,
    /// Push retries for retryable errors
    pub retries: u32,
    /// Delay before the first retry, doubled each attempt
    pub retry_delay: Duration,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            jobs: crate::repo::DEFAULT_JOBS,
            retries: DEFAULT_RETRIES,
            retry_delay: RETRY_BASE_DELAY,
        }
    }
}

/// Publication check against the artifact index
struct PublicationCheck {
    source: Arc<dyn VersionSource>,
    base_url: String,
    policy: WaitPolicy,
}

/// Drives a release plan through the per-package state machine
pub struct ReleaseOrchestrator {
    registry: Arc<RepoRegistry>,
    options: OrchestratorOptions,
    publication: Option<PublicationCheck>,
    cancel: Arc<AtomicBool>,
}

impl ReleaseOrchestrator {
    /// Create an orchestrator over a repository registry
    pub fn new(registry: Arc<RepoRegistry>, options: OrchestratorOptions) -> Self {
        Self {
            registry,
            options,
            publication: None,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Wait for each pushed version to appear in the index before moving on
    pub fn with_wait(
        mut self,
        source: Arc<dyn VersionSource>,
        base_url: impl Into<String>,
        policy: WaitPolicy,
    ) -> Self {
        self.publication = Some(PublicationCheck {
            source,
            base_url: base_url.into(),
            policy,
        });
        self
    }

    /// Share a cancellation flag, e.g. one set by a Ctrl-C handler
    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    /// The cancellation flag checked between packages
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Describe what `execute` would do, probing remotes without mutating anything
    pub async fn preview(&self, plan: &Plan) -> PreviewReport {
        let mut report = PreviewReport::default();
        let branch = self.registry.branch();

        for change in plan.iter() {
            if let Err(e) = self.registry.probe(&change.package).await {
                warn!(package = %change.package, error = %e, "repository unreachable");
                report.unreachable.push(e.to_string());
            }
            if change.requires_release() {
                if let Err(e) = self
                    .registry
                    .check_releasable(&change.package, &change.new_version)
                    .await
                {
                    warn!(package = %change.package, error = %e, "release blocked");
                    report.blocked.push(e.to_string());
                }
            }

            let action = if !change.requires_release() {
                format!(
                    "ensure {} (pin {} -> {})",
                    change.package, change.old_version, change.new_version
                )
            } else if change.old_version == change.new_version {
                format!(
                    "push {} {} to {} (already tagged)",
                    change.package, change.new_version, branch
                )
            } else {
                format!(
                    "release {}: {} -> {} (commit, tag {}, push {})",
                    change.package,
                    change.old_version,
                    change.new_version,
                    change.new_version,
                    branch
                )
            };
            report.actions.push(action);
        }
        report
    }

    /// Run the plan: concurrent ensure, then sequential commit and push
    pub async fn execute(&self, plan: &Plan, progress: &mut Progress) -> ReleaseReport {
        let mut report = ReleaseReport::pending(plan);
        let packages: Vec<String> = plan.iter().map(|c| c.package.clone()).collect();

        progress.start(packages.len() as u64, "Ensuring repositories");
        let ensured: HashMap<String, Result<RepoState, RepoError>> = Arc::clone(&self.registry)
            .ensure_all(&packages, self.options.jobs, progress)
            .await
            .into_iter()
            .collect();
        progress.finish_and_clear();

        let blockers = self.preflight(plan, &ensured).await;
        if !blockers.is_empty() {
            for entry in report.packages.iter_mut() {
                if let Some(error) = blockers.get(&entry.change.package) {
                    entry.fail(error);
                }
            }
            report.finished_at = Some(Utc::now());
            return report;
        }

        progress.start(packages.len() as u64, "Releasing");
        for entry in report.packages.iter_mut() {
            if self.cancel.load(Ordering::SeqCst) {
                info!(package = %entry.change.package, "cancelled before package");
                report.cancelled = true;
                break;
            }
            let ensured = ensured.get(&entry.change.package);
            if !self.release_one(entry, ensured, progress).await {
                break;
            }
            progress.inc();
        }
        progress.finish_and_clear();
        report.finished_at = Some(Utc::now());
        report
    }

    /// Blockers of every ensured release, found before anything is committed
    async fn preflight(
        &self,
        plan: &Plan,
        ensured: &HashMap<String, Result<RepoState, RepoError>>,
    ) -> HashMap<String, RepoError> {
        let mut blockers = HashMap::new();
        for change in plan.iter().filter(|c| c.requires_release()) {
            if !matches!(ensured.get(&change.package), Some(Ok(_))) {
                continue;
            }
            if let Err(e) = self
                .registry
                .check_releasable(&change.package, &change.new_version)
                .await
            {
                blockers.insert(change.package.clone(), e);
            }
        }
        blockers
    }

    /// Drive one package to its terminal state; false halts the run
    async fn release_one(
        &self,
        entry: &mut PackageReport,
        ensured: Option<&Result<RepoState, RepoError>>,
        progress: &Progress,
    ) -> bool {
        let package = entry.change.package.clone();
        let version = entry.change.new_version.clone();

        match ensured {
            Some(Ok(_)) => entry.advance(PackageState::Ensured),
            Some(Err(e)) => {
                entry.fail(e);
                return false;
            }
            None => {
                entry.fail(&RepoError::NotConfigured { package });
                return false;
            }
        }
        if !entry.change.requires_release() {
            return true;
        }

        progress.step(&package, "committing");
        if let Err(e) = self.registry.commit_version_bump(&package, &version).await {
            entry.fail(&e);
            return false;
        }
        entry.advance(PackageState::Committed);

        progress.step(&package, "pushing");
        if let Err(e) = self.push_with_retry(&package, &version).await {
            entry.fail(&e);
            return false;
        }
        entry.advance(PackageState::Pushed);
        info!(package = %package, %version, "released");

        if let Some(check) = &self.publication {
            progress.step(&package, "waiting for the index");
            if let Err(e) = wait_for_publication(check, &package, &version).await {
                entry.fail(&e);
                return false;
            }
        }
        true
    }

    async fn push_with_retry(&self, package: &str, version: &VersionTuple) -> Result<(), RepoError> {
        let mut delay = self.options.retry_delay;
        let mut attempt = 0;
        loop {
            match self.registry.push(package, version).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retryable() && attempt < self.options.retries => {
                    attempt += 1;
                    warn!(package, attempt, error = %e, "push failed, retrying");
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Poll the index until the version is published or attempts run out
async fn wait_for_publication(
    check: &PublicationCheck,
    package: &str,
    version: &VersionTuple,
) -> Result<(), RepoError> {
    let policy = &check.policy;
    let mut interval = policy.initial;

    for attempt in 1..=policy.max_attempts {
        match check
            .source
            .is_published(&check.base_url, package, version)
            .await
        {
            Ok(true) => {
                info!(package, %version, attempt, "published");
                tokio::time::sleep(policy.settle).await;
                return Ok(());
            }
            Ok(false) => debug!(package, %version, attempt, "not published yet"),
            Err(e) => warn!(package, %version, attempt, error = %e, "publication check failed"),
        }
        if attempt < policy.max_attempts {
            tokio::time::sleep(interval).await;
            if interval > policy.floor {
                interval = interval.saturating_sub(policy.step).max(policy.floor);
            }
        }
    }

    Err(RepoError::NotPublished {
        package: package.to_string(),
        version: version.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::{RepoOp, StoreError};
    use crate::error::ResolutionError;
    use crate::registry::StaticIndex;
    use crate::repo::MemoryStore;
    use async_trait::async_trait;

    /// Index that raises the cancellation flag once the first release shows up
    struct CancellingIndex {
        cancel: Arc<AtomicBool>,
    }

    #[async_trait]
    impl VersionSource for CancellingIndex {
        fn name(&self) -> &'static str {
            "cancelling"
        }

        async fn published_versions(
            &self,
            _base_url: &str,
            _package: &str,
        ) -> Result<Vec<VersionTuple>, ResolutionError> {
            Ok(Vec::new())
        }

        async fn is_published(
            &self,
            _base_url: &str,
            _package: &str,
            _version: &VersionTuple,
        ) -> Result<bool, ResolutionError> {
            self.cancel.store(true, Ordering::SeqCst);
            Ok(true)
        }
    }

    const CFG: &str = r#"
[versions]
a = "1.0.0.0"
b = "1.0.0.0"
c = "1.0.0.0"

[min_versions]

[params]
max_version = "2.0.0"
artifact_url = "https://index.example.com/pypi"
artifact_release = "1"
wpilib_packages = ["a", "b", "c"]
meta_package = "c"
repos = [
    "https://git.example.com/org/a",
    "https://git.example.com/org/b",
    "https://git.example.com/org/c",
]
"#;

    struct Fixture {
        _dir: tempfile::TempDir,
        store: Arc<MemoryStore>,
        registry: Arc<RepoRegistry>,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::parse(CFG).unwrap();
        let store = Arc::new(MemoryStore::new());
        for url in &config.params.repos {
            store.add_remote(url, &[("pyproject.toml", "version = \"1.0.0.0\"\n")]);
        }
        let registry = Arc::new(RepoRegistry::new(store.clone(), dir.path(), &config));
        Fixture {
            _dir: dir,
            store,
            registry,
        }
    }

    fn release_plan(names: &[&str]) -> Plan {
        let mut plan = Plan::new();
        for name in names {
            plan.push(PackageChange::release(
                *name,
                VersionTuple::new([1, 0, 0, 0]),
                VersionTuple::new([1, 0, 0, 1]),
            ));
        }
        plan
    }

    fn options() -> OrchestratorOptions {
        OrchestratorOptions {
            jobs: 2,
            retries: 2,
            retry_delay: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn test_execute_releases_in_order() {
        let fx = fixture();
        let orchestrator = ReleaseOrchestrator::new(fx.registry.clone(), options());
        let report = orchestrator
            .execute(&release_plan(&["a", "b", "c"]), &mut Progress::disabled())
            .await;

        assert!(report.is_success());
        assert!(report.elapsed().is_some_and(|d| d >= chrono::Duration::zero()));
        assert_eq!(
            fx.store.calls_of(RepoOp::Push),
            vec!["push a", "push b", "push c"]
        );
        assert_eq!(
            fx.store.remote_tags("https://git.example.com/org/b"),
            vec!["1.0.0.1"]
        );
    }

    #[tokio::test]
    async fn test_fail_fast_boundary() {
        let fx = fixture();
        fx.store.fail(
            RepoOp::Commit,
            "b",
            StoreError::Failed {
                op: RepoOp::Commit,
                message: "hook declined".to_string(),
            },
        );
        let orchestrator = ReleaseOrchestrator::new(fx.registry.clone(), options());
        let report = orchestrator
            .execute(&release_plan(&["a", "b", "c"]), &mut Progress::disabled())
            .await;

        assert_eq!(report.state_of("a"), Some(PackageState::Pushed));
        assert_eq!(report.state_of("b"), Some(PackageState::Failed));
        assert_eq!(report.state_of("c"), Some(PackageState::Pending));
        assert_eq!(report.last_success().unwrap().change.package, "a");
        assert_eq!(report.first_failure().unwrap().change.package, "b");
        assert_eq!(report.not_attempted(), vec!["c"]);
        assert!(!report.is_success());
        assert!(fx.store.calls_of(RepoOp::Push).iter().all(|c| c == "push a"));
    }

    #[tokio::test]
    async fn test_retryable_push_is_retried() {
        let fx = fixture();
        fx.store.fail_times(
            RepoOp::Push,
            "a",
            StoreError::Timeout { op: RepoOp::Push },
            2,
        );
        let orchestrator = ReleaseOrchestrator::new(fx.registry.clone(), options());
        let report = orchestrator
            .execute(&release_plan(&["a"]), &mut Progress::disabled())
            .await;
        assert!(report.is_success());
        assert_eq!(fx.store.calls_of(RepoOp::Push).len(), 3);
    }

    #[tokio::test]
    async fn test_rejected_push_is_not_retried() {
        let fx = fixture();
        fx.store.fail(
            RepoOp::Push,
            "a",
            StoreError::Rejected {
                op: RepoOp::Push,
                message: "non-fast-forward".to_string(),
            },
        );
        let orchestrator = ReleaseOrchestrator::new(fx.registry.clone(), options());
        let report = orchestrator
            .execute(&release_plan(&["a", "b"]), &mut Progress::disabled())
            .await;
        assert_eq!(report.state_of("a"), Some(PackageState::Failed));
        assert_eq!(report.state_of("b"), Some(PackageState::Pending));
        assert_eq!(fx.store.calls_of(RepoOp::Push).len(), 1);
        assert!(report.packages[0].error.as_deref().unwrap().contains("push"));
    }

    #[tokio::test]
    async fn test_ensure_failure_halts_at_that_package() {
        let fx = fixture();
        fx.store.fail(
            RepoOp::Clone,
            "b",
            StoreError::Network {
                op: RepoOp::Clone,
                message: "connection refused".to_string(),
            },
        );
        let orchestrator = ReleaseOrchestrator::new(fx.registry.clone(), options());
        let report = orchestrator
            .execute(&release_plan(&["a", "b", "c"]), &mut Progress::disabled())
            .await;
        assert_eq!(report.state_of("a"), Some(PackageState::Pushed));
        assert_eq!(report.state_of("b"), Some(PackageState::Failed));
        assert_eq!(report.state_of("c"), Some(PackageState::Pending));
    }

    #[tokio::test]
    async fn test_cancel_before_start() {
        let fx = fixture();
        let cancel = Arc::new(AtomicBool::new(true));
        let orchestrator =
            ReleaseOrchestrator::new(fx.registry.clone(), options()).with_cancel(cancel);
        let report = orchestrator
            .execute(&release_plan(&["a", "b"]), &mut Progress::disabled())
            .await;
        assert!(report.cancelled);
        assert!(!report.is_success());
        assert_eq!(report.not_attempted(), vec!["a", "b"]);
        assert!(fx.store.calls_of(RepoOp::Commit).is_empty());
    }

    #[tokio::test]
    async fn test_cancel_between_packages() {
        let fx = fixture();
        let cancel = Arc::new(AtomicBool::new(false));
        let index = Arc::new(CancellingIndex {
            cancel: Arc::clone(&cancel),
        });
        let orchestrator = ReleaseOrchestrator::new(fx.registry.clone(), options())
            .with_cancel(cancel)
            .with_wait(index, "https://index.example.com/pypi", WaitPolicy::immediate(1));
        let report = orchestrator
            .execute(&release_plan(&["a", "b"]), &mut Progress::disabled())
            .await;

        assert!(report.cancelled);
        assert_eq!(report.state_of("a"), Some(PackageState::Pushed));
        assert_eq!(report.state_of("b"), Some(PackageState::Pending));
        assert_eq!(fx.store.calls_of(RepoOp::Push), vec!["push a"]);
        assert!(!report.is_success());
    }

    #[tokio::test]
    async fn test_dirty_copy_blocks_before_first_push() {
        let fx = fixture();
        fx.registry.ensure("b").await.unwrap();
        let path = fx.registry.path_for("b").unwrap();
        fx.store.set_changed(&path, &["setup.py"]);

        let orchestrator = ReleaseOrchestrator::new(fx.registry.clone(), options());
        let report = orchestrator
            .execute(&release_plan(&["a", "b"]), &mut Progress::disabled())
            .await;

        assert!(fx.store.calls_of(RepoOp::Push).is_empty());
        assert!(fx.store.calls_of(RepoOp::Commit).is_empty());
        assert_eq!(report.state_of("a"), Some(PackageState::Pending));
        assert_eq!(report.state_of("b"), Some(PackageState::Failed));
        assert_eq!(report.first_failure().unwrap().change.package, "b");
        assert!(report.packages[1].error.as_deref().unwrap().contains("setup.py"));
    }

    #[tokio::test]
    async fn test_preview_reports_blocked_release() {
        let fx = fixture();
        fx.registry.ensure("b").await.unwrap();
        let path = fx.registry.path_for("b").unwrap();
        fx.store.set_branch(&path, "feature");

        let orchestrator = ReleaseOrchestrator::new(fx.registry.clone(), options());
        let preview = orchestrator.preview(&release_plan(&["a", "b"])).await;

        assert!(preview.unreachable.is_empty());
        assert_eq!(preview.blocked.len(), 1);
        assert!(preview.blocked[0].contains("feature"));
        assert!(!preview.is_ready());
        assert!(fx.store.calls_of(RepoOp::Commit).is_empty());
    }

    #[tokio::test]
    async fn test_pin_only_change_ends_ensured() {
        let fx = fixture();
        let mut plan = Plan::new();
        plan.push(PackageChange::pin_only(
            "a",
            VersionTuple::new([1, 0, 0, 0]),
            VersionTuple::new([1, 0, 0, 1]),
        ));
        let orchestrator = ReleaseOrchestrator::new(fx.registry.clone(), options());
        let report = orchestrator.execute(&plan, &mut Progress::disabled()).await;
        assert!(report.is_success());
        assert_eq!(report.state_of("a"), Some(PackageState::Ensured));
        assert!(fx.store.calls_of(RepoOp::Commit).is_empty());
    }

    #[tokio::test]
    async fn test_preview_has_no_side_effects() {
        let fx = fixture();
        fx.store
            .set_unreachable("https://git.example.com/org/c", true);
        let orchestrator = ReleaseOrchestrator::new(fx.registry.clone(), options());
        let preview = orchestrator.preview(&release_plan(&["a", "b", "c"])).await;

        assert_eq!(preview.actions.len(), 3);
        assert!(preview.actions[0].starts_with("release a: 1.0.0.0 -> 1.0.0.1"));
        assert_eq!(preview.unreachable.len(), 1);
        assert!(!preview.is_ready());
        assert!(fx
            .store
            .calls()
            .iter()
            .all(|c| c.starts_with("probe ")));
    }

    #[tokio::test]
    async fn test_wait_for_publication() {
        let fx = fixture();
        let index = Arc::new(StaticIndex::new().with("a", "1.0.0.1"));
        index.delay_publication("a", 2);
        let orchestrator = ReleaseOrchestrator::new(fx.registry.clone(), options()).with_wait(
            index,
            "https://index.example.com/pypi",
            WaitPolicy::immediate(5),
        );
        let report = orchestrator
            .execute(&release_plan(&["a"]), &mut Progress::disabled())
            .await;
        assert!(report.is_success());
    }

    #[tokio::test]
    async fn test_never_published_fails() {
        let fx = fixture();
        let index = Arc::new(StaticIndex::new());
        let orchestrator = ReleaseOrchestrator::new(fx.registry.clone(), options()).with_wait(
            index,
            "https://index.example.com/pypi",
            WaitPolicy::immediate(3),
        );
        let report = orchestrator
            .execute(&release_plan(&["a", "b"]), &mut Progress::disabled())
            .await;
        assert_eq!(report.state_of("a"), Some(PackageState::Failed));
        assert!(report.packages[0]
            .error
            .as_deref()
            .unwrap()
            .contains("not published"));
        assert_eq!(report.state_of("b"), Some(PackageState::Pending));
    }
}
