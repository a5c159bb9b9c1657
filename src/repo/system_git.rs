//! System git backend
//!
//! Every operation runs the `git` binary as a child process under the
//! caller-supplied timeout. A timed-out child is killed. Failures are
//! classified from stderr into network, rejection and other errors.

use super::{RepositoryStore, WorkingCopyStatus};
use crate::error::{RepoOp, StoreError};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Default timeout for a single git invocation
pub const DEFAULT_GIT_TIMEOUT: Duration = Duration::from_secs(120);

/// Stderr fragments that mean the remote refused the operation
const REJECTION_MARKERS: &[&str] = &[
    "[rejected]",
    "rejected",
    "non-fast-forward",
    "fetch first",
    "stale info",
    "authentication failed",
    "permission denied",
    "protected branch",
    "denied to",
    "403",
];

/// Stderr fragments that mean the remote could not be reached
const NETWORK_MARKERS: &[&str] = &[
    "could not resolve host",
    "connection refused",
    "connection timed out",
    "connection reset",
    "network is unreachable",
    "operation timed out",
    "unable to access",
    "the remote end hung up unexpectedly",
    "early eof",
    "failed to connect",
];

/// Repository Store using the system git binary
#[derive(Debug, Clone)]
pub struct SystemGit {
    timeout: Duration,
}

impl SystemGit {
    /// Create a store with the default timeout
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_GIT_TIMEOUT)
    }

    /// Create a store with a custom per-command timeout
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Build a git command, optionally rooted at a working copy
    fn git_cmd(&self, cwd: Option<&Path>) -> Command {
        let mut cmd = Command::new("git");
        if let Some(dir) = cwd {
            cmd.arg("-C").arg(dir);
        }
        // Never block on a credential prompt
        cmd.env("GIT_TERMINAL_PROMPT", "0");
        cmd.arg("-c").arg("advice.detachedHead=false");
        cmd.arg("-c").arg("core.quotePath=false");
        cmd.stdin(Stdio::null());
        cmd.kill_on_drop(true);
        cmd
    }

    /// Run git and return trimmed stdout
    async fn run(&self, op: RepoOp, cwd: Option<&Path>, args: &[&str]) -> Result<String, StoreError> {
        let stdout = self.run_raw(op, cwd, args).await?;
        Ok(stdout.trim_end().to_string())
    }

    /// Run git and return stdout exactly as printed
    async fn run_raw(
        &self,
        op: RepoOp,
        cwd: Option<&Path>,
        args: &[&str],
    ) -> Result<String, StoreError> {
        let mut cmd = self.git_cmd(cwd);
        cmd.args(args);
        debug!(%op, ?args, cwd = ?cwd, "running git");

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Err(_) => return Err(StoreError::Timeout { op }),
            Ok(Err(e)) => {
                return Err(StoreError::Failed {
                    op,
                    message: format!("failed to execute git: {}", e),
                })
            }
            Ok(Ok(output)) => output,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_failure(op, stderr.trim()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Default for SystemGit {
    fn default() -> Self {
        Self::new()
    }
}

/// Map git stderr onto a store error
pub(crate) fn classify_failure(op: RepoOp, stderr: &str) -> StoreError {
    let lower = stderr.to_lowercase();
    let message = stderr.to_string();
    if REJECTION_MARKERS.iter().any(|m| lower.contains(m)) {
        StoreError::Rejected { op, message }
    } else if NETWORK_MARKERS.iter().any(|m| lower.contains(m)) {
        StoreError::Network { op, message }
    } else {
        StoreError::Failed { op, message }
    }
}

/// Result of a ref lookup run with `--quiet`: a silent failure means the
/// ref does not exist, anything else is a real error
pub(crate) fn optional_ref(result: Result<String, StoreError>) -> Result<Option<String>, StoreError> {
    match result {
        Ok(out) => Ok(Some(out).filter(|s| !s.is_empty())),
        Err(StoreError::Failed { message, .. }) if message.is_empty() => Ok(None),
        Err(e) => Err(e),
    }
}

/// Parse `git status --porcelain` output into changed paths
pub(crate) fn parse_porcelain(output: &str) -> Vec<String> {
    output
        .lines()
        .filter(|line| line.len() > 3)
        .map(|line| {
            let path = &line[3..];
            // Renames are reported as "old -> new"
            match path.split_once(" -> ") {
                Some((_, new)) => new.to_string(),
                None => path.to_string(),
            }
        })
        .collect()
}

#[async_trait]
impl RepositoryStore for SystemGit {
    fn exists(&self, path: &Path) -> bool {
        path.join(".git").exists()
    }

    async fn clone_repo(&self, url: &str, path: &Path) -> Result<(), StoreError> {
        let target = path.to_string_lossy();
        self.run(RepoOp::Clone, None, &["clone", url, &target])
            .await
            .map(|_| ())
    }

    async fn fetch(&self, path: &Path) -> Result<(), StoreError> {
        self.run(RepoOp::Fetch, Some(path), &["fetch", "--tags", "origin"])
            .await
            .map(|_| ())
    }

    async fn status(&self, path: &Path) -> Result<WorkingCopyStatus, StoreError> {
        let porcelain = self
            .run(RepoOp::Status, Some(path), &["status", "--porcelain"])
            .await?;
        let revision = optional_ref(
            self.run(RepoOp::Status, Some(path), &["rev-parse", "--verify", "--quiet", "HEAD"])
                .await,
        )?;
        let branch = optional_ref(
            self.run(RepoOp::Status, Some(path), &["symbolic-ref", "--short", "-q", "HEAD"])
                .await,
        )?;

        Ok(WorkingCopyStatus {
            revision,
            branch,
            changed: parse_porcelain(&porcelain),
        })
    }

    async fn commit(&self, path: &Path, files: &[&str], message: &str) -> Result<(), StoreError> {
        let mut args = vec!["commit", "-m", message, "--"];
        args.extend_from_slice(files);
        self.run(RepoOp::Commit, Some(path), &args).await.map(|_| ())
    }

    async fn tag(&self, path: &Path, tag: &str) -> Result<(), StoreError> {
        self.run(RepoOp::Tag, Some(path), &["tag", tag])
            .await
            .map(|_| ())
    }

    async fn has_tag(&self, path: &Path, tag: &str) -> Result<bool, StoreError> {
        let out = self
            .run(RepoOp::Tag, Some(path), &["tag", "--list", tag])
            .await?;
        Ok(out.lines().any(|line| line.trim() == tag))
    }

    async fn committed_content(&self, path: &Path, file: &str) -> Result<Option<String>, StoreError> {
        let spec = format!("HEAD:{}", file);
        match self.run_raw(RepoOp::Show, Some(path), &["show", &spec]).await {
            Ok(content) => Ok(Some(content)),
            Err(StoreError::Failed { message, .. })
                if message.contains("does not exist")
                    || message.contains("exists on disk, but not in")
                    || message.contains("invalid object name") =>
            {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn last_tag(&self, path: &Path) -> Result<Option<String>, StoreError> {
        match self
            .run(RepoOp::Describe, Some(path), &["describe", "--abbrev=0", "--tags"])
            .await
        {
            Ok(tag) => Ok(Some(tag.trim().to_string())),
            Err(StoreError::Failed { message, .. })
                if message.contains("No names found") || message.contains("cannot describe") =>
            {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn push(&self, path: &Path, branch: &str, tag: Option<&str>) -> Result<(), StoreError> {
        let branch_ref = format!("refs/heads/{}", branch);
        let tag_ref = tag.map(|t| format!("refs/tags/{}", t));
        let mut args = vec!["push", "--atomic", "origin", branch_ref.as_str()];
        if let Some(tag_ref) = &tag_ref {
            args.push(tag_ref.as_str());
        }
        self.run(RepoOp::Push, Some(path), &args).await.map(|_| ())
    }

    async fn probe(&self, url: &str) -> Result<(), StoreError> {
        self.run(RepoOp::Probe, None, &["ls-remote", "--heads", url])
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_rejection() {
        let err = classify_failure(
            RepoOp::Push,
            " ! [rejected]        main -> main (non-fast-forward)",
        );
        assert!(matches!(err, StoreError::Rejected { .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_classify_network() {
        let err = classify_failure(
            RepoOp::Fetch,
            "fatal: unable to access 'https://github.com/x/y/': Could not resolve host: github.com",
        );
        assert!(matches!(err, StoreError::Network { .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_classify_auth_failure_is_rejection() {
        let err = classify_failure(
            RepoOp::Push,
            "remote: Permission to x/y.git denied to someone.",
        );
        assert!(matches!(err, StoreError::Rejected { .. }));
    }

    #[test]
    fn test_classify_other() {
        let err = classify_failure(RepoOp::Commit, "nothing to commit, working tree clean");
        assert!(matches!(err, StoreError::Failed { op: RepoOp::Commit, .. }));
    }

    #[test]
    fn test_optional_ref_missing_is_none() {
        assert_eq!(optional_ref(Ok("main".to_string())).unwrap().as_deref(), Some("main"));
        assert_eq!(optional_ref(Ok(String::new())).unwrap(), None);
        let silent = StoreError::Failed {
            op: RepoOp::Status,
            message: String::new(),
        };
        assert_eq!(optional_ref(Err(silent)).unwrap(), None);
    }

    #[test]
    fn test_optional_ref_propagates_real_failures() {
        let timeout = StoreError::Timeout { op: RepoOp::Status };
        assert_eq!(optional_ref(Err(timeout.clone())), Err(timeout));

        let broken = StoreError::Failed {
            op: RepoOp::Status,
            message: "fatal: not a git repository".to_string(),
        };
        assert!(optional_ref(Err(broken)).is_err());
    }

    #[test]
    fn test_parse_porcelain() {
        let out = " M pyproject.toml\n?? notes.txt\nR  old.py -> new.py\n";
        assert_eq!(
            parse_porcelain(out),
            vec!["pyproject.toml", "notes.txt", "new.py"]
        );
        assert!(parse_porcelain("").is_empty());
    }

    #[test]
    fn test_exists_requires_git_dir() {
        let dir = tempfile::tempdir().unwrap();
        let git = SystemGit::new();
        assert!(!git.exists(dir.path()));
        std::fs::create_dir(dir.path().join(".git")).unwrap();
        assert!(git.exists(dir.path()));
    }
}
