//! Application error types using thiserror
//!
//! Error hierarchy:
//! - ConfigError: malformed or inconsistent configuration (fatal before any external call)
//! - ResolutionError: per-package version lookup failure (collected, non-fatal)
//! - PlanError: monotonicity or ordering violation (fatal to plan computation)
//! - RepoError: clone/fetch/commit/push failure, wrapping a StoreError when the
//!   Repository Store itself failed

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::domain::VersionTuple;

/// Application-level error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration related errors
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Version resolution errors
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// Plan computation errors
    #[error(transparent)]
    Plan(#[from] PlanError),

    /// Repository errors
    #[error(transparent)]
    Repo(#[from] RepoError),

    /// Failed writing output
    #[error("failed to write output: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors related to the configuration document
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the configuration file
    #[error("failed to read configuration {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write the configuration file
    #[error("failed to write configuration {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The document is not valid TOML or has the wrong shape
    #[error("failed to parse configuration: {message}")]
    Parse { message: String },

    /// A required section is missing
    #[error("configuration is missing required section [{section}]")]
    MissingSection { section: String },

    /// A version string could not be parsed
    #[error("invalid version '{value}' for {key}: {message}")]
    InvalidVersion {
        key: String,
        value: String,
        message: String,
    },

    /// A category list or other reference names a package with no version entry
    #[error("{list} references '{package}' which has no entry in [versions]")]
    UnknownPackage { list: String, package: String },

    /// An override names an unknown resolution strategy
    #[error("invalid override '{value}' for {package}: expected 'index', 'local' or 'git-tag'")]
    InvalidOverride { package: String, value: String },

    /// Failed to serialize the configuration
    #[error("failed to serialize configuration: {message}")]
    Serialize { message: String },
}

/// Errors resolving the actual version of a single package
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    /// Package is not present in the artifact index
    #[error("package '{package}' not found in {source_name}")]
    NotFound {
        package: String,
        source_name: String,
    },

    /// No published version matches the configured release
    #[error("no version of '{package}' published for release {release}")]
    NoMatchingRelease { package: String, release: String },

    /// Network request failed
    #[error("failed to look up '{package}' in {source_name}: {message}")]
    Network {
        package: String,
        source_name: String,
        message: String,
    },

    /// Lookup timed out
    #[error("timeout while looking up '{package}' in {source_name}")]
    Timeout {
        package: String,
        source_name: String,
    },

    /// Index entry could not be interpreted
    #[error("malformed index entry for '{package}': {message}")]
    Malformed { package: String, message: String },

    /// The local working copy could not provide a version
    #[error("failed to read local version of '{package}': {message}")]
    Local { package: String, message: String },
}

impl ResolutionError {
    /// Name of the package the lookup was for
    pub fn package(&self) -> &str {
        match self {
            ResolutionError::NotFound { package, .. }
            | ResolutionError::NoMatchingRelease { package, .. }
            | ResolutionError::Network { package, .. }
            | ResolutionError::Timeout { package, .. }
            | ResolutionError::Malformed { package, .. }
            | ResolutionError::Local { package, .. } => package,
        }
    }

    /// Network errors and timeouts may succeed on a later attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ResolutionError::Network { .. } | ResolutionError::Timeout { .. }
        )
    }

    /// Creates a NotFound error
    pub fn not_found(package: impl Into<String>, source_name: impl Into<String>) -> Self {
        ResolutionError::NotFound {
            package: package.into(),
            source_name: source_name.into(),
        }
    }

    /// Creates a Network error
    pub fn network(
        package: impl Into<String>,
        source_name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        ResolutionError::Network {
            package: package.into(),
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    /// Creates a Timeout error
    pub fn timeout(package: impl Into<String>, source_name: impl Into<String>) -> Self {
        ResolutionError::Timeout {
            package: package.into(),
            source_name: source_name.into(),
        }
    }

    /// Creates a Malformed error
    pub fn malformed(package: impl Into<String>, message: impl Into<String>) -> Self {
        ResolutionError::Malformed {
            package: package.into(),
            message: message.into(),
        }
    }
}

/// Errors computing a plan
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// A target version does not move strictly forward
    #[error("{package}: target version {target} is not greater than current {current}")]
    NotMonotonic {
        package: String,
        current: VersionTuple,
        target: VersionTuple,
    },

    /// The last released tag is ahead of the pinned version
    #[error("{package}: released version {released} is ahead of pinned version {pinned}")]
    Regression {
        package: String,
        released: VersionTuple,
        pinned: VersionTuple,
    },

    /// A target names a package that is not configured
    #[error("unknown package '{package}'")]
    UnknownPackage { package: String },

    /// The `--until` package is not in the repos list
    #[error("'{package}' is not in the repos list")]
    NotInRepos { package: String },
}

/// Repository Store operation, used to name what was attempted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepoOp {
    Clone,
    Fetch,
    Status,
    Commit,
    Tag,
    Push,
    Probe,
    Describe,
    Show,
}

impl fmt::Display for RepoOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RepoOp::Clone => "clone",
            RepoOp::Fetch => "fetch",
            RepoOp::Status => "status",
            RepoOp::Commit => "commit",
            RepoOp::Tag => "tag",
            RepoOp::Push => "push",
            RepoOp::Probe => "probe",
            RepoOp::Describe => "describe",
            RepoOp::Show => "show",
        };
        f.write_str(name)
    }
}

/// Failures reported by a Repository Store implementation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Remote could not be reached
    #[error("{op}: network error: {message}")]
    Network { op: RepoOp, message: String },

    /// Operation exceeded the caller-supplied timeout
    #[error("{op}: timed out")]
    Timeout { op: RepoOp },

    /// Remote refused the operation (stale base, auth failure, protected ref)
    #[error("{op}: rejected: {message}")]
    Rejected { op: RepoOp, message: String },

    /// Any other failure
    #[error("{op}: {message}")]
    Failed { op: RepoOp, message: String },
}

impl StoreError {
    /// The operation that failed
    pub fn op(&self) -> RepoOp {
        match self {
            StoreError::Network { op, .. }
            | StoreError::Timeout { op }
            | StoreError::Rejected { op, .. }
            | StoreError::Failed { op, .. } => *op,
        }
    }

    /// Network errors and timeouts are retryable, rejections are not
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Network { .. } | StoreError::Timeout { .. })
    }
}

/// Errors from repository operations, always naming the package
#[derive(Error, Debug)]
pub enum RepoError {
    /// Package has no repository in the repos list
    #[error("{package}: no repository configured")]
    NotConfigured { package: String },

    /// Working copy does not exist yet
    #[error("{package}: no working copy at {path}")]
    Missing { package: String, path: PathBuf },

    /// Underlying store operation failed
    #[error("{package}: {source}")]
    Store {
        package: String,
        #[source]
        source: StoreError,
    },

    /// Working copy has changes that are not ours
    #[error("{package}: working copy has outstanding changes: {}", paths.join(", "))]
    Dirty { package: String, paths: Vec<String> },

    /// Working copy is on the wrong branch
    #[error("{package}: branch is '{actual}', expected '{expected}'")]
    WrongBranch {
        package: String,
        expected: String,
        actual: String,
    },

    /// Version-declaration file could not be updated
    #[error("{package}: failed to update {path}: {message}")]
    VersionFile {
        package: String,
        path: PathBuf,
        message: String,
    },

    /// Pushed version never showed up in the artifact index
    #[error("{package}: version {version} was not published in time")]
    NotPublished { package: String, version: String },
}

impl RepoError {
    /// Wraps a store failure for a package
    pub fn store(package: impl Into<String>, source: StoreError) -> Self {
        RepoError::Store {
            package: package.into(),
            source,
        }
    }

    /// Creates a VersionFile error
    pub fn version_file(
        package: impl Into<String>,
        path: impl Into<PathBuf>,
        message: impl Into<String>,
    ) -> Self {
        RepoError::VersionFile {
            package: package.into(),
            path: path.into(),
            message: message.into(),
        }
    }

    /// Name of the package the operation was for
    pub fn package(&self) -> &str {
        match self {
            RepoError::NotConfigured { package }
            | RepoError::Missing { package, .. }
            | RepoError::Store { package, .. }
            | RepoError::Dirty { package, .. }
            | RepoError::WrongBranch { package, .. }
            | RepoError::VersionFile { package, .. }
            | RepoError::NotPublished { package, .. } => package,
        }
    }

    /// Whether the caller may retry the same operation
    pub fn is_retryable(&self) -> bool {
        match self {
            RepoError::Store { source, .. } => source.is_retryable(),
            _ => false,
        }
    }
}
