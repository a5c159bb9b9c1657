//! Managed package definitions

use super::VersionTuple;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which part of the distribution a package belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Pure packages with no native artifacts
    Pure,
    /// Distribution packages versioned with the upstream release
    Wpilib,
    /// Independently versioned vendor packages
    Vendor,
}

impl Category {
    /// Returns the params key listing packages of this category
    pub fn list_key(&self) -> &'static str {
        match self {
            Category::Pure => "pure_packages",
            Category::Wpilib => "wpilib_packages",
            Category::Vendor => "vendor_packages",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Pure => write!(f, "pure"),
            Category::Wpilib => write!(f, "wpilib"),
            Category::Vendor => write!(f, "vendor"),
        }
    }
}

/// How the actual version of a package is resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolveStrategy {
    /// Ask the artifact index for the latest published version
    #[default]
    Index,
    /// Use whatever is locally checked out (the declared minimum version)
    Local,
    /// Use the last tag of the local working copy
    GitTag,
}

impl fmt::Display for ResolveStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveStrategy::Index => write!(f, "index"),
            ResolveStrategy::Local => write!(f, "local"),
            ResolveStrategy::GitTag => write!(f, "git-tag"),
        }
    }
}

/// A package managed by the distribution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    /// Unique package name
    pub name: String,
    /// Category, if the package is listed in one of the category lists
    pub category: Option<Category>,
    /// Repository URL, if the package has a repository in the repos list
    pub repo_url: Option<String>,
    /// Currently pinned version
    pub pinned: VersionTuple,
    /// Explicit minimum-required version
    pub min_version: Option<VersionTuple>,
    /// Resolution strategy for the actual version
    pub strategy: ResolveStrategy,
    /// Packages this one depends on
    pub depends: Vec<String>,
}

impl Package {
    /// Creates a package with only a name and pinned version
    pub fn new(name: impl Into<String>, pinned: VersionTuple) -> Self {
        Self {
            name: name.into(),
            category: None,
            repo_url: None,
            pinned,
            min_version: None,
            strategy: ResolveStrategy::default(),
            depends: Vec::new(),
        }
    }

    /// Minimum-required version, defaulting to the pinned version
    pub fn effective_min(&self) -> &VersionTuple {
        self.min_version.as_ref().unwrap_or(&self.pinned)
    }

    /// Returns true for distribution (wpilib) packages
    pub fn is_distribution(&self) -> bool {
        self.category == Some(Category::Wpilib)
    }
}
