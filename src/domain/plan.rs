//! Change plans
//!
//! A plan is an ordered list of per-package version changes. Its order is
//! always the repos-list order of the configuration it was computed from.

use super::VersionTuple;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What applying a change involves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// Only the pinned version in the configuration moves
    PinOnly,
    /// The package repository must be bumped, tagged and pushed
    Release,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::PinOnly => write!(f, "pin-only"),
            ChangeKind::Release => write!(f, "release"),
        }
    }
}

/// A single package version change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageChange {
    /// Package name
    pub package: String,
    /// Version before the change
    pub old_version: VersionTuple,
    /// Version after the change
    pub new_version: VersionTuple,
    /// Pin update or release
    pub kind: ChangeKind,
}

impl PackageChange {
    /// Creates a pin-only change
    pub fn pin_only(package: impl Into<String>, old: VersionTuple, new: VersionTuple) -> Self {
        Self {
            package: package.into(),
            old_version: old,
            new_version: new,
            kind: ChangeKind::PinOnly,
        }
    }

    /// Creates a change that requires a release
    pub fn release(package: impl Into<String>, old: VersionTuple, new: VersionTuple) -> Self {
        Self {
            package: package.into(),
            old_version: old,
            new_version: new,
            kind: ChangeKind::Release,
        }
    }

    /// Returns true if this change requires a release
    pub fn requires_release(&self) -> bool {
        self.kind == ChangeKind::Release
    }
}

impl fmt::Display for PackageChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} -> {} ({})",
            self.package, self.old_version, self.new_version, self.kind
        )
    }
}

/// Ordered sequence of package changes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    /// Changes in processing order
    pub changes: Vec<PackageChange>,
}

impl Plan {
    /// Creates an empty plan
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a change
    pub fn push(&mut self, change: PackageChange) {
        self.changes.push(change);
    }

    /// Number of changes
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Returns true if nothing changes
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Iterates the changes in order
    pub fn iter(&self) -> impl Iterator<Item = &PackageChange> {
        self.changes.iter()
    }

    /// Looks up the change for a package
    pub fn get(&self, package: &str) -> Option<&PackageChange> {
        self.changes.iter().find(|c| c.package == package)
    }

    /// Package names in plan order
    pub fn package_names(&self) -> Vec<&str> {
        self.changes.iter().map(|c| c.package.as_str()).collect()
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for change in &self.changes {
            writeln!(f, "{}", change)?;
        }
        Ok(())
    }
}
