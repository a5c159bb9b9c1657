//! Update planning
//!
//! Sync plans move pinned versions to the resolved actual versions. Release
//! plans move pinned versions to maintainer targets and require a release
//! for each change. Both are computed the same way in preview and commit
//! mode; commit mode only adds [`UpdatePlanner::apply`] persisting the result.

use crate::config::Config;
use crate::domain::{PackageChange, Plan, VersionTuple};
use crate::error::{ConfigError, PlanError, ResolutionError};
use crate::resolver::ResolverSet;
use indexmap::IndexMap;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Whether a run persists what it computes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Compute and report only
    Preview,
    /// Compute, apply and persist
    Commit,
}

impl Mode {
    /// Commit when the flag is set, preview otherwise
    pub fn from_flag(commit: bool) -> Self {
        if commit {
            Mode::Commit
        } else {
            Mode::Preview
        }
    }
}

/// A sync plan plus the packages that could not be resolved
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    pub plan: Plan,
    pub failures: Vec<ResolutionError>,
}

/// Package names in plan order: repos order first, then packages without
/// a repository in configuration order
fn plan_order(config: &Config) -> Vec<String> {
    let mut order = config.repo_order();
    for name in config.packages.keys() {
        if !order.contains(name) {
            order.push(name.clone());
        }
    }
    order
}

/// Pin-only changes for every package whose actual version differs from its pin
pub fn diff_pins(config: &Config, actual: &IndexMap<String, VersionTuple>) -> Plan {
    let mut plan = Plan::new();
    for name in plan_order(config) {
        let (Some(pkg), Some(version)) = (config.package(&name), actual.get(&name)) else {
            continue;
        };
        if !version.same_release(&pkg.pinned) {
            plan.push(PackageChange::pin_only(
                name,
                pkg.pinned.clone(),
                version.clone(),
            ));
        }
    }
    plan
}

/// Release changes for every target that differs from the current pin
///
/// Only packages up to (not including) `until` in repos order are planned.
pub fn compute_release_plan(
    config: &Config,
    desired: &IndexMap<String, VersionTuple>,
    until: Option<&str>,
) -> Result<Plan, PlanError> {
    let all = config.repo_order();
    for name in desired.keys() {
        if config.package(name).is_none() {
            return Err(PlanError::UnknownPackage {
                package: name.clone(),
            });
        }
        if !all.contains(name) {
            return Err(PlanError::NotInRepos {
                package: name.clone(),
            });
        }
    }
    let order = config
        .repo_order_until(until)
        .ok_or_else(|| PlanError::NotInRepos {
            package: until.unwrap_or_default().to_string(),
        })?;

    let mut plan = Plan::new();
    for name in order {
        let (Some(pkg), Some(target)) = (config.package(&name), desired.get(&name)) else {
            continue;
        };
        if target.same_release(&pkg.pinned) {
            continue;
        }
        if target <= &pkg.pinned {
            return Err(PlanError::NotMonotonic {
                package: name,
                current: pkg.pinned.clone(),
                target: target.clone(),
            });
        }
        plan.push(PackageChange::release(
            name,
            pkg.pinned.clone(),
            target.clone(),
        ));
    }
    Ok(plan)
}

/// Release plan for publishing pinned versions that have not been tagged
///
/// `released` holds each repository's last release tag. The tags are the
/// baseline and the pinned versions are the targets. Packages listed in
/// `unpublished` are tagged at their pin but missing from the index; they
/// are planned again with an unchanged version so the push is retried.
pub fn compute_publish_plan(
    config: &Config,
    released: &IndexMap<String, Option<VersionTuple>>,
    unpublished: &[String],
    until: Option<&str>,
) -> Result<Plan, PlanError> {
    let mut baseline = IndexMap::new();
    let mut desired = IndexMap::new();
    for (name, tag) in released {
        let pkg = config.package(name).ok_or_else(|| PlanError::UnknownPackage {
            package: name.clone(),
        })?;
        let tag = tag.clone().unwrap_or_else(|| VersionTuple::new([0]));
        if tag.cmp_padded(&pkg.pinned).is_gt() {
            return Err(PlanError::Regression {
                package: name.clone(),
                released: tag,
                pinned: pkg.pinned.clone(),
            });
        }
        baseline.insert(name.clone(), tag);
        desired.insert(name.clone(), pkg.pinned.clone());
    }

    let base = config.with_pinned(&baseline);
    let releases = compute_release_plan(&base, &desired, until)?;

    let mut plan = Plan::new();
    for name in base.repo_order_until(until).unwrap_or_default() {
        if let Some(change) = releases.get(&name) {
            plan.push(change.clone());
        } else if unpublished.contains(&name) {
            if let Some(pkg) = config.package(&name) {
                plan.push(PackageChange::release(
                    name,
                    pkg.pinned.clone(),
                    pkg.pinned.clone(),
                ));
            }
        }
    }
    Ok(plan)
}

/// Computes plans and applies them to a configuration
pub struct UpdatePlanner {
    resolvers: Arc<ResolverSet>,
    jobs: usize,
}

impl UpdatePlanner {
    pub fn new(resolvers: Arc<ResolverSet>, jobs: usize) -> Self {
        Self { resolvers, jobs }
    }

    /// Resolve every package and diff the results against the pins
    pub async fn compute_sync_plan(&self, config: &Config) -> SyncOutcome {
        let resolutions = Arc::clone(&self.resolvers)
            .resolve_all(config, self.jobs)
            .await;
        SyncOutcome {
            plan: diff_pins(config, &resolutions.resolved),
            failures: resolutions.failures,
        }
    }

    /// Apply a plan's new versions to the configuration and, in commit
    /// mode, write it out; returns whether anything was written
    pub fn apply(
        config: &mut Config,
        plan: &Plan,
        mode: Mode,
        path: &Path,
    ) -> Result<bool, ConfigError> {
        if mode == Mode::Preview || plan.is_empty() {
            return Ok(false);
        }
        for change in plan.iter() {
            config.set_pinned(&change.package, change.new_version.clone());
        }
        config.save(path)?;
        info!(path = %path.display(), changes = plan.len(), "configuration updated");
        Ok(true)
    }
}
