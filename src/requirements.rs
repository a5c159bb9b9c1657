//! Requirement propagation across the distribution's repositories
//!
//! Walks the repositories in release order and brings each project's
//! requirements in line with `[min_versions]` and `max_version`. A package
//! that cannot be updated is reported and the walk continues, since each
//! update is a local commit that is never pushed.

use crate::config::Config;
use crate::error::{PlanError, RepoError};
use crate::planner::Mode;
use crate::repo::{RepoRegistry, RequirementEdit, RequirementPolicy};
use serde::Serialize;
use tracing::{debug, warn};

/// Edits made, or proposed, for one package
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectReport {
    pub package: String,
    pub edits: Vec<RequirementEdit>,
    /// Whether the edits were committed
    pub committed: bool,
}

#[derive(Debug, Default)]
pub struct RequirementsReport {
    /// Packages with edits, in release order
    pub projects: Vec<ProjectReport>,
    pub failures: Vec<RepoError>,
}

impl RequirementsReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Update the requirements of every repository before `until`
///
/// Working copies must already exist; missing ones are reported as failures.
pub async fn propagate_requirements(
    config: &Config,
    registry: &RepoRegistry,
    mode: Mode,
    until: Option<&str>,
) -> Result<RequirementsReport, PlanError> {
    let order = config
        .repo_order_until(until)
        .ok_or_else(|| PlanError::NotInRepos {
            package: until.unwrap_or_default().to_string(),
        })?;
    let commit = mode == Mode::Commit;

    let mut report = RequirementsReport::default();
    for package in order {
        let is_wpilib = config.params.wpilib_packages.contains(&package);
        let policy = RequirementPolicy {
            min_versions: &config.min_versions,
            max_version: &config.params.max_version,
            lib_version: config
                .params
                .wpilib_bin_version
                .as_deref()
                .filter(|_| is_wpilib),
        };
        match registry.update_requirements(&package, &policy, commit).await {
            Ok(edits) if edits.is_empty() => {
                debug!(package = %package, "requirements up to date");
            }
            Ok(edits) => report.projects.push(ProjectReport {
                package,
                edits,
                committed: commit,
            }),
            Err(e) => {
                warn!(package = %package, error = %e, "requirement update failed");
                report.failures.push(e);
            }
        }
    }
    Ok(report)
}
