//! Actual-version resolution
//!
//! Each package resolves through the strategy its configuration selects:
//! the artifact index, the local checkout, or the last git tag. Failures are
//! collected per package so one bad lookup never hides the others.

use crate::config::{Config, Params};
use crate::domain::{Package, ResolveStrategy, VersionTuple};
use crate::error::ResolutionError;
use crate::registry::{ReleaseFilter, VersionSource};
use crate::repo::RepoRegistry;
use async_trait::async_trait;
use indexmap::IndexMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Resolves the actual version of a package
#[async_trait]
pub trait VersionResolver: Send + Sync {
    /// Resolve one package
    async fn resolve_actual(
        &self,
        package: &Package,
        params: &Params,
    ) -> Result<VersionTuple, ResolutionError>;
}

/// Asks the artifact index for the latest published version
pub struct IndexResolver {
    source: Arc<dyn VersionSource>,
}

impl IndexResolver {
    pub fn new(source: Arc<dyn VersionSource>) -> Self {
        Self { source }
    }

    /// Candidate filter for a package
    ///
    /// Distribution packages must be in the configured release series;
    /// everything else must stay below the version ceiling.
    pub fn filter_for(package: &Package, params: &Params) -> Result<ReleaseFilter, ResolutionError> {
        if package.is_distribution() {
            let series = params.artifact_release.parse().map_err(|e| {
                ResolutionError::malformed(
                    &package.name,
                    format!("invalid artifact_release '{}': {}", params.artifact_release, e),
                )
            })?;
            Ok(ReleaseFilter {
                series: Some(series),
                ceiling: None,
            })
        } else {
            Ok(ReleaseFilter {
                series: None,
                ceiling: Some(params.max_version.clone()),
            })
        }
    }
}

#[async_trait]
impl VersionResolver for IndexResolver {
    async fn resolve_actual(
        &self,
        package: &Package,
        params: &Params,
    ) -> Result<VersionTuple, ResolutionError> {
        let filter = Self::filter_for(package, params)?;
        debug!(package = %package.name, source = self.source.name(), "index lookup");
        self.source
            .lookup(&params.artifact_url, &filter, &package.name)
            .await
    }
}

/// Uses the locally declared minimum version without any lookup
pub struct LocalResolver;

#[async_trait]
impl VersionResolver for LocalResolver {
    async fn resolve_actual(
        &self,
        package: &Package,
        _params: &Params,
    ) -> Result<VersionTuple, ResolutionError> {
        Ok(package.effective_min().clone())
    }
}

/// Uses the last release tag of the package's working copy
pub struct TagResolver {
    registry: Arc<RepoRegistry>,
}

impl TagResolver {
    pub fn new(registry: Arc<RepoRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl VersionResolver for TagResolver {
    async fn resolve_actual(
        &self,
        package: &Package,
        _params: &Params,
    ) -> Result<VersionTuple, ResolutionError> {
        let local = |message: String| ResolutionError::Local {
            package: package.name.clone(),
            message,
        };
        self.registry
            .last_release(&package.name)
            .await
            .map_err(|e| local(e.to_string()))?
            .ok_or_else(|| local("no version tag found".to_string()))
    }
}

/// Outcome of resolving many packages
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolutions {
    /// Resolved versions in configuration order
    pub resolved: IndexMap<String, VersionTuple>,
    /// Per-package failures in configuration order
    pub failures: Vec<ResolutionError>,
}

/// One resolver per strategy
pub struct ResolverSet {
    index: IndexResolver,
    local: LocalResolver,
    tag: Option<TagResolver>,
}

impl ResolverSet {
    /// Resolvers for the index and local strategies
    pub fn new(source: Arc<dyn VersionSource>) -> Self {
        Self {
            index: IndexResolver::new(source),
            local: LocalResolver,
            tag: None,
        }
    }

    /// Enable the git-tag strategy
    pub fn with_registry(mut self, registry: Arc<RepoRegistry>) -> Self {
        self.tag = Some(TagResolver::new(registry));
        self
    }

    fn resolver_for(&self, package: &Package) -> Result<&dyn VersionResolver, ResolutionError> {
        match package.strategy {
            ResolveStrategy::Index => Ok(&self.index),
            ResolveStrategy::Local => Ok(&self.local),
            ResolveStrategy::GitTag => match &self.tag {
                Some(tag) => Ok(tag),
                None => Err(ResolutionError::Local {
                    package: package.name.clone(),
                    message: "git-tag resolution needs working copies".to_string(),
                }),
            },
        }
    }

    /// Resolve a single package through its configured strategy
    pub async fn resolve_actual(
        &self,
        package: &Package,
        params: &Params,
    ) -> Result<VersionTuple, ResolutionError> {
        self.resolver_for(package)?
            .resolve_actual(package, params)
            .await
    }

    /// Resolve every configured package with at most `jobs` lookups in flight
    pub async fn resolve_all(self: Arc<Self>, config: &Config, jobs: usize) -> Resolutions {
        let semaphore = Arc::new(Semaphore::new(jobs.max(1)));
        let params = Arc::new(config.params.clone());
        let mut set = JoinSet::new();

        for (index, package) in config.packages.values().cloned().enumerate() {
            let resolvers = Arc::clone(&self);
            let semaphore = Arc::clone(&semaphore);
            let params = Arc::clone(&params);
            set.spawn(async move {
                // The semaphore is never closed
                let _permit = semaphore.acquire_owned().await.ok();
                let result = resolvers.resolve_actual(&package, &params).await;
                (index, result)
            });
        }

        let mut results: Vec<Option<Result<VersionTuple, ResolutionError>>> =
            (0..config.packages.len()).map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, result)) => results[index] = Some(result),
                Err(e) => warn!(error = %e, "resolution task failed"),
            }
        }

        let mut resolutions = Resolutions::default();
        for (name, result) in config.packages.keys().zip(results) {
            match result {
                Some(Ok(version)) => {
                    debug!(package = %name, %version, "resolved");
                    resolutions.resolved.insert(name.clone(), version);
                }
                Some(Err(e)) => {
                    warn!(package = %name, error = %e, "resolution failed");
                    resolutions.failures.push(e);
                }
                None => resolutions.failures.push(ResolutionError::Local {
                    package: name.clone(),
                    message: "resolution task aborted".to_string(),
                }),
            }
        }
        resolutions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::SAMPLE;
    use crate::registry::StaticIndex;

    fn v(s: &str) -> VersionTuple {
        s.parse().unwrap()
    }

    fn index() -> Arc<StaticIndex> {
        Arc::new(
            StaticIndex::new()
                .with("robotpy-wpiutil", "2023.4.3.0")
                .with("robotpy-wpiutil", "2023.4.3.1")
                .with("robotpy-wpiutil", "2024.1.1.0")
                .with("robotpy-wpinet", "2023.4.3.0")
                .with("robotpy-rev", "2023.1.3.0")
                .with("robotpy-rev", "2024.0.0.0")
                .with("robotpy", "2023.4.3.1"),
        )
    }

    #[tokio::test]
    async fn test_distribution_package_uses_release_series() {
        let config = Config::parse(SAMPLE).unwrap();
        let resolvers = ResolverSet::new(index());
        let pkg = config.package("robotpy-wpiutil").unwrap();
        let actual = resolvers.resolve_actual(pkg, &config.params).await.unwrap();
        assert_eq!(actual, v("2023.4.3.1"));
    }

    #[tokio::test]
    async fn test_vendor_package_stays_below_ceiling() {
        let config = Config::parse(SAMPLE).unwrap();
        let resolvers = ResolverSet::new(index());
        let pkg = config.package("robotpy-rev").unwrap();
        let actual = resolvers.resolve_actual(pkg, &config.params).await.unwrap();
        assert_eq!(actual, v("2023.1.3.0"));
    }

    #[tokio::test]
    async fn test_local_override_makes_no_lookup() {
        let config = Config::parse(SAMPLE).unwrap();
        let source = index();
        let resolvers = ResolverSet::new(source.clone());
        let pkg = config.package("robotpy-commands-v2").unwrap();
        let actual = resolvers.resolve_actual(pkg, &config.params).await.unwrap();
        assert_eq!(&actual, pkg.effective_min());
        assert!(source.lookups().is_empty());
    }

    #[tokio::test]
    async fn test_git_tag_without_registry() {
        let mut config = Config::parse(SAMPLE).unwrap();
        config.packages["robotpy-rev"].strategy = ResolveStrategy::GitTag;
        let resolvers = ResolverSet::new(index());
        let pkg = config.package("robotpy-rev").unwrap();
        assert!(matches!(
            resolvers.resolve_actual(pkg, &config.params).await,
            Err(ResolutionError::Local { .. })
        ));
    }

    #[tokio::test]
    async fn test_resolve_all_collects_failures() {
        let config = Config::parse(SAMPLE).unwrap();
        let source = index();
        source.fail(
            "robotpy-wpinet",
            ResolutionError::network("robotpy-wpinet", "static index", "connection reset"),
        );
        let resolvers = Arc::new(ResolverSet::new(source));
        let result = resolvers.resolve_all(&config, 2).await;

        let names: Vec<_> = result.resolved.keys().cloned().collect();
        assert_eq!(
            names,
            vec!["robotpy-wpiutil", "robotpy-commands-v2", "robotpy-rev", "robotpy"]
        );
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].package(), "robotpy-wpinet");
    }

    #[test]
    fn test_filter_for_bad_release() {
        let mut config = Config::parse(SAMPLE).unwrap();
        config.params.artifact_release = "latest".to_string();
        let pkg = config.package("robotpy-wpiutil").unwrap();
        assert!(IndexResolver::filter_for(pkg, &config.params).is_err());
    }
}
