//! PyPI-style JSON index source
//!
//! Endpoints, relative to the configured base URL:
//! - `{base}/{package}/json` lists every release and its files
//! - `{base}/{package}/{version}/json` describes one release

use crate::domain::VersionTuple;
use crate::error::ResolutionError;
use crate::registry::{HttpClient, VersionSource};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

/// Version Source backed by a PyPI-compatible JSON API
pub struct PyPIIndex {
    client: HttpClient,
    /// Files a release needs before it counts as published
    min_files: usize,
}

/// Package metadata response
#[derive(Debug, Deserialize)]
struct PackageResponse {
    /// Release files keyed by version
    releases: HashMap<String, Vec<ReleaseFile>>,
}

/// Single release response
#[derive(Debug, Deserialize)]
struct ReleaseResponse {
    /// Files of this release
    #[serde(default)]
    urls: Vec<ReleaseFile>,
}

/// Release file information
#[derive(Debug, Deserialize)]
struct ReleaseFile {
    /// Set when the file was pulled from the index
    #[serde(default)]
    yanked: bool,
}

impl PyPIIndex {
    /// Create a new index source
    pub fn new(client: HttpClient) -> Self {
        Self {
            client,
            min_files: 1,
        }
    }

    /// Require at least `min_files` uploaded files before a release counts
    pub fn with_min_files(mut self, min_files: usize) -> Self {
        self.min_files = min_files.max(1);
        self
    }

    fn package_url(base_url: &str, package: &str) -> String {
        format!("{}/{}/json", base_url.trim_end_matches('/'), package)
    }

    fn release_url(base_url: &str, package: &str, version: &VersionTuple) -> String {
        format!("{}/{}/{}/json", base_url.trim_end_matches('/'), package, version)
    }

    fn live_files(&self, files: &[ReleaseFile]) -> bool {
        files.iter().filter(|f| !f.yanked).count() >= self.min_files
    }
}

#[async_trait]
impl VersionSource for PyPIIndex {
    fn name(&self) -> &'static str {
        "PyPI"
    }

    async fn published_versions(
        &self,
        base_url: &str,
        package: &str,
    ) -> Result<Vec<VersionTuple>, ResolutionError> {
        let url = Self::package_url(base_url, package);
        let response: PackageResponse = self.client.get_json(&url, package, self.name()).await?;

        let mut versions = Vec::new();
        for (raw, files) in &response.releases {
            if !self.live_files(files) {
                continue;
            }
            // Pre-releases and other non-numeric versions are not candidates
            match raw.parse::<VersionTuple>() {
                Ok(version) => versions.push(version),
                Err(e) => debug!(package, version = %raw, error = %e, "skipping version"),
            }
        }
        versions.sort_by(|a, b| a.cmp_padded(b));
        Ok(versions)
    }

    async fn is_published(
        &self,
        base_url: &str,
        package: &str,
        version: &VersionTuple,
    ) -> Result<bool, ResolutionError> {
        let url = Self::release_url(base_url, package, version);
        let response: Option<ReleaseResponse> = self
            .client
            .get_json_optional(&url, package, self.name())
            .await?;
        Ok(response.is_some_and(|r| self.live_files(&r.urls)))
    }
}
