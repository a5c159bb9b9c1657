//! In-memory Version Source

use crate::domain::VersionTuple;
use crate::error::ResolutionError;
use crate::registry::VersionSource;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Version Source backed by a map, with scriptable failures
#[derive(Debug, Default)]
pub struct StaticIndex {
    state: Mutex<IndexState>,
}

#[derive(Debug, Default)]
struct IndexState {
    versions: HashMap<String, Vec<VersionTuple>>,
    failures: HashMap<String, ResolutionError>,
    /// Publication checks left before a pushed version shows up
    publish_delay: HashMap<String, usize>,
    lookups: Vec<String>,
}

impl StaticIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, IndexState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Builder form of [`StaticIndex::publish`]
    pub fn with(self, package: &str, version: &str) -> Self {
        self.publish(package, version);
        self
    }

    /// Mark a version as published; invalid version strings are ignored
    pub fn publish(&self, package: &str, version: &str) {
        if let Ok(version) = version.parse() {
            self.lock()
                .versions
                .entry(package.to_string())
                .or_default()
                .push(version);
        }
    }

    /// Make every lookup of the package fail
    pub fn fail(&self, package: &str, error: ResolutionError) {
        self.lock().failures.insert(package.to_string(), error);
    }

    /// Versions of the package appear only after `checks` publication checks
    pub fn delay_publication(&self, package: &str, checks: usize) {
        self.lock().publish_delay.insert(package.to_string(), checks);
    }

    /// Packages looked up so far, in call order
    pub fn lookups(&self) -> Vec<String> {
        self.lock().lookups.clone()
    }
}

#[async_trait]
impl VersionSource for StaticIndex {
    fn name(&self) -> &'static str {
        "static index"
    }

    async fn published_versions(
        &self,
        _base_url: &str,
        package: &str,
    ) -> Result<Vec<VersionTuple>, ResolutionError> {
        let mut state = self.lock();
        state.lookups.push(package.to_string());
        if let Some(err) = state.failures.get(package) {
            return Err(err.clone());
        }
        state
            .versions
            .get(package)
            .cloned()
            .ok_or_else(|| ResolutionError::not_found(package, "static index"))
    }

    async fn is_published(
        &self,
        _base_url: &str,
        package: &str,
        version: &VersionTuple,
    ) -> Result<bool, ResolutionError> {
        let mut state = self.lock();
        if let Some(err) = state.failures.get(package) {
            return Err(err.clone());
        }
        if let Some(remaining) = state.publish_delay.get_mut(package) {
            if *remaining > 0 {
                *remaining -= 1;
                return Ok(false);
            }
        }
        Ok(state
            .versions
            .get(package)
            .is_some_and(|vs| vs.iter().any(|v| v == version)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ReleaseFilter;

    #[tokio::test]
    async fn test_static_lookup() {
        let index = StaticIndex::new()
            .with("a", "1.0.0.0")
            .with("a", "1.0.0.1");
        let latest = index.lookup("", &ReleaseFilter::any(), "a").await.unwrap();
        assert_eq!(latest, VersionTuple::new([1, 0, 0, 1]));
        assert!(matches!(
            index.lookup("", &ReleaseFilter::any(), "b").await,
            Err(ResolutionError::NotFound { .. })
        ));
        assert_eq!(index.lookups(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_static_publication_delay() {
        let index = StaticIndex::new().with("a", "1.0");
        index.delay_publication("a", 1);
        let v = VersionTuple::new([1, 0]);
        assert!(!index.is_published("", "a", &v).await.unwrap());
        assert!(index.is_published("", "a", &v).await.unwrap());
    }
}
