//! Version Sources for resolving published package versions
//!
//! This module provides:
//! - HTTP client shared foundation with retry logic
//! - A PyPI-style JSON index source
//! - A static in-memory source for tests and offline runs

mod client;
mod pypi;
mod static_index;

pub use client::HttpClient;
pub use pypi::PyPIIndex;
pub use static_index::StaticIndex;

use crate::domain::VersionTuple;
use crate::error::ResolutionError;
use async_trait::async_trait;

/// Which published versions count as candidates
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseFilter {
    /// Only versions starting with these components (the release identifier)
    pub series: Option<VersionTuple>,
    /// Only versions strictly below this ceiling
    pub ceiling: Option<VersionTuple>,
}

impl ReleaseFilter {
    /// Accept every published version
    pub fn any() -> Self {
        Self::default()
    }

    /// Returns true if the version passes the filter
    pub fn accepts(&self, version: &VersionTuple) -> bool {
        let in_series = self.series.as_ref().is_none_or(|s| version.in_series(s));
        let below = self
            .ceiling
            .as_ref()
            .is_none_or(|c| version.cmp_padded(c).is_lt());
        in_series && below
    }

    /// Human-readable description, used in error messages
    pub fn describe(&self) -> String {
        match (&self.series, &self.ceiling) {
            (Some(s), Some(c)) => format!("{} (below {})", s, c),
            (Some(s), None) => s.to_string(),
            (None, Some(c)) => format!("below {}", c),
            (None, None) => "any".to_string(),
        }
    }
}

/// An artifact index that knows which versions of a package are published
#[async_trait]
pub trait VersionSource: Send + Sync {
    /// Name used in messages and logs
    fn name(&self) -> &'static str;

    /// Every version of the package that has published artifacts
    async fn published_versions(
        &self,
        base_url: &str,
        package: &str,
    ) -> Result<Vec<VersionTuple>, ResolutionError>;

    /// Whether a specific version has been published
    async fn is_published(
        &self,
        base_url: &str,
        package: &str,
        version: &VersionTuple,
    ) -> Result<bool, ResolutionError>;

    /// Latest published version passing the filter
    async fn lookup(
        &self,
        base_url: &str,
        filter: &ReleaseFilter,
        package: &str,
    ) -> Result<VersionTuple, ResolutionError> {
        let versions = self.published_versions(base_url, package).await?;
        latest_matching(versions, filter).ok_or_else(|| ResolutionError::NoMatchingRelease {
            package: package.to_string(),
            release: filter.describe(),
        })
    }
}

/// Highest version accepted by the filter
pub fn latest_matching(
    versions: impl IntoIterator<Item = VersionTuple>,
    filter: &ReleaseFilter,
) -> Option<VersionTuple> {
    versions
        .into_iter()
        .filter(|v| filter.accepts(v))
        .max_by(|a, b| a.cmp_padded(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> VersionTuple {
        s.parse().unwrap()
    }

    #[test]
    fn test_filter_series() {
        let filter = ReleaseFilter {
            series: Some(v("2023")),
            ceiling: None,
        };
        assert!(filter.accepts(&v("2023.4.3.0")));
        assert!(!filter.accepts(&v("2024.1.1.0")));
        assert!(!filter.accepts(&v("202.3")));
    }

    #[test]
    fn test_filter_ceiling() {
        let filter = ReleaseFilter {
            series: None,
            ceiling: Some(v("2024.0.0")),
        };
        assert!(filter.accepts(&v("2023.9.9.9")));
        assert!(!filter.accepts(&v("2024.0.0.0")));
        assert!(ReleaseFilter::any().accepts(&v("9999")));
    }

    #[test]
    fn test_latest_matching() {
        let versions = vec![v("2023.1.0.0"), v("2023.4.3.1"), v("2024.1.0.0"), v("2023.4.3.0")];
        let filter = ReleaseFilter {
            series: Some(v("2023")),
            ceiling: None,
        };
        assert_eq!(latest_matching(versions.clone(), &filter), Some(v("2023.4.3.1")));
        assert_eq!(latest_matching(versions, &ReleaseFilter::any()), Some(v("2024.1.0.0")));
        assert_eq!(latest_matching(Vec::new(), &filter), None);
    }

    #[test]
    fn test_filter_describe() {
        let filter = ReleaseFilter {
            series: Some(v("2023")),
            ceiling: Some(v("2024.0.0")),
        };
        assert_eq!(filter.describe(), "2023 (below 2024.0.0)");
        assert_eq!(ReleaseFilter::any().describe(), "any");
    }
}
