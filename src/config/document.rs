//! On-disk shape of the configuration document
//!
//! Maps are `IndexMap`s so that key order within every section survives a
//! load/serialize cycle.

use crate::error::ConfigError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Sections every document must have
const REQUIRED_SECTIONS: &[&str] = &["versions", "min_versions", "params"];

/// The configuration document as written by maintainers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigDocument {
    /// Pinned version of every package
    pub versions: IndexMap<String, String>,
    /// Minimum version dependents must require
    pub min_versions: IndexMap<String, String>,
    /// Orchestration parameters
    pub params: ParamsDocument,
    /// Per-package resolution strategy overrides
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub overrides: IndexMap<String, String>,
    /// Declared dependencies between managed packages
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub depends: IndexMap<String, Vec<String>>,
    /// Repository directory name to package name, where they differ
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub repo_names: IndexMap<String, String>,
}

/// The `[params]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParamsDocument {
    /// Version ceiling for non-distribution packages
    pub max_version: String,
    /// Artifact index base URL
    pub artifact_url: String,
    /// Artifact release identifier
    pub artifact_release: String,
    /// Distribution packages
    pub wpilib_packages: Vec<String>,
    /// Pure packages
    #[serde(default)]
    pub pure_packages: Vec<String>,
    /// Vendor packages
    #[serde(default)]
    pub vendor_packages: Vec<String>,
    /// Meta-package depending on everything
    pub meta_package: String,
    /// Repository URLs in processing order
    pub repos: Vec<String>,
    /// Release branch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    /// Version-declaration file inside each repository
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_file: Option<String>,
    /// Native library version written into distribution packages' downloads
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wpilib_bin_version: Option<String>,
    /// Uploaded files a release needs before it counts as published
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_release_files: Option<usize>,
}

impl ConfigDocument {
    /// Parse a TOML document
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let table: toml::Table = content.parse().map_err(|e: toml::de::Error| {
            ConfigError::Parse {
                message: e.to_string(),
            }
        })?;

        for section in REQUIRED_SECTIONS {
            if !table.contains_key(*section) {
                return Err(ConfigError::MissingSection {
                    section: section.to_string(),
                });
            }
        }

        table.try_into().map_err(|e: toml::de::Error| ConfigError::Parse {
            message: e.to_string(),
        })
    }

    /// Render as TOML
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string(self).map_err(|e| ConfigError::Serialize {
            message: e.to_string(),
        })
    }
}
