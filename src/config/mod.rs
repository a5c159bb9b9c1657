//! Typed configuration model
//!
//! This module provides:
//! - Loading a `ConfigDocument` into a validated `Config`
//! - Serializing a `Config` back into a document (key order preserved)
//! - Non-fatal consistency checks (`validate`)
//! - Dependency graph checks over the declared `[depends]` table

mod document;
mod graph;
mod validate;

pub use document::{ConfigDocument, ParamsDocument};
pub use graph::DependencyGraph;
pub use validate::ConsistencyError;

use crate::domain::{Category, Package, ResolveStrategy, VersionTuple};
use crate::error::ConfigError;
use indexmap::IndexMap;
use std::fs;
use std::path::Path;

/// Default release branch
pub const DEFAULT_BRANCH: &str = "main";

/// Default version-declaration file inside each repository
pub const DEFAULT_VERSION_FILE: &str = "pyproject.toml";

/// Global orchestration parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Params {
    /// Version ceiling for non-distribution packages
    pub max_version: VersionTuple,
    /// Artifact index base URL
    pub artifact_url: String,
    /// Artifact release identifier
    pub artifact_release: String,
    /// Distribution packages, in declaration order
    pub wpilib_packages: Vec<String>,
    /// Pure packages
    pub pure_packages: Vec<String>,
    /// Vendor packages
    pub vendor_packages: Vec<String>,
    /// Meta-package name
    pub meta_package: String,
    /// Repository URLs in strict processing order
    pub repos: Vec<String>,
    /// Release branch, if not the default
    pub branch: Option<String>,
    /// Version-declaration file, if not the default
    pub version_file: Option<String>,
    /// Native library version for distribution packages' downloads
    pub wpilib_bin_version: Option<String>,
    /// Uploaded files a release needs before it counts as published
    pub min_release_files: Option<usize>,
}

impl Params {
    /// Release branch name
    pub fn branch(&self) -> &str {
        self.branch.as_deref().unwrap_or(DEFAULT_BRANCH)
    }

    /// Version-declaration file name
    pub fn version_file(&self) -> &str {
        self.version_file.as_deref().unwrap_or(DEFAULT_VERSION_FILE)
    }

    /// Uploaded files a release needs before it counts as published
    pub fn min_release_files(&self) -> usize {
        self.min_release_files.unwrap_or(1)
    }

    /// Category lists paired with their category
    pub fn category_lists(&self) -> [(Category, &[String]); 3] {
        [
            (Category::Wpilib, self.wpilib_packages.as_slice()),
            (Category::Pure, self.pure_packages.as_slice()),
            (Category::Vendor, self.vendor_packages.as_slice()),
        ]
    }
}

/// Directory name of a repository URL: its last path segment without `.git`
pub fn repo_dir_name(url: &str) -> &str {
    let trimmed = url.trim_end_matches('/');
    let last = trimmed.rsplit(['/', ':']).next().unwrap_or(trimmed);
    last.strip_suffix(".git").unwrap_or(last)
}

/// Keys of the per-package sections in the order the document declared them
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SectionOrder {
    /// `[overrides]` keys, including explicit `"index"` entries
    pub overrides: Vec<String>,
    /// `[depends]` keys
    pub depends: Vec<String>,
}

/// The loaded configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Packages keyed by name, in `[versions]` order
    pub packages: IndexMap<String, Package>,
    /// `[min_versions]` as declared; may name packages that are not managed
    pub min_versions: IndexMap<String, VersionTuple>,
    /// Global parameters
    pub params: Params,
    /// Repository directory names that differ from their package name
    pub repo_names: IndexMap<String, String>,
    /// Declared key order of `[overrides]` and `[depends]`
    pub section_order: SectionOrder,
}

fn parse_version(key: String, value: &str) -> Result<VersionTuple, ConfigError> {
    value.parse().map_err(|e: crate::domain::ParseVersionError| ConfigError::InvalidVersion {
        key,
        value: value.to_string(),
        message: e.reason,
    })
}

impl Config {
    /// Build a `Config` from a parsed document
    pub fn load(doc: &ConfigDocument) -> Result<Self, ConfigError> {
        let mut packages = IndexMap::new();
        for (name, raw) in &doc.versions {
            let pinned = parse_version(format!("versions.{}", name), raw)?;
            packages.insert(name.clone(), Package::new(name.clone(), pinned));
        }

        let mut min_versions = IndexMap::new();
        for (name, raw) in &doc.min_versions {
            let min = parse_version(format!("min_versions.{}", name), raw)?;
            if let Some(pkg) = packages.get_mut(name) {
                pkg.min_version = Some(min.clone());
            }
            min_versions.insert(name.clone(), min);
        }

        let p = &doc.params;
        let params = Params {
            max_version: parse_version("params.max_version".to_string(), &p.max_version)?,
            artifact_url: p.artifact_url.clone(),
            artifact_release: p.artifact_release.clone(),
            wpilib_packages: p.wpilib_packages.clone(),
            pure_packages: p.pure_packages.clone(),
            vendor_packages: p.vendor_packages.clone(),
            meta_package: p.meta_package.clone(),
            repos: p.repos.clone(),
            branch: p.branch.clone(),
            version_file: p.version_file.clone(),
            wpilib_bin_version: p.wpilib_bin_version.clone(),
            min_release_files: p.min_release_files,
        };

        // Category lists: first list wins, duplicates are reported by validate()
        for (category, list) in params.category_lists() {
            for name in list {
                let pkg = packages
                    .get_mut(name)
                    .ok_or_else(|| ConfigError::UnknownPackage {
                        list: category.list_key().to_string(),
                        package: name.clone(),
                    })?;
                if pkg.category.is_none() {
                    pkg.category = Some(category);
                }
            }
        }

        if !packages.contains_key(&params.meta_package) {
            return Err(ConfigError::UnknownPackage {
                list: "meta_package".to_string(),
                package: params.meta_package.clone(),
            });
        }

        for url in &params.repos {
            let dir = repo_dir_name(url);
            let name = doc.repo_names.get(dir).map(String::as_str).unwrap_or(dir);
            let pkg = packages
                .get_mut(name)
                .ok_or_else(|| ConfigError::UnknownPackage {
                    list: "repos".to_string(),
                    package: name.to_string(),
                })?;
            if pkg.repo_url.is_none() {
                pkg.repo_url = Some(url.clone());
            }
        }

        for (name, raw) in &doc.overrides {
            let strategy = match raw.as_str() {
                "index" => ResolveStrategy::Index,
                "local" => ResolveStrategy::Local,
                "git-tag" => ResolveStrategy::GitTag,
                _ => {
                    return Err(ConfigError::InvalidOverride {
                        package: name.clone(),
                        value: raw.clone(),
                    })
                }
            };
            let pkg = packages
                .get_mut(name)
                .ok_or_else(|| ConfigError::UnknownPackage {
                    list: "overrides".to_string(),
                    package: name.clone(),
                })?;
            pkg.strategy = strategy;
        }

        for (name, deps) in &doc.depends {
            for dep in deps {
                if !packages.contains_key(dep) {
                    return Err(ConfigError::UnknownPackage {
                        list: format!("depends.{}", name),
                        package: dep.clone(),
                    });
                }
            }
            let pkg = packages
                .get_mut(name)
                .ok_or_else(|| ConfigError::UnknownPackage {
                    list: "depends".to_string(),
                    package: name.clone(),
                })?;
            pkg.depends = deps.clone();
        }

        Ok(Self {
            packages,
            min_versions,
            params,
            repo_names: doc.repo_names.clone(),
            section_order: SectionOrder {
                overrides: doc.overrides.keys().cloned().collect(),
                depends: doc.depends.keys().cloned().collect(),
            },
        })
    }

    /// Parse and load TOML text
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Self::load(&ConfigDocument::parse(content)?)
    }

    /// Read and load a configuration file
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Convert back into a document
    pub fn serialize(&self) -> ConfigDocument {
        let versions = self
            .packages
            .iter()
            .map(|(name, pkg)| (name.clone(), pkg.pinned.to_string()))
            .collect();
        let min_versions = self
            .min_versions
            .iter()
            .map(|(name, v)| (name.clone(), v.to_string()))
            .collect();
        // Declared keys keep their place; packages changed in memory follow
        let mut overrides: IndexMap<String, String> = IndexMap::new();
        for name in &self.section_order.overrides {
            if let Some(pkg) = self.packages.get(name) {
                overrides.insert(name.clone(), pkg.strategy.to_string());
            }
        }
        for pkg in self.packages.values() {
            if pkg.strategy != ResolveStrategy::default() && !overrides.contains_key(&pkg.name) {
                overrides.insert(pkg.name.clone(), pkg.strategy.to_string());
            }
        }

        let mut depends: IndexMap<String, Vec<String>> = IndexMap::new();
        for name in &self.section_order.depends {
            if let Some(pkg) = self.packages.get(name) {
                depends.insert(name.clone(), pkg.depends.clone());
            }
        }
        for pkg in self.packages.values() {
            if !pkg.depends.is_empty() && !depends.contains_key(&pkg.name) {
                depends.insert(pkg.name.clone(), pkg.depends.clone());
            }
        }

        let p = &self.params;
        ConfigDocument {
            versions,
            min_versions,
            params: ParamsDocument {
                max_version: p.max_version.to_string(),
                artifact_url: p.artifact_url.clone(),
                artifact_release: p.artifact_release.clone(),
                wpilib_packages: p.wpilib_packages.clone(),
                pure_packages: p.pure_packages.clone(),
                vendor_packages: p.vendor_packages.clone(),
                meta_package: p.meta_package.clone(),
                repos: p.repos.clone(),
                branch: p.branch.clone(),
                version_file: p.version_file.clone(),
                wpilib_bin_version: p.wpilib_bin_version.clone(),
                min_release_files: p.min_release_files,
            },
            overrides,
            depends,
            repo_names: self.repo_names.clone(),
        }
    }

    /// Render as TOML text
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        self.serialize().to_toml_string()
    }

    /// Write the configuration to a file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = self.to_toml_string()?;
        fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Look up a package
    pub fn package(&self, name: &str) -> Option<&Package> {
        self.packages.get(name)
    }

    /// Package name for a repository URL
    pub fn package_for_repo<'a>(&'a self, url: &'a str) -> &'a str {
        let dir = repo_dir_name(url);
        self.repo_names.get(dir).map(String::as_str).unwrap_or(dir)
    }

    /// Names of repository packages in strict processing order
    pub fn repo_order(&self) -> Vec<String> {
        let mut order: Vec<String> = Vec::with_capacity(self.params.repos.len());
        for url in &self.params.repos {
            let name = self.package_for_repo(url);
            if !order.iter().any(|n| n == name) {
                order.push(name.to_string());
            }
        }
        order
    }

    /// Repo-ordered names, truncated before `until` when given
    pub fn repo_order_until(&self, until: Option<&str>) -> Option<Vec<String>> {
        let order = self.repo_order();
        match until {
            None => Some(order),
            Some(stop) => {
                let pos = order.iter().position(|n| n == stop)?;
                Some(order[..pos].to_vec())
            }
        }
    }

    /// Set the pinned version of a package; returns false for unknown packages
    pub fn set_pinned(&mut self, name: &str, version: VersionTuple) -> bool {
        match self.packages.get_mut(name) {
            Some(pkg) => {
                pkg.pinned = version;
                true
            }
            None => false,
        }
    }

    /// Copy of this configuration with the given pinned versions substituted
    pub fn with_pinned(&self, pinned: &IndexMap<String, VersionTuple>) -> Self {
        let mut copy = self.clone();
        for (name, version) in pinned {
            copy.set_pinned(name, version.clone());
        }
        copy
    }

    /// Pinned versions keyed by package name
    pub fn pinned_versions(&self) -> IndexMap<String, VersionTuple> {
        self.packages
            .iter()
            .map(|(name, pkg)| (name.clone(), pkg.pinned.clone()))
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const SAMPLE: &str = r#"
[versions]
robotpy-wpiutil = "2023.4.3.0"
robotpy-wpinet = "2023.4.3.0"
robotpy-commands-v2 = "2023.4.3.0"
robotpy-rev = "2023.1.3.0"
robotpy = "2023.4.3.1"

[min_versions]
robotpy-wpiutil = "2023.4.3.0"
robotpy-wpinet = "2023.4.0.0"
pyntcore = "2023.1.0.0"

[params]
max_version = "2024.0.0"
artifact_url = "https://pypi.org/pypi"
artifact_release = "2023"
wpilib_packages = ["robotpy-wpiutil", "robotpy-wpinet"]
pure_packages = ["robotpy-commands-v2"]
vendor_packages = ["robotpy-rev"]
meta_package = "robotpy"
repos = [
    "https://github.com/robotpy/robotpy-wpiutil",
    "https://github.com/robotpy/robotpy-wpinet.git",
    "https://github.com/robotpy/robotpy-commands-v2",
    "https://github.com/robotpy/robotpy-rev",
    "https://github.com/robotpy/robotpy-meta",
]

[overrides]
robotpy-commands-v2 = "local"

[depends]
robotpy-wpinet = ["robotpy-wpiutil"]
robotpy-commands-v2 = ["robotpy-wpiutil"]

[repo_names]
robotpy-meta = "robotpy"
"#;

    #[test]
    fn test_load_sample() {
        let config = Config::parse(SAMPLE).unwrap();
        assert_eq!(config.packages.len(), 5);

        let wpiutil = config.package("robotpy-wpiutil").unwrap();
        assert_eq!(wpiutil.pinned, VersionTuple::new([2023, 4, 3, 0]));
        assert_eq!(wpiutil.category, Some(Category::Wpilib));
        assert_eq!(
            wpiutil.repo_url.as_deref(),
            Some("https://github.com/robotpy/robotpy-wpiutil")
        );

        let commands = config.package("robotpy-commands-v2").unwrap();
        assert_eq!(commands.strategy, ResolveStrategy::Local);
        assert_eq!(commands.category, Some(Category::Pure));
        assert_eq!(commands.depends, vec!["robotpy-wpiutil"]);

        let meta = config.package("robotpy").unwrap();
        assert_eq!(
            meta.repo_url.as_deref(),
            Some("https://github.com/robotpy/robotpy-meta")
        );
        assert!(meta.category.is_none());
    }

    #[test]
    fn test_min_version_defaults_to_pinned() {
        let config = Config::parse(SAMPLE).unwrap();
        let rev = config.package("robotpy-rev").unwrap();
        assert!(rev.min_version.is_none());
        assert_eq!(rev.effective_min(), &rev.pinned);
        assert!(config.min_versions.contains_key("pyntcore"));
    }

    #[test]
    fn test_repo_order() {
        let config = Config::parse(SAMPLE).unwrap();
        assert_eq!(
            config.repo_order(),
            vec![
                "robotpy-wpiutil",
                "robotpy-wpinet",
                "robotpy-commands-v2",
                "robotpy-rev",
                "robotpy"
            ]
        );
    }

    #[test]
    fn test_repo_order_until() {
        let config = Config::parse(SAMPLE).unwrap();
        assert_eq!(
            config.repo_order_until(Some("robotpy-commands-v2")).unwrap(),
            vec!["robotpy-wpiutil", "robotpy-wpinet"]
        );
        assert!(config.repo_order_until(Some("nope")).is_none());
        assert_eq!(config.repo_order_until(None).unwrap().len(), 5);
    }

    #[test]
    fn test_repo_dir_name() {
        assert_eq!(repo_dir_name("https://github.com/org/repo"), "repo");
        assert_eq!(repo_dir_name("https://github.com/org/repo.git"), "repo");
        assert_eq!(repo_dir_name("https://github.com/org/repo/"), "repo");
        assert_eq!(repo_dir_name("git@github.com:org/repo.git"), "repo");
        assert_eq!(repo_dir_name("/srv/git/repo"), "repo");
    }

    #[test]
    fn test_invalid_version_is_fatal() {
        let content = SAMPLE.replace("robotpy-rev = \"2023.1.3.0\"", "robotpy-rev = \"2023.1.x\"");
        match Config::parse(&content) {
            Err(ConfigError::InvalidVersion { key, value, .. }) => {
                assert_eq!(key, "versions.robotpy-rev");
                assert_eq!(value, "2023.1.x");
            }
            other => panic!("expected InvalidVersion, got {:?}", other),
        }
    }

    #[test]
    fn test_category_reference_without_version_is_fatal() {
        let content = SAMPLE.replace(
            "vendor_packages = [\"robotpy-rev\"]",
            "vendor_packages = [\"robotpy-rev\", \"robotpy-navx\"]",
        );
        match Config::parse(&content) {
            Err(ConfigError::UnknownPackage { list, package }) => {
                assert_eq!(list, "vendor_packages");
                assert_eq!(package, "robotpy-navx");
            }
            other => panic!("expected UnknownPackage, got {:?}", other),
        }
    }

    #[test]
    fn test_repo_without_version_is_fatal() {
        let content = SAMPLE.replace(
            "    \"https://github.com/robotpy/robotpy-meta\",\n",
            "    \"https://github.com/robotpy/robotpy-meta\",\n    \"https://github.com/robotpy/mystery\",\n",
        );
        assert!(matches!(
            Config::parse(&content),
            Err(ConfigError::UnknownPackage { list, .. }) if list == "repos"
        ));
    }

    #[test]
    fn test_invalid_override() {
        let content = SAMPLE.replace("robotpy-commands-v2 = \"local\"", "robotpy-commands-v2 = \"magic\"");
        assert!(matches!(
            Config::parse(&content),
            Err(ConfigError::InvalidOverride { .. })
        ));
    }

    #[test]
    fn test_round_trip() {
        let config = Config::parse(SAMPLE).unwrap();
        let text = config.to_toml_string().unwrap();
        let reloaded = Config::parse(&text).unwrap();
        assert_eq!(reloaded, config);

        let keys: Vec<_> = reloaded.packages.keys().cloned().collect();
        let original: Vec<_> = config.packages.keys().cloned().collect();
        assert_eq!(keys, original);
        let min_keys: Vec<_> = reloaded.min_versions.keys().cloned().collect();
        assert_eq!(min_keys, vec!["robotpy-wpiutil", "robotpy-wpinet", "pyntcore"]);
    }

    #[test]
    fn test_round_trip_keeps_section_order() {
        let content = SAMPLE
            .replace(
                "[overrides]\nrobotpy-commands-v2 = \"local\"\n",
                "[overrides]\nrobotpy-rev = \"git-tag\"\nrobotpy-wpiutil = \"index\"\nrobotpy-commands-v2 = \"local\"\n",
            )
            .replace(
                "[depends]\nrobotpy-wpinet = [\"robotpy-wpiutil\"]\nrobotpy-commands-v2 = [\"robotpy-wpiutil\"]\n",
                "[depends]\nrobotpy-commands-v2 = [\"robotpy-wpiutil\"]\nrobotpy-wpinet = [\"robotpy-wpiutil\"]\n",
            );
        let config = Config::parse(&content).unwrap();
        let doc = config.serialize();

        let overrides: Vec<_> = doc.overrides.keys().map(String::as_str).collect();
        assert_eq!(
            overrides,
            vec!["robotpy-rev", "robotpy-wpiutil", "robotpy-commands-v2"]
        );
        assert_eq!(doc.overrides["robotpy-wpiutil"], "index");
        let depends: Vec<_> = doc.depends.keys().map(String::as_str).collect();
        assert_eq!(depends, vec!["robotpy-commands-v2", "robotpy-wpinet"]);

        let reloaded = Config::parse(&config.to_toml_string().unwrap()).unwrap();
        assert_eq!(reloaded, config);
    }

    #[test]
    fn test_serialize_appends_new_overrides() {
        let mut config = Config::parse(SAMPLE).unwrap();
        config.packages["robotpy-wpiutil"].strategy = ResolveStrategy::GitTag;
        let doc = config.serialize();
        let overrides: Vec<_> = doc.overrides.keys().map(String::as_str).collect();
        assert_eq!(overrides, vec!["robotpy-commands-v2", "robotpy-wpiutil"]);
    }

    #[test]
    fn test_set_pinned_and_with_pinned() {
        let mut config = Config::parse(SAMPLE).unwrap();
        assert!(config.set_pinned("robotpy-rev", VersionTuple::new([2023, 1, 4, 0])));
        assert!(!config.set_pinned("ghost", VersionTuple::new([1])));

        let mut pins = IndexMap::new();
        pins.insert("robotpy".to_string(), VersionTuple::new([2023, 4, 3, 2]));
        let copy = config.with_pinned(&pins);
        assert_eq!(
            copy.package("robotpy").unwrap().pinned,
            VersionTuple::new([2023, 4, 3, 2])
        );
        assert_eq!(
            config.package("robotpy").unwrap().pinned,
            VersionTuple::new([2023, 4, 3, 1])
        );
    }

    #[test]
    fn test_params_defaults() {
        let config = Config::parse(SAMPLE).unwrap();
        assert_eq!(config.params.branch(), "main");
        assert_eq!(config.params.version_file(), "pyproject.toml");
        assert_eq!(config.params.min_release_files(), 1);
        assert!(config.params.wpilib_bin_version.is_none());
    }
}
