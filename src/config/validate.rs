//! Non-fatal consistency checks over a loaded configuration

use super::{repo_dir_name, Config, DependencyGraph};
use crate::domain::VersionTuple;
use std::collections::HashMap;
use std::fmt;

/// A consistency problem found by [`Config::validate`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsistencyError {
    /// Minimum version is above the pinned version
    MinAbovePinned {
        package: String,
        min: VersionTuple,
        pinned: VersionTuple,
    },
    /// A list references a package with no `[versions]` entry
    OrphanedReference { list: String, package: String },
    /// The same package appears in more than one category list
    MultipleCategories { package: String },
    /// The same repository is listed twice
    DuplicateRepo { url: String },
    /// Two repository URLs map to the same package
    DuplicateRepoPackage { package: String },
    /// A repository's package is in no category list
    Uncategorized { package: String, url: String },
    /// A non-distribution package is pinned at or above the ceiling
    AboveCeiling {
        package: String,
        pinned: VersionTuple,
        max: VersionTuple,
    },
    /// Declared dependencies form a cycle
    DependencyCycle { packages: Vec<String> },
    /// A package is processed before one of its dependencies
    OrderViolation { package: String, dependency: String },
    /// The meta-package is not the last repository
    MetaNotLast { meta: String },
}

impl fmt::Display for ConsistencyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsistencyError::MinAbovePinned {
                package,
                min,
                pinned,
            } => write!(
                f,
                "{}: min version {} is greater than pinned version {}",
                package, min, pinned
            ),
            ConsistencyError::OrphanedReference { list, package } => {
                write!(f, "{} references '{}' which has no version", list, package)
            }
            ConsistencyError::MultipleCategories { package } => {
                write!(f, "{}: listed in more than one category", package)
            }
            ConsistencyError::DuplicateRepo { url } => write!(f, "duplicate repo {}", url),
            ConsistencyError::DuplicateRepoPackage { package } => {
                write!(f, "{}: more than one repo maps to this package", package)
            }
            ConsistencyError::Uncategorized { package, url } => {
                write!(f, "{} ({}): not in any category list", package, url)
            }
            ConsistencyError::AboveCeiling {
                package,
                pinned,
                max,
            } => write!(
                f,
                "{}: pinned version {} is not below max_version {}",
                package, pinned, max
            ),
            ConsistencyError::DependencyCycle { packages } => {
                write!(f, "dependency cycle: {}", packages.join(" -> "))
            }
            ConsistencyError::OrderViolation {
                package,
                dependency,
            } => write!(
                f,
                "{} is listed before its dependency {} in repos",
                package, dependency
            ),
            ConsistencyError::MetaNotLast { meta } => {
                write!(f, "meta package {} must be the last repo", meta)
            }
        }
    }
}

impl Config {
    /// Check the configuration for inconsistencies that do not prevent loading
    pub fn validate(&self) -> Vec<ConsistencyError> {
        let mut errors = Vec::new();

        for pkg in self.packages.values() {
            if let Some(min) = &pkg.min_version {
                if min.cmp_padded(&pkg.pinned).is_gt() {
                    errors.push(ConsistencyError::MinAbovePinned {
                        package: pkg.name.clone(),
                        min: min.clone(),
                        pinned: pkg.pinned.clone(),
                    });
                }
            }
        }

        let mut seen_category: HashMap<&str, usize> = HashMap::new();
        for (category, list) in self.params.category_lists() {
            for name in list {
                if !self.packages.contains_key(name) {
                    errors.push(ConsistencyError::OrphanedReference {
                        list: category.list_key().to_string(),
                        package: name.clone(),
                    });
                }
                let count = seen_category.entry(name.as_str()).or_default();
                *count += 1;
                // report once, on the second listing
                if *count == 2 {
                    errors.push(ConsistencyError::MultipleCategories {
                        package: name.clone(),
                    });
                }
            }
        }
        if !self.packages.contains_key(&self.params.meta_package) {
            errors.push(ConsistencyError::OrphanedReference {
                list: "meta_package".to_string(),
                package: self.params.meta_package.clone(),
            });
        }

        let mut seen_urls: Vec<&str> = Vec::new();
        let mut seen_names: Vec<&str> = Vec::new();
        for url in &self.params.repos {
            let normalized = url.trim_end_matches('/').trim_end_matches(".git");
            if seen_urls.contains(&normalized) {
                errors.push(ConsistencyError::DuplicateRepo { url: url.clone() });
                continue;
            }
            seen_urls.push(normalized);

            let name = self.package_for_repo(url);
            if seen_names.contains(&name) {
                errors.push(ConsistencyError::DuplicateRepoPackage {
                    package: name.to_string(),
                });
            }
            seen_names.push(name);

            match self.packages.get(name) {
                None => errors.push(ConsistencyError::OrphanedReference {
                    list: "repos".to_string(),
                    package: name.to_string(),
                }),
                Some(pkg) if pkg.category.is_none() && name != self.params.meta_package => {
                    errors.push(ConsistencyError::Uncategorized {
                        package: name.to_string(),
                        url: repo_dir_name(url).to_string(),
                    })
                }
                Some(_) => {}
            }
        }

        for pkg in self.packages.values() {
            if !pkg.is_distribution() && !pkg.pinned.cmp_padded(&self.params.max_version).is_lt() {
                errors.push(ConsistencyError::AboveCeiling {
                    package: pkg.name.clone(),
                    pinned: pkg.pinned.clone(),
                    max: self.params.max_version.clone(),
                });
            }
        }

        let graph = DependencyGraph::from_config(self);
        for cycle in graph.cycles() {
            errors.push(ConsistencyError::DependencyCycle { packages: cycle });
        }
        let order = self.repo_order();
        for (package, dependency) in graph.order_violations(&order) {
            errors.push(ConsistencyError::OrderViolation {
                package,
                dependency,
            });
        }

        if order.last().map(String::as_str) != Some(self.params.meta_package.as_str()) {
            errors.push(ConsistencyError::MetaNotLast {
                meta: self.params.meta_package.clone(),
            });
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::SAMPLE;

    fn sample() -> Config {
        Config::parse(SAMPLE).unwrap()
    }

    #[test]
    fn test_sample_is_consistent() {
        assert_eq!(sample().validate(), Vec::new());
    }

    #[test]
    fn test_min_above_pinned() {
        let mut config = sample();
        config.packages["robotpy-rev"].min_version = Some(VersionTuple::new([2023, 2, 0, 0]));
        let errors = config.validate();
        assert!(errors.contains(&ConsistencyError::MinAbovePinned {
            package: "robotpy-rev".to_string(),
            min: VersionTuple::new([2023, 2, 0, 0]),
            pinned: VersionTuple::new([2023, 1, 3, 0]),
        }));
    }

    #[test]
    fn test_orphaned_category_reference() {
        let mut config = sample();
        config.params.vendor_packages.push("robotpy-navx".to_string());
        assert!(config
            .validate()
            .contains(&ConsistencyError::OrphanedReference {
                list: "vendor_packages".to_string(),
                package: "robotpy-navx".to_string(),
            }));
    }

    #[test]
    fn test_multiple_categories() {
        let mut config = sample();
        config.params.pure_packages.push("robotpy-rev".to_string());
        let errors = config.validate();
        let count = errors
            .iter()
            .filter(|e| matches!(e, ConsistencyError::MultipleCategories { .. }))
            .count();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_duplicate_repo() {
        let mut config = sample();
        config
            .params
            .repos
            .insert(1, "https://github.com/robotpy/robotpy-wpiutil.git".to_string());
        assert!(config
            .validate()
            .iter()
            .any(|e| matches!(e, ConsistencyError::DuplicateRepo { .. })));
    }

    #[test]
    fn test_uncategorized_repo() {
        let mut config = sample();
        config.params.vendor_packages.clear();
        config.packages["robotpy-rev"].category = None;
        assert!(config
            .validate()
            .contains(&ConsistencyError::Uncategorized {
                package: "robotpy-rev".to_string(),
                url: "robotpy-rev".to_string(),
            }));
    }

    #[test]
    fn test_above_ceiling() {
        let mut config = sample();
        config.packages["robotpy-rev"].pinned = VersionTuple::new([2024, 0, 0, 0]);
        assert!(config
            .validate()
            .iter()
            .any(|e| matches!(e, ConsistencyError::AboveCeiling { package, .. } if package == "robotpy-rev")));
    }

    #[test]
    fn test_order_violation_and_meta_last() {
        let mut config = sample();
        config.params.repos.swap(0, 1);
        config.params.repos.swap(3, 4);
        let errors = config.validate();
        assert!(errors.contains(&ConsistencyError::OrderViolation {
            package: "robotpy-wpinet".to_string(),
            dependency: "robotpy-wpiutil".to_string(),
        }));
        assert!(errors.contains(&ConsistencyError::MetaNotLast {
            meta: "robotpy".to_string(),
        }));
    }

    #[test]
    fn test_display_messages() {
        let err = ConsistencyError::DependencyCycle {
            packages: vec!["a".to_string(), "b".to_string()],
        };
        assert_eq!(err.to_string(), "dependency cycle: a -> b");
    }
}
