//! Declared dependency graph between managed packages
//!
//! - **Directed Graph**: `A → B` means "A depends on B"
//! - **Nodes**: package names
//! - **Algorithms**: Tarjan SCC for cycles, position checks against the repos order

use super::Config;
use petgraph::algo;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;

/// Dependency graph built from the `[depends]` table
pub struct DependencyGraph {
    graph: DiGraph<String, ()>,
    name_to_node: HashMap<String, NodeIndex>,
}

impl DependencyGraph {
    /// Build the graph for every package in the configuration
    pub fn from_config(config: &Config) -> Self {
        let mut graph = DiGraph::new();
        let mut name_to_node = HashMap::new();

        for name in config.packages.keys() {
            let idx = graph.add_node(name.clone());
            name_to_node.insert(name.clone(), idx);
        }

        for pkg in config.packages.values() {
            let from = name_to_node[&pkg.name];
            for dep in &pkg.depends {
                if let Some(&to) = name_to_node.get(dep) {
                    graph.add_edge(from, to, ());
                }
            }
        }

        Self {
            graph,
            name_to_node,
        }
    }

    /// Direct dependencies of a package
    pub fn dependencies(&self, name: &str) -> Vec<&str> {
        let Some(&idx) = self.name_to_node.get(name) else {
            return Vec::new();
        };
        let mut deps: Vec<&str> = self
            .graph
            .neighbors(idx)
            .map(|n| self.graph[n].as_str())
            .collect();
        deps.sort_unstable();
        deps
    }

    /// Groups of packages that depend on each other in a cycle
    pub fn cycles(&self) -> Vec<Vec<String>> {
        algo::tarjan_scc(&self.graph)
            .into_iter()
            .filter(|scc| {
                scc.len() > 1
                    || scc
                        .first()
                        .is_some_and(|&n| self.graph.contains_edge(n, n))
            })
            .map(|scc| {
                let mut names: Vec<String> =
                    scc.into_iter().map(|n| self.graph[n].clone()).collect();
                names.sort();
                names
            })
            .collect()
    }

    /// Pairs `(package, dependency)` where the dependency is processed after
    /// the package in the given order
    pub fn order_violations(&self, order: &[String]) -> Vec<(String, String)> {
        let position: HashMap<&str, usize> = order
            .iter()
            .enumerate()
            .map(|(i, name)| (name.as_str(), i))
            .collect();

        let mut violations = Vec::new();
        for (i, name) in order.iter().enumerate() {
            for dep in self.dependencies(name) {
                if let Some(&dep_pos) = position.get(dep) {
                    if dep_pos > i {
                        violations.push((name.clone(), dep.to_string()));
                    }
                }
            }
        }
        violations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Package, VersionTuple};

    fn config_with(deps: &[(&str, &[&str])]) -> Config {
        let mut config = Config::parse(crate::config::tests::SAMPLE).unwrap();
        for pkg in config.packages.values_mut() {
            pkg.depends.clear();
        }
        for (name, list) in deps {
            if !config.packages.contains_key(*name) {
                config.packages.insert(
                    name.to_string(),
                    Package::new(*name, VersionTuple::new([1])),
                );
            }
            config.packages[*name].depends = list.iter().map(|s| s.to_string()).collect();
        }
        config
    }

    #[test]
    fn test_no_cycles() {
        let config = config_with(&[("robotpy-wpinet", &["robotpy-wpiutil"])]);
        let graph = DependencyGraph::from_config(&config);
        assert!(graph.cycles().is_empty());
        assert_eq!(graph.dependencies("robotpy-wpinet"), vec!["robotpy-wpiutil"]);
        assert!(graph.dependencies("unknown").is_empty());
    }

    #[test]
    fn test_cycle_detected() {
        let config = config_with(&[
            ("robotpy-wpinet", &["robotpy-wpiutil"]),
            ("robotpy-wpiutil", &["robotpy-wpinet"]),
        ]);
        let graph = DependencyGraph::from_config(&config);
        let cycles = graph.cycles();
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0], vec!["robotpy-wpinet", "robotpy-wpiutil"]);
    }

    #[test]
    fn test_self_cycle_detected() {
        let config = config_with(&[("robotpy-rev", &["robotpy-rev"])]);
        let graph = DependencyGraph::from_config(&config);
        assert_eq!(graph.cycles(), vec![vec!["robotpy-rev".to_string()]]);
    }

    #[test]
    fn test_order_violations() {
        let config = config_with(&[("robotpy-wpiutil", &["robotpy-wpinet"])]);
        let graph = DependencyGraph::from_config(&config);
        let violations = graph.order_violations(&config.repo_order());
        assert_eq!(
            violations,
            vec![("robotpy-wpiutil".to_string(), "robotpy-wpinet".to_string())]
        );
    }
}
