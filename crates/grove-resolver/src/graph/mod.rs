//! Dependency graph implementation using petgraph
//!
//! Built from a resolved [`CatalogIndex`]; provides cycle detection and
//! the dependencies-first order in which package configs are published.
//! Cycles are legal in a closure: the members of one are published together.

use dashmap::DashMap;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;

use grove_core::error::GroveError;
use grove_core::types::{CatalogIndex, Package, PackageVersionId};

use crate::ResolverResult;

/// Node in the dependency graph representing a resolved package
#[derive(Debug, Clone)]
pub struct PackageNode {
    pub id: PackageVersionId,
    pub package: Package,
}

/// Dependency graph over resolved packages
#[derive(Debug)]
pub struct DependencyGraph {
    /// Edges point from a package to its dependency
    graph: DiGraph<PackageNode, ()>,
    /// Map from Package to NodeIndex for fast lookups
    node_map: DashMap<Package, NodeIndex>,
}

impl DependencyGraph {
    /// Create a new empty dependency graph
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            node_map: DashMap::new(),
        }
    }

    /// Graph of every entry and its in-index dependencies
    pub fn from_index(index: &CatalogIndex) -> Self {
        let mut graph = Self::new();
        for entry in index.entries() {
            graph.add_package(PackageNode {
                id: entry.id,
                package: entry.package.clone(),
            });
        }
        for entry in index.entries() {
            for dependency in index.dependencies_of(entry) {
                // both endpoints were added above
                let _ = graph.add_dependency(&entry.package, &dependency.package);
            }
        }
        graph
    }
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl DependencyGraph {
    /// Add a package node; an existing node for the same package is reused
    pub fn add_package(&mut self, node: PackageNode) -> NodeIndex {
        if let Some(existing_index) = self.node_map.get(&node.package) {
            return *existing_index;
        }

        let package = node.package.clone();
        let node_index = self.graph.add_node(node);
        self.node_map.insert(package, node_index);

        node_index
    }

    /// Add dependency edge between two packages
    pub fn add_dependency(&mut self, from: &Package, to: &Package) -> ResolverResult<()> {
        let from_index = *self.node_map.get(from).ok_or_else(|| GroveError::UnknownProject {
            path: from.to_string(),
        })?;
        let to_index = *self.node_map.get(to).ok_or_else(|| GroveError::UnknownProject {
            path: to.to_string(),
        })?;

        self.graph.add_edge(from_index, to_index, ());
        Ok(())
    }

    /// Detect cycles in the dependency graph
    pub fn detect_cycles(&self) -> Result<(), Vec<Package>> {
        use petgraph::algo::toposort;

        match toposort(&self.graph, None) {
            Ok(_) => Ok(()),
            Err(cycle_node) => Err(self.extract_cycle_path(cycle_node.node_id())),
        }
    }

    /// Follow first edges from a node known to be on a cycle until a node repeats
    fn extract_cycle_path(&self, start_node: NodeIndex) -> Vec<Package> {
        let mut path: Vec<NodeIndex> = Vec::new();
        let mut current = start_node;

        loop {
            if let Some(pos) = path.iter().position(|&n| n == current) {
                return path[pos..]
                    .iter()
                    .filter_map(|&n| self.graph.node_weight(n))
                    .map(|node| node.package.clone())
                    .collect();
            }
            path.push(current);

            // Prefer an edge that stays on a cycle; any edge back into the path does
            let next = self
                .graph
                .edges(current)
                .map(|e| e.target())
                .find(|t| path.contains(t) || self.reaches(*t, current))
                .or_else(|| self.graph.edges(current).next().map(|e| e.target()));
            match next {
                Some(node) => current = node,
                None => break,
            }
        }

        path.iter()
            .filter_map(|&n| self.graph.node_weight(n))
            .map(|node| node.package.clone())
            .collect()
    }

    fn reaches(&self, from: NodeIndex, to: NodeIndex) -> bool {
        petgraph::algo::has_path_connecting(&self.graph, from, to, None)
    }

    /// Format cycle as "a -> b -> c -> a"
    pub fn format_cycle(cycle: &[Package]) -> String {
        if cycle.is_empty() {
            return "No cycle".to_string();
        }

        let mut names: Vec<String> = cycle.iter().map(|p| p.to_string()).collect();
        // Close the cycle by adding the first element at the end
        names.push(names[0].clone());
        names.join(" -> ")
    }

    /// Check for cycles and return detailed error if found
    pub fn validate_no_cycles(&self) -> ResolverResult<()> {
        self.detect_cycles()
            .map_err(|cycle| GroveError::CircularDependency {
                cycle: Self::format_cycle(&cycle),
            })
    }

    /// Packages ordered so every package follows all of its dependencies.
    ///
    /// Members of a cycle cannot all follow each other; they are emitted
    /// next to each other, after everything the cycle depends on.
    pub fn publication_order(&self) -> Vec<Package> {
        use petgraph::algo::tarjan_scc;

        // components come out dependencies first
        tarjan_scc(&self.graph)
            .into_iter()
            .flat_map(|component| {
                let mut members: Vec<Package> = component
                    .into_iter()
                    .filter_map(|idx| self.graph.node_weight(idx))
                    .map(|node| node.package.clone())
                    .collect();
                members.sort();
                members
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grove_core::types::CatalogEntry;

    fn package(name: &str) -> Package {
        Package::new(format!("org.test.{}", name).parse().unwrap(), "1.0.0".parse().unwrap())
    }

    fn graph_of(names: &[&str], edges: &[(usize, usize)]) -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        for (i, name) in names.iter().enumerate() {
            graph.add_package(PackageNode {
                id: i as PackageVersionId,
                package: package(name),
            });
        }
        for &(from, to) in edges {
            graph
                .add_dependency(&package(names[from]), &package(names[to]))
                .unwrap();
        }
        graph
    }

    #[test]
    fn test_dependency_graph_creation() {
        let graph = DependencyGraph::new();
        assert!(graph.publication_order().is_empty());
        assert!(graph.detect_cycles().is_ok());
    }

    #[test]
    fn test_add_package() {
        let mut graph = DependencyGraph::new();
        let node = PackageNode {
            id: 1,
            package: package("zlib"),
        };

        let node_index = graph.add_package(node.clone());
        assert_eq!(graph.publication_order(), vec![package("zlib")]);

        // Adding same package again should return same index
        let node_index2 = graph.add_package(node);
        assert_eq!(node_index, node_index2);
        assert_eq!(graph.publication_order().len(), 1);
    }

    #[test]
    fn test_add_dependency_missing_package() {
        let mut graph = DependencyGraph::new();
        let result = graph.add_dependency(&package("app"), &package("zlib"));
        assert!(matches!(result, Err(GroveError::UnknownProject { .. })));
    }

    #[test]
    fn test_cycle_detection_no_cycle() {
        let graph = graph_of(&["a", "b", "c"], &[(0, 1), (1, 2)]);
        assert!(graph.detect_cycles().is_ok());
        assert!(graph.validate_no_cycles().is_ok());
    }

    #[test]
    fn test_cycle_detection_with_cycle() {
        // a -> b -> c -> a, plus a tail d -> a
        let graph = graph_of(&["a", "b", "c", "d"], &[(0, 1), (1, 2), (2, 0), (3, 0)]);

        let cycle = graph.detect_cycles().unwrap_err();
        assert_eq!(cycle.len(), 3);
        assert!(!cycle.contains(&package("d")));

        let err = graph.validate_no_cycles().unwrap_err();
        match err {
            GroveError::CircularDependency { cycle } => {
                assert_eq!(cycle.matches(" -> ").count(), 3);
                assert!(cycle.contains("org.test.a-1.0.0"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_self_dependency_is_cycle() {
        let graph = graph_of(&["a"], &[(0, 0)]);
        let err = graph.validate_no_cycles().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Circular dependency detected: org.test.a-1.0.0 -> org.test.a-1.0.0"
        );
    }

    #[test]
    fn test_publication_order_puts_dependencies_first() {
        // a -> b, a -> c, b -> c
        let graph = graph_of(&["a", "b", "c"], &[(0, 1), (0, 2), (1, 2)]);
        let order = graph.publication_order();

        let pos = |name: &str| order.iter().position(|p| *p == package(name)).unwrap();
        assert!(pos("c") < pos("b"));
        assert!(pos("b") < pos("a"));
    }

    #[test]
    fn test_publication_order_keeps_cycles() {
        // app -> a -> b -> a, b -> zlib
        let graph = graph_of(&["app", "a", "b", "zlib"], &[(0, 1), (1, 2), (2, 1), (2, 3)]);
        let order = graph.publication_order();

        assert_eq!(order.len(), 4);
        let pos = |name: &str| order.iter().position(|p| *p == package(name)).unwrap();
        assert!(pos("zlib") < pos("a"));
        assert!(pos("zlib") < pos("b"));
        assert_eq!(pos("a").abs_diff(pos("b")), 1);
        assert_eq!(pos("app"), 3);
    }

    #[test]
    fn test_from_index() {
        let index: CatalogIndex = vec![
            CatalogEntry::new(1, package("app"), "h1").with_dependencies([2]),
            CatalogEntry::new(2, package("zlib"), "h2"),
        ]
        .into_iter()
        .collect();

        let graph = DependencyGraph::from_index(&index);
        assert!(graph.validate_no_cycles().is_ok());
        assert_eq!(graph.publication_order(), vec![package("zlib"), package("app")]);
    }
}
