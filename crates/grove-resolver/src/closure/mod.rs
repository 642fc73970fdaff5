//! Transitive closure of requested packages over the local mirror.
//!
//! Every visited package is recorded once, keyed by `(path, version)`; a
//! package already in the visited map is neither re-queried nor
//! re-descended, which also terminates dependency cycles. The visited map
//! is finally flattened into an id-indexed [`CatalogIndex`].

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use grove_core::error::GroveError;
use grove_core::types::{
    CatalogEntry, CatalogIndex, Flags, Package, PackageVersionId, ProjectPath, ProjectType, Version,
};
use indexmap::IndexMap;
use tracing::debug;

use crate::matching::{match_version, MatchedVersion};
use crate::mirror::{MirrorStore, ProjectRow};
use crate::ResolverResult;

#[derive(Debug)]
struct Visited {
    id: PackageVersionId,
    package: Package,
    hash: String,
    dependencies: BTreeSet<Package>,
}

/// Builds a [`CatalogIndex`] from a [`MirrorStore`]
pub struct ClosureBuilder<'a, S: MirrorStore + ?Sized> {
    store: &'a S,
    /// Rows created after this instant are too young to trust
    young_cutoff: Option<DateTime<Utc>>,
    queries: HashMap<(ProjectPath, Version), Package>,
    visited: IndexMap<Package, Visited>,
}

impl<'a, S: MirrorStore + ?Sized> ClosureBuilder<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            young_cutoff: None,
            queries: HashMap::new(),
            visited: IndexMap::new(),
        }
    }

    pub fn with_young_cutoff(mut self, cutoff: DateTime<Utc>) -> Self {
        self.young_cutoff = Some(cutoff);
        self
    }

    /// Resolve `requested` and everything it depends on
    pub fn build(mut self, requested: &[Package]) -> ResolverResult<CatalogIndex> {
        let store = self.store;
        for request in requested {
            if request.is_local() {
                continue;
            }

            let project = store
                .project(&request.path)
                .ok_or_else(|| GroveError::UnknownProject {
                    path: request.path.to_string(),
                })?;

            let resolved = if project.kind == ProjectType::RootProject {
                self.expand_root(project, &request.version)?
            } else {
                vec![self.visit(project, &request.version, Flags::empty())?]
            };

            for package in resolved {
                if let Some(node) = self.visited.get_mut(&package) {
                    node.package.flags |= Flags::DIRECT_DEPENDENCY;
                }
            }
        }

        Ok(self.flatten())
    }

    /// Resolve every library and executable below a root aggregate.
    ///
    /// Children without a matching version are skipped; the aggregate
    /// fails only when none of them match.
    fn expand_root(&mut self, root: &ProjectRow, spec: &Version) -> ResolverResult<Vec<Package>> {
        let store = self.store;
        let children = store.children(&root.path);
        if children.is_empty() {
            return Err(GroveError::EmptyRootProject {
                path: root.path.to_string(),
            });
        }

        let mut resolved = Vec::new();
        for child in children {
            match self.visit(child, spec, Flags::empty()) {
                Ok(package) => resolved.push(package),
                Err(e) if e.is_no_such_version() => {
                    debug!("Skipping {}: {}", child.path, e);
                }
                Err(e) => return Err(e),
            }
        }

        if resolved.is_empty() {
            return Err(GroveError::NoMatchingVersion {
                project: root.path.to_string(),
                version: spec.to_any_version(),
            });
        }
        Ok(resolved)
    }

    /// Resolve one project and descend into its dependencies
    fn visit(&mut self, project: &ProjectRow, spec: &Version, edge_flags: Flags) -> ResolverResult<Package> {
        let store = self.store;
        let key = (project.path.clone(), spec.clone());
        if let Some(package) = self.queries.get(&key) {
            return Ok(package.clone());
        }

        let matched = match_version(project, store.versions(project.id), spec)?;
        self.check_age(&project.path, &matched)?;

        let package = Package::new(project.path.clone(), matched.version.clone())
            .with_flags(matched.flags | edge_flags);
        self.queries.insert(key, package.clone());

        if self.visited.contains_key(&package) {
            return Ok(package);
        }
        // Recorded before descending so cycles stop here
        self.visited.insert(
            package.clone(),
            Visited {
                id: matched.id,
                package: package.clone(),
                hash: matched.hash,
                dependencies: BTreeSet::new(),
            },
        );

        let mut dependencies = BTreeSet::new();
        for row in store.dependencies(matched.id) {
            let dependency = store
                .project_by_id(row.project_dependency_id)
                .ok_or_else(|| GroveError::UnknownProject {
                    path: format!("#{}", row.project_dependency_id),
                })?;
            dependencies.insert(self.visit(dependency, &row.version_spec, row.flags)?);
        }

        if let Some(node) = self.visited.get_mut(&package) {
            node.dependencies = dependencies;
        }
        Ok(package)
    }

    fn check_age(&self, path: &ProjectPath, matched: &MatchedVersion) -> ResolverResult<()> {
        match (self.young_cutoff, matched.created) {
            (Some(cutoff), Some(created)) if created > cutoff => Err(GroveError::YoungPackage {
                package: format!("{}-{}", path, matched.version),
            }),
            _ => Ok(()),
        }
    }

    fn flatten(self) -> CatalogIndex {
        let ids: HashMap<&Package, PackageVersionId> =
            self.visited.values().map(|v| (&v.package, v.id)).collect();

        self.visited
            .values()
            .map(|node| {
                CatalogEntry::new(node.id, node.package.clone(), node.hash.clone())
                    .with_dependencies(node.dependencies.iter().filter_map(|d| ids.get(d).copied()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mirror::tests::SnapshotBuilder;
    use crate::mirror::JsonMirror;
    use chrono::Duration;

    fn request(path: &str, version: &str) -> Package {
        Package::new(path.parse().unwrap(), version.parse().unwrap())
    }

    fn find<'i>(index: &'i CatalogIndex, path: &str) -> &'i CatalogEntry {
        index
            .entries()
            .find(|e| e.package.path.to_string() == path)
            .unwrap()
    }

    /// app 1.0.0 -> bar 2.*, bar 2.1.5 -> baz *
    fn mirror() -> JsonMirror {
        SnapshotBuilder::new()
            .library(1, "org.x.app")
            .library(2, "org.x.bar")
            .project(3, "org.x.baz", ProjectType::Library, Flags::HEADER_ONLY)
            .version_with_id(10, 1, "1.0.0", "h-app")
            .version_with_id(20, 2, "2.0.0", "h-bar-200")
            .version_with_id(21, 2, "2.1.5", "h-bar-215")
            .version_with_id(30, 3, "0.9.1", "h-baz")
            .dependency(10, 2, "2", Flags::PRIVATE_DEPENDENCY)
            .dependency(21, 3, "*", Flags::empty())
            .build()
    }

    #[test]
    fn test_closure_picks_highest_matching_dependency() {
        let index = ClosureBuilder::new(&mirror())
            .build(&[request("org.x.app", "1")])
            .unwrap();

        assert_eq!(index.len(), 3);
        let app = find(&index, "org.x.app");
        let bar = find(&index, "org.x.bar");
        let baz = find(&index, "org.x.baz");

        assert_eq!(bar.package.version, Version::new(2, 1, 5));
        assert_eq!(bar.id, 21);
        assert_eq!(bar.hash, "h-bar-215");
        assert_eq!(app.dependencies, BTreeSet::from([21]));
        assert_eq!(bar.dependencies, BTreeSet::from([30]));
        assert!(index.dangling_dependencies().is_empty());

        // direct only at the request point
        assert!(app.package.is_direct());
        assert!(!bar.package.is_direct());
        // edge and project flags travel with the package
        assert!(bar.package.flags.contains(Flags::PRIVATE_DEPENDENCY));
        assert!(baz.package.flags.contains(Flags::HEADER_ONLY));
    }

    #[test]
    fn test_transitive_package_requested_directly_is_direct() {
        let index = ClosureBuilder::new(&mirror())
            .build(&[request("org.x.app", "*"), request("org.x.bar", "2.1")])
            .unwrap();
        assert_eq!(index.len(), 3);
        assert!(find(&index, "org.x.bar").package.is_direct());
        assert!(!find(&index, "org.x.baz").package.is_direct());
    }

    #[test]
    fn test_cycle_terminates() {
        let cyclic = SnapshotBuilder::new()
            .library(1, "org.x.a")
            .library(2, "org.x.b")
            .version_with_id(10, 1, "1.0.0", "ha")
            .version_with_id(20, 2, "1.0.0", "hb")
            .dependency(10, 2, "1", Flags::empty())
            .dependency(20, 1, "1.0", Flags::empty())
            .build();

        let index = ClosureBuilder::new(&cyclic)
            .build(&[request("org.x.a", "*")])
            .unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(find(&index, "org.x.b").dependencies, BTreeSet::from([10]));
    }

    #[test]
    fn test_unknown_project() {
        let err = ClosureBuilder::new(&mirror())
            .build(&[request("org.x.missing", "*")])
            .unwrap_err();
        assert!(matches!(err, GroveError::UnknownProject { .. }));
    }

    #[test]
    fn test_local_projects_are_skipped() {
        let local = request("org.x.missing", "*").with_flags(Flags::LOCAL_PROJECT);
        let index = ClosureBuilder::new(&mirror()).build(&[local]).unwrap();
        assert!(index.is_empty());
    }

    #[test]
    fn test_root_project_expands_to_children() {
        let mirror = SnapshotBuilder::new()
            .project(1, "org.x", ProjectType::RootProject, Flags::empty())
            .library(2, "org.x.core")
            .library(3, "org.x.extra")
            .project(4, "org.x.tool", ProjectType::Executable, Flags::empty())
            .version_with_id(20, 2, "1.2.0", "h2")
            .version_with_id(30, 3, "0.1.0", "h3")
            .version_with_id(40, 4, "1.0.0", "h4")
            .build();

        let index = ClosureBuilder::new(&mirror)
            .build(&[request("org.x", "1")])
            .unwrap();

        let paths: Vec<String> = index.entries().map(|e| e.package.path.to_string()).collect();
        assert_eq!(paths, vec!["org.x.core", "org.x.tool"]);
        assert!(index.entries().all(|e| e.package.is_direct()));
    }

    #[test]
    fn test_root_project_without_match_or_children() {
        let mirror = SnapshotBuilder::new()
            .project(1, "org.x", ProjectType::RootProject, Flags::empty())
            .library(2, "org.x.core")
            .version_with_id(20, 2, "1.2.0", "h2")
            .project(5, "org.empty", ProjectType::RootProject, Flags::empty())
            .build();

        let err = ClosureBuilder::new(&mirror)
            .build(&[request("org.x", "3")])
            .unwrap_err();
        assert_eq!(err.to_string(), "No such version/branch '3' for project 'org.x'");

        let err = ClosureBuilder::new(&mirror)
            .build(&[request("org.empty", "*")])
            .unwrap_err();
        assert!(matches!(err, GroveError::EmptyRootProject { .. }));
    }

    #[test]
    fn test_young_rows_are_refused() {
        let mut builder = SnapshotBuilder::new()
            .library(1, "org.x.fresh")
            .version_with_id(10, 1, "1.0.0", "h");
        let now = Utc::now();
        builder.last_version_mut().created = Some(now - Duration::minutes(5));
        let mirror = builder.build();

        let err = ClosureBuilder::new(&mirror)
            .with_young_cutoff(now - Duration::minutes(30))
            .build(&[request("org.x.fresh", "*")])
            .unwrap_err();
        assert!(matches!(err, GroveError::YoungPackage { .. }));

        let index = ClosureBuilder::new(&mirror)
            .with_young_cutoff(now - Duration::minutes(1))
            .build(&[request("org.x.fresh", "*")])
            .unwrap();
        assert_eq!(index.len(), 1);
    }
}
