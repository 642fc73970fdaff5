//! Local catalog mirror
//!
//! A periodically synced snapshot of the registry's three catalog tables
//! (projects, project versions, version dependencies) that answers version
//! and dependency queries without a network round trip.

mod sync;

pub use sync::MirrorSync;

use std::collections::HashMap;

use camino::Utf8Path;
use chrono::{DateTime, Utc};
use grove_core::error::GroveError;
use grove_core::types::{Flags, PackageVersionId, ProjectPath, ProjectType, Version};
use serde::{Deserialize, Serialize};

use crate::ResolverResult;

/// Snapshot layout this client understands
pub const MIRROR_SCHEMA_VERSION: u32 = 1;
/// Snapshot of the catalog tables
pub const CATALOG_FILE: &str = "catalog.json";
/// Monotonic data version published next to the snapshot
pub const VERSION_FILE: &str = "db.version";
/// RFC 3339 time of the last successful version check
pub const LAST_SYNC_FILE: &str = "last_sync";

pub type ProjectId = u64;

/// `Projects(id, path, type, flags)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRow {
    pub id: ProjectId,
    pub path: ProjectPath,
    #[serde(rename = "type")]
    pub kind: ProjectType,
    #[serde(default)]
    pub flags: Flags,
}

/// `ProjectVersions(id, project_id, major, minor, patch, branch, flags, sha256)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRow {
    pub id: PackageVersionId,
    pub project_id: ProjectId,
    #[serde(default)]
    pub major: Option<u32>,
    #[serde(default)]
    pub minor: Option<u32>,
    #[serde(default)]
    pub patch: Option<u32>,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub flags: Flags,
    pub sha256: String,
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
}

impl VersionRow {
    pub fn is_branch(&self) -> bool {
        self.branch.is_some()
    }

    pub fn version(&self) -> Version {
        match &self.branch {
            Some(name) => Version::Branch(name.clone()),
            None => Version::partial(self.major, self.minor, self.patch),
        }
    }
}

/// `ProjectVersionDependencies(project_version_id, project_dependency_id, version_spec, flags)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyRow {
    pub project_version_id: PackageVersionId,
    pub project_dependency_id: ProjectId,
    pub version_spec: Version,
    #[serde(default)]
    pub flags: Flags,
}

/// On-disk form of the mirror
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    pub schema_version: u32,
    #[serde(default)]
    pub projects: Vec<ProjectRow>,
    #[serde(default)]
    pub project_versions: Vec<VersionRow>,
    #[serde(default)]
    pub project_version_dependencies: Vec<DependencyRow>,
}

/// Reject snapshots written for another client generation
pub fn check_schema(found: u32) -> ResolverResult<()> {
    if found > MIRROR_SCHEMA_VERSION {
        return Err(GroveError::MirrorSchema {
            reason: format!(
                "client too old: mirror schema {} is newer than supported {}",
                found, MIRROR_SCHEMA_VERSION
            ),
        });
    }
    if found < MIRROR_SCHEMA_VERSION {
        return Err(GroveError::MirrorSchema {
            reason: format!(
                "server too old: mirror schema {} is older than required {}",
                found, MIRROR_SCHEMA_VERSION
            ),
        });
    }
    Ok(())
}

/// Query interface over the mirrored catalog tables
pub trait MirrorStore: Send + Sync {
    fn project(&self, path: &ProjectPath) -> Option<&ProjectRow>;

    fn project_by_id(&self, id: ProjectId) -> Option<&ProjectRow>;

    /// Library and executable projects below `root`, ordered by path
    fn children(&self, root: &ProjectPath) -> Vec<&ProjectRow>;

    fn versions(&self, project_id: ProjectId) -> &[VersionRow];

    /// Dependency rows of one version, ordered by dependency path
    fn dependencies(&self, version_id: PackageVersionId) -> Vec<&DependencyRow>;
}

/// In-memory index over a [`CatalogSnapshot`]
#[derive(Debug, Clone, Default)]
pub struct JsonMirror {
    projects: Vec<ProjectRow>,
    by_path: HashMap<ProjectPath, usize>,
    by_id: HashMap<ProjectId, usize>,
    versions: HashMap<ProjectId, Vec<VersionRow>>,
    dependencies: HashMap<PackageVersionId, Vec<DependencyRow>>,
}

impl JsonMirror {
    pub fn from_snapshot(snapshot: CatalogSnapshot) -> ResolverResult<Self> {
        check_schema(snapshot.schema_version)?;

        let mut mirror = Self::default();
        for project in snapshot.projects {
            let index = mirror.projects.len();
            mirror.by_path.insert(project.path.clone(), index);
            mirror.by_id.insert(project.id, index);
            mirror.projects.push(project);
        }
        for row in snapshot.project_versions {
            mirror.versions.entry(row.project_id).or_default().push(row);
        }
        for row in snapshot.project_version_dependencies {
            mirror
                .dependencies
                .entry(row.project_version_id)
                .or_default()
                .push(row);
        }
        Ok(mirror)
    }

    pub fn parse(content: &str) -> ResolverResult<Self> {
        let snapshot: CatalogSnapshot =
            serde_json::from_str(content).map_err(|e| GroveError::JsonParse {
                message: format!("Invalid mirror snapshot: {}", e),
            })?;
        Self::from_snapshot(snapshot)
    }

    /// Load `catalog.json` from a mirror directory
    pub fn open(dir: &Utf8Path) -> ResolverResult<Self> {
        let path = dir.join(CATALOG_FILE);
        let content = std::fs::read_to_string(&path)
            .map_err(|e| GroveError::io(format!("Failed to read {}", path), e))?;
        Self::parse(&content)
    }
}

impl MirrorStore for JsonMirror {
    fn project(&self, path: &ProjectPath) -> Option<&ProjectRow> {
        self.by_path.get(path).map(|&i| &self.projects[i])
    }

    fn project_by_id(&self, id: ProjectId) -> Option<&ProjectRow> {
        self.by_id.get(&id).map(|&i| &self.projects[i])
    }

    fn children(&self, root: &ProjectPath) -> Vec<&ProjectRow> {
        let mut children: Vec<&ProjectRow> = self
            .projects
            .iter()
            .filter(|p| p.kind.is_buildable() && root.is_root_of(&p.path))
            .collect();
        children.sort_by(|a, b| a.path.cmp(&b.path));
        children
    }

    fn versions(&self, project_id: ProjectId) -> &[VersionRow] {
        self.versions
            .get(&project_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    fn dependencies(&self, version_id: PackageVersionId) -> Vec<&DependencyRow> {
        let mut rows: Vec<&DependencyRow> = self
            .dependencies
            .get(&version_id)
            .map(|rows| rows.iter().collect())
            .unwrap_or_default();
        rows.sort_by(|a, b| {
            let path = |row: &DependencyRow| self.project_by_id(row.project_dependency_id).map(|p| p.path.clone());
            path(a).cmp(&path(b))
        });
        rows
    }
}
