//! Packages and resolved catalog entries.

use super::{Flags, ProjectPath, Version};
use crate::error::{GroveError, GroveResult};
use crate::utils::hash::{hash_path, sha256_hex, shorten_hash};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Length of the hash prefix used for on-disk layout
pub const FS_HASH_LENGTH: usize = 8;

/// Kind of catalog project
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ProjectType {
    #[default]
    None = 0,
    Library = 1,
    Executable = 2,
    /// Aggregate grouping several sub-projects under one path
    RootProject = 3,
    Directory = 4,
}

impl ProjectType {
    /// Library or executable: something a root aggregate expands to
    pub fn is_buildable(self) -> bool {
        matches!(self, Self::Library | Self::Executable)
    }
}

impl TryFrom<u8> for ProjectType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::Library),
            2 => Ok(Self::Executable),
            3 => Ok(Self::RootProject),
            4 => Ok(Self::Directory),
            other => Err(format!("unknown project type id {}", other)),
        }
    }
}

impl From<ProjectType> for u8 {
    fn from(kind: ProjectType) -> Self {
        kind as u8
    }
}

/// A requested or resolved package.
///
/// Identity is `(path, version)`; flags are payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Package {
    pub path: ProjectPath,
    pub version: Version,
    #[serde(default)]
    pub flags: Flags,
}

impl Package {
    pub fn new(path: ProjectPath, version: Version) -> Self {
        Self {
            path,
            version,
            flags: Flags::empty(),
        }
    }

    pub fn with_flags(mut self, flags: Flags) -> Self {
        self.flags |= flags;
        self
    }

    /// Parse `path-version`; the version part is required
    pub fn parse_target(target: &str) -> GroveResult<Self> {
        let (path, version) = target.split_once('-').ok_or_else(|| {
            GroveError::ConfigValidation {
                field: "target".to_string(),
                reason: format!("'{}' has no version part", target),
            }
        })?;
        Ok(Self::new(path.parse()?, version.parse()?))
    }

    /// `path-version`
    pub fn target_name(&self) -> String {
        format!("{}-{}", self.path, self.version)
    }

    /// sha-256 of `path/version`
    pub fn hash(&self) -> String {
        sha256_hex(format!("{}/{}", self.path, self.version).as_bytes())
    }

    /// Shortened hash used for the store layout
    pub fn fs_hash(&self) -> String {
        shorten_hash(&self.hash(), FS_HASH_LENGTH)
    }

    /// Relative store directory, `ab/cd/efgh`
    pub fn hash_path(&self) -> String {
        hash_path(&self.fs_hash())
    }

    /// Never looked up in a catalog
    pub fn is_local(&self) -> bool {
        self.path.is_loc() || self.flags.contains(Flags::LOCAL_PROJECT)
    }

    pub fn is_direct(&self) -> bool {
        self.flags.contains(Flags::DIRECT_DEPENDENCY)
    }
}

impl PartialEq for Package {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path && self.version == other.version
    }
}

impl Eq for Package {}

impl Hash for Package {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.hash(state);
        self.version.hash(state);
    }
}

impl PartialOrd for Package {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Package {
    fn cmp(&self, other: &Self) -> Ordering {
        (&self.path, &self.version).cmp(&(&other.path, &other.version))
    }
}

impl fmt::Display for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.path, self.version)
    }
}

/// Numeric id of a resolved package version, valid within one catalog snapshot
pub type PackageVersionId = u64;

/// One resolved node of a dependency closure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: PackageVersionId,
    pub package: Package,
    /// Expected sha-256 of the package archive
    pub hash: String,
    /// Ids of direct dependencies within the same snapshot
    pub dependencies: BTreeSet<PackageVersionId>,
}

impl CatalogEntry {
    pub fn new(id: PackageVersionId, package: Package, hash: impl Into<String>) -> Self {
        Self {
            id,
            package,
            hash: hash.into(),
            dependencies: BTreeSet::new(),
        }
    }

    pub fn with_dependencies(mut self, ids: impl IntoIterator<Item = PackageVersionId>) -> Self {
        self.dependencies.extend(ids);
        self
    }
}

/// Flattened, id-indexed dependency closure
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogIndex {
    entries: BTreeMap<PackageVersionId, CatalogEntry>,
}

impl CatalogIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry; an existing entry with the same id wins
    pub fn insert(&mut self, entry: CatalogEntry) -> bool {
        match self.entries.entry(entry.id) {
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(entry);
                true
            }
            std::collections::btree_map::Entry::Occupied(_) => false,
        }
    }

    pub fn get(&self, id: PackageVersionId) -> Option<&CatalogEntry> {
        self.entries.get(&id)
    }

    pub fn find(&self, package: &Package) -> Option<&CatalogEntry> {
        self.entries.values().find(|e| e.package == *package)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.values()
    }

    /// Entries flagged as directly requested
    pub fn direct(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.values().filter(|e| e.package.is_direct())
    }

    /// Resolve an entry's dependency ids through this index
    pub fn dependencies_of<'a>(
        &'a self,
        entry: &'a CatalogEntry,
    ) -> impl Iterator<Item = &'a CatalogEntry> + 'a {
        entry.dependencies.iter().filter_map(|id| self.entries.get(id))
    }

    /// Dependency ids that point outside the index
    pub fn dangling_dependencies(&self) -> Vec<PackageVersionId> {
        let mut missing: Vec<PackageVersionId> = self
            .entries
            .values()
            .flat_map(|e| e.dependencies.iter().copied())
            .filter(|id| !self.entries.contains_key(id))
            .collect();
        missing.sort_unstable();
        missing.dedup();
        missing
    }
}

impl FromIterator<CatalogEntry> for CatalogIndex {
    fn from_iter<I: IntoIterator<Item = CatalogEntry>>(iter: I) -> Self {
        let mut index = CatalogIndex::new();
        for entry in iter {
            index.insert(entry);
        }
        index
    }
}

impl IntoIterator for CatalogIndex {
    type Item = CatalogEntry;
    type IntoIter = std::collections::btree_map::IntoValues<PackageVersionId, CatalogEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_values()
    }
}
