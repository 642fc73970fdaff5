//! Version spec matching against mirrored version rows.
//!
//! Matching cascades from the most specific query to the least specific
//! one, but never widens past a component the spec pinned: `1.2.9` is
//! either found exactly or fails, `1.2` picks the highest patch of 1.2,
//! `1` the highest 1.x.y and `*` the latest numbered version.

use chrono::{DateTime, Utc};
use grove_core::error::GroveError;
use grove_core::types::{Flags, PackageVersionId, Version};

use crate::mirror::{ProjectRow, VersionRow};
use crate::ResolverResult;

/// The version row a spec resolved to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedVersion {
    pub id: PackageVersionId,
    /// Concrete version; every wildcard of the spec is filled in
    pub version: Version,
    /// Project flags OR'd with the matched row's flags
    pub flags: Flags,
    pub hash: String,
    pub created: Option<DateTime<Utc>>,
}

impl MatchedVersion {
    fn from_row(project: &ProjectRow, row: &VersionRow) -> Self {
        Self {
            id: row.id,
            version: row.version(),
            flags: project.flags | row.flags,
            hash: row.sha256.clone(),
            created: row.created,
        }
    }
}

/// Resolve `spec` among the version rows of `project`
pub fn match_version(
    project: &ProjectRow,
    rows: &[VersionRow],
    spec: &Version,
) -> ResolverResult<MatchedVersion> {
    let no_match = || GroveError::NoMatchingVersion {
        project: project.path.to_string(),
        version: spec.to_any_version(),
    };

    let (major, minor, patch) = match spec {
        Version::Branch(name) => {
            let row = rows
                .iter()
                .find(|r| r.branch.as_deref() == Some(name.as_str()))
                .ok_or_else(|| GroveError::NoSuchBranch {
                    project: project.path.to_string(),
                    branch: name.clone(),
                })?;
            return Ok(MatchedVersion::from_row(project, row));
        }
        Version::Number {
            major,
            minor,
            patch,
        } => (*major, *minor, *patch),
    };

    let numbered = || rows.iter().filter(|r| !r.is_branch());

    if let Some(row) = numbered().find(|r| (r.major, r.minor, r.patch) == (major, minor, patch)) {
        return Ok(MatchedVersion::from_row(project, row));
    }
    if patch.is_some() {
        return Err(no_match());
    }

    if let Some(row) = latest(numbered().filter(|r| r.major == major && r.minor == minor)) {
        return Ok(MatchedVersion::from_row(project, row));
    }
    if minor.is_some() {
        return Err(no_match());
    }

    if let Some(row) = latest(numbered().filter(|r| r.major == major)) {
        return Ok(MatchedVersion::from_row(project, row));
    }
    if major.is_some() {
        return Err(no_match());
    }

    latest(numbered())
        .map(|row| MatchedVersion::from_row(project, row))
        .ok_or_else(no_match)
}

/// Highest `(major, minor, patch)` among `rows`
fn latest<'a>(rows: impl Iterator<Item = &'a VersionRow>) -> Option<&'a VersionRow> {
    rows.max_by_key(|r| (r.major, r.minor, r.patch))
}

#[cfg(test)]
mod tests {
    use super::*;
    use grove_core::types::ProjectType;

    fn project(flags: Flags) -> ProjectRow {
        ProjectRow {
            id: 1,
            path: "org.x.foo".parse().unwrap(),
            kind: ProjectType::Library,
            flags,
        }
    }

    fn row(id: PackageVersionId, version: &str) -> VersionRow {
        let v: Version = version.parse().unwrap();
        VersionRow {
            id,
            project_id: 1,
            major: v.major(),
            minor: v.minor(),
            patch: v.patch(),
            branch: v.branch_name().map(str::to_string),
            flags: Flags::empty(),
            sha256: format!("hash-{}", version),
            created: None,
        }
    }

    fn rows() -> Vec<VersionRow> {
        vec![row(1, "1.2.3"), row(2, "1.3.0"), row(3, "master")]
    }

    fn resolve(spec: &str) -> ResolverResult<MatchedVersion> {
        match_version(&project(Flags::empty()), &rows(), &spec.parse().unwrap())
    }

    #[test]
    fn test_wildcard_patch_picks_within_minor() {
        assert_eq!(resolve("1.2").unwrap().version, Version::new(1, 2, 3));
        assert_eq!(resolve("1.2.*").unwrap().version, Version::new(1, 2, 3));
    }

    #[test]
    fn test_wildcard_minor_picks_latest_of_major() {
        let matched = resolve("1").unwrap();
        assert_eq!(matched.version, Version::new(1, 3, 0));
        assert_eq!(matched.id, 2);
        assert_eq!(matched.hash, "hash-1.3.0");
    }

    #[test]
    fn test_any_picks_latest_numbered() {
        assert_eq!(resolve("*").unwrap().version, Version::new(1, 3, 0));
    }

    #[test]
    fn test_pinned_components_never_widen() {
        let err = resolve("1.2.9").unwrap_err();
        assert_eq!(
            err.to_string(),
            "No such version/branch '1.2.9' for project 'org.x.foo'"
        );
        assert!(matches!(resolve("1.4").unwrap_err(), GroveError::NoMatchingVersion { .. }));
        assert!(matches!(resolve("2").unwrap_err(), GroveError::NoMatchingVersion { .. }));
    }

    #[test]
    fn test_branch_lookup() {
        let matched = resolve("master").unwrap();
        assert_eq!(matched.version.branch_name(), Some("master"));
        assert_eq!(matched.id, 3);

        let err = resolve("develop").unwrap_err();
        assert!(matches!(err, GroveError::NoSuchBranch { .. }));
    }

    #[test]
    fn test_no_numbered_versions() {
        let only_branch = vec![row(3, "master")];
        let err = match_version(&project(Flags::empty()), &only_branch, &Version::any()).unwrap_err();
        assert!(matches!(err, GroveError::NoMatchingVersion { .. }));
    }

    #[test]
    fn test_flags_are_project_or_row() {
        let mut versions = rows();
        versions[0].flags = Flags::PRIVATE_DEPENDENCY;
        let matched = match_version(
            &project(Flags::HEADER_ONLY),
            &versions,
            &"1.2".parse().unwrap(),
        )
        .unwrap();
        assert_eq!(matched.flags, Flags::HEADER_ONLY | Flags::PRIVATE_DEPENDENCY);
    }
}
