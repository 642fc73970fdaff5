//! Remote catalog API request and response types

use crate::RegistryResult;
use grove_core::error::GroveError;
use grove_core::types::{CatalogEntry, CatalogIndex, Flags, Package, PackageVersionId, ProjectPath};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Catalog protocol level this client speaks
pub const CURRENT_API_LEVEL: i64 = 1;

/// Body of `POST /api/find_dependencies`: path to requested version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FindDependenciesRequest(pub BTreeMap<String, VersionQuery>);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionQuery {
    pub version: String,
}

impl FindDependenciesRequest {
    pub fn from_packages(packages: &[Package]) -> Self {
        Self(
            packages
                .iter()
                .map(|p| {
                    (
                        p.path.to_string(),
                        VersionQuery {
                            version: p.version.to_any_version(),
                        },
                    )
                })
                .collect(),
        )
    }
}

/// Response of `POST /api/find_dependencies`
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FindDependenciesResponse {
    /// Protocol level of the server
    #[serde(default)]
    pub api: Option<i64>,
    /// Set when the whole query failed
    #[serde(default)]
    pub error: Option<String>,
    /// Informational message for the user
    #[serde(default)]
    pub info: Option<String>,
    /// Package records keyed either by path or by id
    #[serde(default)]
    pub packages: BTreeMap<String, RemotePackage>,
}

/// One resolved package as reported by the registry
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RemotePackage {
    /// Present when the record is keyed by path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<PackageVersionId>,
    /// Present when the record is keyed by id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub version: String,
    #[serde(default)]
    pub flags: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    /// Older servers name the archive hash `hash`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<PackageVersionId>,
}

/// Body of `POST /api/add_downloads`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddDownloadsRequest {
    pub vids: Vec<PackageVersionId>,
}

/// Check a server protocol level against [`CURRENT_API_LEVEL`]
pub fn check_api_level(api: Option<i64>) -> RegistryResult<()> {
    match api {
        None | Some(0) => Err(GroveError::IncompatibleProtocol {
            reason: "API version is missing in the response".to_string(),
        }),
        Some(level) if level > CURRENT_API_LEVEL => Err(GroveError::IncompatibleProtocol {
            reason: format!(
                "server uses API level {}, this client supports {}; please upgrade the client",
                level, CURRENT_API_LEVEL
            ),
        }),
        Some(level) if level < CURRENT_API_LEVEL - 1 => Err(GroveError::IncompatibleProtocol {
            reason: format!(
                "server uses API level {}, older than this client's {}; wait for the server upgrade",
                level, CURRENT_API_LEVEL
            ),
        }),
        Some(_) => Ok(()),
    }
}

impl RemotePackage {
    fn into_entry(self, key: &str) -> RegistryResult<CatalogEntry> {
        let (id, path) = match (self.id, self.path.as_deref()) {
            (Some(id), None) => (id, key),
            (Some(id), Some(path)) => (id, path),
            (None, Some(path)) => (parse_id(key)?, path),
            (None, None) => (parse_id(key)?, key),
        };
        let path: ProjectPath = path.parse()?;
        let version = self.version.parse()?;
        let hash = self.sha256.or(self.hash).unwrap_or_default();

        let package = Package::new(path, version).with_flags(Flags::from_bits(self.flags));
        Ok(CatalogEntry::new(id, package, hash).with_dependencies(self.dependencies))
    }
}

fn parse_id(key: &str) -> RegistryResult<PackageVersionId> {
    key.parse().map_err(|_| GroveError::JsonParse {
        message: format!("package record '{}' carries neither an id nor a path", key),
    })
}

impl FindDependenciesResponse {
    /// Validate the response and flatten it into a catalog snapshot.
    ///
    /// Every requested path must come back, except a single path that is the
    /// root of some returned package (an aggregate expanded by the server).
    pub fn into_index(self, requested: &[Package], remote: &str) -> RegistryResult<CatalogIndex> {
        if let Some(error) = self.error {
            return Err(GroveError::RegistryRejected {
                remote: remote.to_string(),
                message: error,
            });
        }
        if let Some(message) = &self.info {
            info!("{}: {}", remote, message);
        }
        check_api_level(self.api)?;

        let mut index = CatalogIndex::new();
        for (key, record) in self.packages {
            index.insert(record.into_entry(&key)?);
        }

        let missing: Vec<&Package> = requested
            .iter()
            .filter(|p| !index.entries().any(|e| e.package.path == p.path))
            .collect();

        match missing.as_slice() {
            [] => {}
            [only] if index.entries().any(|e| only.path.is_root_of(&e.package.path)) => {
                warn!("Skipping unresolved project: {}. Probably this is intended", only);
            }
            _ => {
                return Err(GroveError::UnresolvedPackages {
                    packages: missing.iter().map(|p| p.to_string()).collect(),
                });
            }
        }

        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn package(path: &str, version: &str) -> Package {
        Package::new(path.parse().unwrap(), version.parse().unwrap())
    }

    #[test]
    fn test_request_uses_any_version_form() {
        let request = FindDependenciesRequest::from_packages(&[
            package("org.boost.asio", "1.2"),
            package("org.x.y", "*"),
        ]);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "org.boost.asio": { "version": "1.2" },
                "org.x.y": { "version": "*" }
            })
        );
    }

    #[test]
    fn test_api_levels() {
        assert!(check_api_level(Some(1)).is_ok());
        assert!(check_api_level(Some(0)).is_err());
        assert!(check_api_level(None).is_err());
        assert!(check_api_level(Some(2)).is_err());
        assert!(check_api_level(Some(-1)).is_err());
    }

    #[test]
    fn test_records_keyed_by_path_and_by_id() {
        let response: FindDependenciesResponse = serde_json::from_value(serde_json::json!({
            "api": 1,
            "packages": {
                "org.a.lib": { "id": 10, "version": "1.0.0", "flags": 1, "sha256": "aa", "dependencies": [11] },
                "11": { "path": "org.b.lib", "version": "2.1.5", "hash": "bb" }
            }
        }))
        .unwrap();

        let index = response
            .into_index(&[package("org.a.lib", "1")], "origin")
            .unwrap();
        assert_eq!(index.len(), 2);

        let a = index.get(10).unwrap();
        assert_eq!(a.package.path.to_string(), "org.a.lib");
        assert!(a.package.flags.contains(Flags::HEADER_ONLY));
        assert_eq!(a.hash, "aa");
        assert!(a.dependencies.contains(&11));

        let b = index.get(11).unwrap();
        assert_eq!(b.package.version.to_string(), "2.1.5");
        assert_eq!(b.hash, "bb");
    }

    #[test]
    fn test_unresolved_root_exception() {
        let response: FindDependenciesResponse = serde_json::from_value(serde_json::json!({
            "api": 1,
            "packages": {
                "org.a.lib": { "id": 1, "version": "1.0.0" }
            }
        }))
        .unwrap();

        // a single missing aggregate whose child came back is tolerated
        let index = response
            .clone()
            .into_index(&[package("org.a", "*")], "origin")
            .unwrap();
        assert_eq!(index.len(), 1);

        let err = response
            .into_index(&[package("org.a", "*"), package("org.c.lib", "1")], "origin")
            .unwrap_err();
        assert!(matches!(err, GroveError::UnresolvedPackages { ref packages } if packages.len() == 2));
    }

    #[test]
    fn test_error_field_wins() {
        let response = FindDependenciesResponse {
            api: Some(1),
            error: Some("bad request".to_string()),
            ..Default::default()
        };
        let err = response.into_index(&[], "origin").unwrap_err();
        assert!(matches!(err, GroveError::RegistryRejected { .. }));
    }
}
