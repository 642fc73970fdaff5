//! Error types and result aliases for Grove operations.
//!
//! Provides a unified error type that covers resolution, catalog, fetch and
//! configuration failures with actionable error messages.

use crate::types::{PathError, VersionError};
use thiserror::Error;

/// Unified error type for all Grove operations
#[derive(Error, Debug)]
pub enum GroveError {
    // Version matching
    #[error("No such branch '{branch}' for project '{project}'")]
    NoSuchBranch { project: String, branch: String },

    #[error("No such version/branch '{version}' for project '{project}'")]
    NoMatchingVersion { project: String, version: String },

    #[error("Package '{package}' was published too recently to be served from the local mirror")]
    YoungPackage { package: String },

    // Catalog integrity
    #[error("Unknown project '{path}'")]
    UnknownProject { path: String },

    #[error("Root project '{path}' is empty")]
    EmptyRootProject { path: String },

    // Registry protocol
    #[error("Incompatible catalog protocol: {reason}")]
    IncompatibleProtocol { reason: String },

    #[error("Remote '{remote}' rejected the request: {message}")]
    RegistryRejected { remote: String, message: String },

    #[error("Some packages ({}) are unresolved: {}", .packages.len(), .packages.join(", "))]
    UnresolvedPackages { packages: Vec<String> },

    #[error("Transport failure on remote '{remote}': {message}")]
    TransportFailure {
        remote: String,
        message: String,
        /// HTTP status of the answer, `None` when none arrived
        status: Option<u16>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    // Fetch
    #[error("Local catalog is stale: hashes do not match for package {package}")]
    StaleLocalCatalog { package: String },

    #[error("Hashes do not match for package {package}: expected {expected}, got {actual}")]
    HashMismatch {
        package: String,
        expected: String,
        actual: String,
    },

    #[error("Failed to fetch {} package(s): {}", .failures.len(), summarize(.failures))]
    FetchFailed { failures: Vec<FetchFailure> },

    #[error("Archive error: {message}")]
    Archive { message: String },

    // Graph
    #[error("Circular dependency detected: {cycle}")]
    CircularDependency { cycle: String },

    // Mirror and configuration
    #[error("Mirror schema mismatch: {reason}")]
    MirrorSchema { reason: String },

    #[error("Configuration field '{field}' is invalid: {reason}")]
    ConfigValidation { field: String, reason: String },

    #[error("Failed to parse {file}: {message}")]
    TomlParse { file: String, message: String },

    #[error("Failed to parse JSON: {message}")]
    JsonParse { message: String },

    #[error(transparent)]
    Version(#[from] VersionError),

    #[error(transparent)]
    Path(#[from] PathError),

    // IO errors
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },
}

/// One package whose fetch pipeline failed
#[derive(Debug)]
pub struct FetchFailure {
    pub package: String,
    pub error: Box<GroveError>,
}

fn summarize(failures: &[FetchFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{} ({})", f.package, f.error))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type alias for Grove operations
pub type GroveResult<T> = Result<T, GroveError>;

impl GroveError {
    /// Create a transport error from any error type
    pub fn transport<E>(remote: &str, message: String, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::TransportFailure {
            remote: remote.to_string(),
            message,
            status: None,
            source: Some(Box::new(source)),
        }
    }

    /// Create a transport error for a response with an unexpected status
    pub fn http_status(remote: &str, message: String, status: u16) -> Self {
        Self::TransportFailure {
            remote: remote.to_string(),
            message,
            status: Some(status),
            source: None,
        }
    }

    /// Create an IO error from std::io::Error
    pub fn io(message: String, source: std::io::Error) -> Self {
        Self::Io { message, source }
    }

    /// Check if this error is recoverable by retrying.
    ///
    /// A server that answered with a client error will answer the same way again.
    pub fn is_recoverable(&self) -> bool {
        match self {
            GroveError::TransportFailure { status: None, .. } => true,
            GroveError::TransportFailure { status: Some(code), .. } => {
                *code >= 500 || *code == 408 || *code == 429
            }
            GroveError::Io { .. } => true,
            _ => false,
        }
    }

    /// Whether a remote query failing this way should move on to the next remote
    pub fn advances_remote(&self) -> bool {
        matches!(
            self,
            GroveError::TransportFailure { .. }
                | GroveError::RegistryRejected { .. }
                | GroveError::UnresolvedPackages { .. }
                | GroveError::JsonParse { .. }
        )
    }

    /// The local mirror disagreed with actual archive content
    pub fn is_stale_local(&self) -> bool {
        match self {
            GroveError::StaleLocalCatalog { .. } => true,
            GroveError::FetchFailed { failures } => failures.iter().any(|f| f.error.is_stale_local()),
            _ => false,
        }
    }

    /// Version spec could not be satisfied
    pub fn is_no_such_version(&self) -> bool {
        matches!(
            self,
            GroveError::NoMatchingVersion { .. } | GroveError::NoSuchBranch { .. }
        )
    }

    /// Get a user-friendly suggestion for fixing this error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            GroveError::NoMatchingVersion { .. } | GroveError::NoSuchBranch { .. } => {
                Some("Check the available versions of the package or relax the version spec")
            },
            GroveError::TransportFailure { .. } => Some("Check your internet connection and try again"),
            GroveError::IncompatibleProtocol { .. } | GroveError::MirrorSchema { .. } => {
                Some("Upgrade the client or wait for the registry to be upgraded")
            },
            GroveError::HashMismatch { .. } => {
                Some("The archive may have been tampered with; report it to the registry maintainers")
            },
            GroveError::CircularDependency { .. } => {
                Some("Remove circular dependencies by restructuring your packages")
            },
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_matching_version_message() {
        let err = GroveError::NoMatchingVersion {
            project: "org.x.lib".to_string(),
            version: "1.2.9".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "No such version/branch '1.2.9' for project 'org.x.lib'"
        );
        assert!(err.is_no_such_version());
        assert!(err.suggestion().is_some());
    }

    #[test]
    fn test_remote_advancement() {
        let transport = GroveError::TransportFailure {
            remote: "origin".to_string(),
            message: "connection refused".to_string(),
            status: None,
            source: None,
        };
        assert!(transport.advances_remote());
        assert!(transport.is_recoverable());

        let rejected = GroveError::RegistryRejected {
            remote: "origin".to_string(),
            message: "unknown project".to_string(),
        };
        assert!(rejected.advances_remote());
        assert!(!rejected.is_recoverable());

        let protocol = GroveError::IncompatibleProtocol {
            reason: "server too old".to_string(),
        };
        assert!(!protocol.advances_remote());
    }

    #[test]
    fn test_stale_local_inside_fetch_failures() {
        let err = GroveError::FetchFailed {
            failures: vec![
                FetchFailure {
                    package: "org.a-1.0.0".to_string(),
                    error: Box::new(GroveError::Archive {
                        message: "truncated".to_string(),
                    }),
                },
                FetchFailure {
                    package: "org.b-1.0.0".to_string(),
                    error: Box::new(GroveError::StaleLocalCatalog {
                        package: "org.b-1.0.0".to_string(),
                    }),
                },
            ],
        };
        assert!(err.is_stale_local());
        let text = err.to_string();
        assert!(text.starts_with("Failed to fetch 2 package(s)"));
        assert!(text.contains("org.a-1.0.0 (Archive error: truncated)"));
    }

    #[test]
    fn test_only_transient_statuses_are_recoverable() {
        let status = |code| GroveError::http_status("origin", format!("Error code: {}", code), code);
        assert!(status(500).is_recoverable());
        assert!(status(503).is_recoverable());
        assert!(status(429).is_recoverable());
        assert!(!status(400).is_recoverable());
        assert!(!status(404).is_recoverable());
        // still worth asking the next remote
        assert!(status(404).advances_remote());
    }

    #[test]
    fn test_unresolved_message() {
        let err = GroveError::UnresolvedPackages {
            packages: vec!["org.a-1".to_string(), "org.b-*".to_string()],
        };
        assert_eq!(err.to_string(), "Some packages (2) are unresolved: org.a-1, org.b-*");
    }

    #[test]
    fn test_io_error_source() {
        use std::error::Error;
        let err = GroveError::io(
            "Failed to write stamp".to_string(),
            std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        );
        assert!(err.source().is_some());
    }
}
