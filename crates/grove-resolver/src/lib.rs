//! Dependency resolution engine for Grove
//!
//! This crate turns requested packages into a verified, unpacked closure:
//! version matching against the local catalog mirror, transitive closure
//! building, LOCAL/REMOTE catalog dispatch, cycle checking, and the
//! session that ties resolution and fetching together.

pub mod catalog;
pub mod closure;
pub mod graph;
pub mod matching;
pub mod mirror;
pub mod session;

// Re-export main types
pub use catalog::{CatalogAnswer, PackageCatalog};
pub use closure::ClosureBuilder;
pub use graph::DependencyGraph;
pub use matching::{match_version, MatchedVersion};
pub use mirror::{CatalogSnapshot, JsonMirror, MirrorStore, MirrorSync};
pub use session::{PackageConfig, ResolverSession};

use grove_core::error::GroveError;

/// Result type for resolver operations
pub type ResolverResult<T> = Result<T, GroveError>;
