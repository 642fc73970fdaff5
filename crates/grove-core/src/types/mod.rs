//! Core data types for package resolution.
//!
//! This module provides the value types shared by every Grove crate:
//! - Project paths and versions
//! - Flag bit-sets
//! - Packages and resolved catalog entries
//! - Registry endpoints

pub mod flags;
pub mod package;
pub mod path;
pub mod remote;
pub mod version;

// Re-export all public types
pub use flags::Flags;
pub use package::{CatalogEntry, CatalogIndex, Package, PackageVersionId, ProjectType};
pub use path::{Namespace, PathError, ProjectPath};
pub use remote::{CatalogSource, Remote};
pub use version::{Version, VersionError};
