//! Configuration loading for the Grove package resolver
//!
//! This crate handles parsing and validation of grove.toml settings, layering
//! global, project and environment configuration, and reading the small
//! per-package manifest the fetcher consults after unpacking.

pub mod manifest;
pub mod merge;
pub mod toml;

// Re-export main types
pub use self::manifest::{PackageManifest, MANIFEST_FILE};
pub use self::merge::{ConfigLayering, ConfigLoader, ConfigSource};
pub use self::toml::{
    HttpSettings, MirrorSettings, Settings, MAX_DOWNLOAD_THREADS, MAX_REFRESH_MINUTES, SETTINGS_FILE,
};

use grove_core::error::GroveError;

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, GroveError>;
