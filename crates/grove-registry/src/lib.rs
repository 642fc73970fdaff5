//! Remote registry client for the Grove package resolver
//!
//! This crate provides HTTP client functionality for querying the remote
//! catalog API, downloading package archives with streaming hashing, and
//! reporting downloads back to the registry.

pub mod api;
pub mod client;

// Re-export main types
pub use api::{
    check_api_level, AddDownloadsRequest, FindDependenciesRequest, FindDependenciesResponse,
    RemotePackage, VersionQuery, CURRENT_API_LEVEL,
};
pub use client::{RegistryClient, RetryConfig};

use grove_core::error::GroveError;

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, GroveError>;
