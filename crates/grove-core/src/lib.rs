//! # grove-core
//!
//! Core types and utilities shared across all Grove crates.
//!
//! This crate provides:
//! - ProjectPath, Version and Flags value types
//! - Package, CatalogEntry and CatalogIndex for resolved closures
//! - Remote endpoints and the catalog source marker
//! - GroveError enum for unified error handling
//! - sha-256 helpers for integrity checks and store layout
//!
//! ## Architecture
//!
//! The crate is organized into modules:
//! - `types`: Core data types
//! - `error`: Error types and result aliases
//! - `utils`: Utility functions and helpers

pub mod error;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use error::{FetchFailure, GroveError, GroveResult};
pub use types::{
    CatalogEntry, CatalogIndex, CatalogSource, Flags, Package, PackageVersionId, ProjectPath,
    ProjectType, Remote, Version,
};
