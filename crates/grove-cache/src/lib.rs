//! On-disk package store for Grove
//!
//! This crate owns everything below the storage directory: the
//! hash-derived layout, stamp files recording verified archive hashes,
//! advisory per-package locks, archive extraction, and the concurrent
//! fetcher that fills the store from a resolved catalog.

pub mod fetch;
pub mod lock;
pub mod store;
pub mod tarball;

// Re-export main types
pub use fetch::{worker_count, FetchOutcome, FetchReport, Fetcher};
pub use lock::ScopedFileLock;
pub use store::PackageStore;
pub use tarball::{extract_tarball, relocate_into, unpack_file};

use grove_core::error::GroveError;

/// Result type for cache operations
pub type CacheResult<T> = Result<T, GroveError>;
