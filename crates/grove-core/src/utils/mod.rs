//! Utility functions and helpers.
//!
//! Common functionality used across multiple Grove crates.

pub mod hash;

// Re-export commonly used utilities
pub use hash::{hash_path, sha256_file, sha256_hex, shorten_hash, verify_file_integrity};
