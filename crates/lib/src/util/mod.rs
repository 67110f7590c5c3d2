//! Shared utilities.
//!
//! Fingerprinting and file system helpers used across the crate.

pub mod fs;
pub mod hash;
