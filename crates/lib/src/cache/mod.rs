//! Change detection for the build inputs that are not work items themselves.
//!
//! - [`includes`]: transitive include closures of source files.
//! - [`codegen`]: per-module classification of headers carrying reflection markup.
//!
//! The work-item cache lives with the task graph in [`crate::graph::cache`].

pub mod codegen;
pub mod includes;

pub use codegen::{CodeGenCache, CodeGenFingerprint};
pub use includes::{IncludeScanner, parse_include_directives};
