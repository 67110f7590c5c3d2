//! kiln-lib: incremental build engine for modular C++ codebases
//!
//! This crate provides the pieces a build invocation is assembled from:
//! - `rules`: module and target descriptors, registered explicitly or loaded from `Kiln.toml`
//! - `resolve`: per-module build environments merged through public/private dependencies
//! - `binary`: grouping of modules into link units and visibility macros
//! - `graph`: work items, the concurrent scheduler and the work-item cache
//! - `cache`: include-closure scanning and the code-generation header cache
//! - `toolchain`: the seam turning environments into compile and link work items
//! - `build`: the driver running every target through its stages

pub mod binary;
pub mod build;
pub mod cache;
pub mod config;
pub mod consts;
pub mod graph;
pub mod options;
pub mod platform;
pub mod resolve;
pub mod rules;
pub mod toolchain;
pub mod util;
