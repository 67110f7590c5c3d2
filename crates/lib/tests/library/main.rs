//! Integration tests for kiln-lib.

mod build_tests;
mod common;
mod graph_tests;
mod manifest_tests;
