//! Math helpers shared by all crates.

mod common;

// Re-export
pub use common::*;
