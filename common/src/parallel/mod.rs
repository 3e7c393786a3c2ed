//! Parallel

mod atomic_float;
mod parallel_for;

// Re-export.
pub use atomic_float::*;
pub use parallel_for::*;
