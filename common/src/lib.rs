//! Common

#[macro_use]
extern crate log;

// Re-export.
pub mod image;
pub mod image_io;
pub mod math;
pub mod parallel;
