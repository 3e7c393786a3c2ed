//! Candidate Optimizer

mod outliers;
mod per_image;
mod per_pixel;

// Re-export.
pub use outliers::*;
pub use per_image::*;
pub use per_pixel::*;
