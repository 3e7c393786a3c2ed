//! Images

mod rgb_image;
mod scalar_image;

// Re-export.
pub use rgb_image::*;
pub use scalar_image::*;
