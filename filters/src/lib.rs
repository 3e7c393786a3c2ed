//! Filters

mod box_blur;
mod dilation;
mod estimates;
mod mask_filter;
mod separable;

// Re-export.
pub use box_blur::*;
pub use dilation::*;
pub use estimates::*;
pub use mask_filter::*;
