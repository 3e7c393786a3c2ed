//! Filtered Estimates

mod blurred;
mod raw;
mod tiled;

use common::image::ScalarImage;
use common::math::Float;

// Re-export.
pub use blurred::*;
pub use raw::*;
pub use tiled::*;

/// Per-pixel accumulator whose values are read back through a noise
/// reducing filter. Sample callbacks call `atomic_add` concurrently; the
/// owner calls `prepare` once accumulation for a round has finished and
/// before any `query`.
pub trait FilteredEstimates: Send + Sync {
    /// Atomically adds a value at pixel `(x, y)`.
    ///
    /// * `x`     - Column.
    /// * `y`     - Row.
    /// * `value` - Value to add.
    fn atomic_add(&self, x: usize, y: usize, value: Float);

    /// Computes the filtered estimate from the accumulated values.
    fn prepare(&mut self);

    /// Returns the filtered estimate at pixel `(x, y)`.
    ///
    /// * `x` - Column.
    /// * `y` - Row.
    fn query(&self, x: usize, y: usize) -> Float;

    /// Returns the accumulated value at pixel `(x, y)` without filtering.
    /// Unlike `query`, a single extreme sample stays confined to its pixel.
    ///
    /// * `x` - Column.
    /// * `y` - Row.
    fn unfiltered(&self, x: usize, y: usize) -> Float;

    /// Multiplies all accumulated values by `s`.
    ///
    /// * `s` - Scale factor.
    fn scale(&mut self, s: Float);

    /// Returns the filtered estimate as a full resolution image.
    fn to_image(&self) -> ScalarImage;
}

/// Selects the `FilteredEstimates` strategy used for moment buffers.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EstimateFilter {
    /// No filtering.
    Raw,

    /// Full resolution buffer blurred with a repeated box on `prepare`.
    Blurred { radius: usize, repetitions: usize },

    /// Coarse buffer holding one sum per square tile.
    Tiled { tile_size: usize },
}

impl EstimateFilter {
    /// Allocates a new estimate buffer for an image of the given size.
    ///
    /// * `width`  - Image width.
    /// * `height` - Image height.
    pub fn create(&self, width: usize, height: usize) -> Box<dyn FilteredEstimates> {
        match *self {
            Self::Raw => Box::new(RawEstimates::new(width, height)),
            Self::Blurred { radius, repetitions } => {
                Box::new(BlurredEstimates::new(width, height, radius, repetitions))
            }
            Self::Tiled { tile_size } => Box::new(TiledEstimates::new(width, height, tile_size)),
        }
    }
}

impl Default for EstimateFilter {
    fn default() -> Self {
        Self::Tiled { tile_size: 8 }
    }
}
