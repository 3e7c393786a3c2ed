//! Raw Estimates

use super::FilteredEstimates;
use common::image::ScalarImage;
use common::math::Float;

/// Unfiltered per-pixel estimates.
pub struct RawEstimates {
    image: ScalarImage,
}

impl RawEstimates {
    /// Create a new `RawEstimates`.
    ///
    /// * `width`  - Image width.
    /// * `height` - Image height.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            image: ScalarImage::new(width, height),
        }
    }

    /// Wraps an existing image, e.g. moments loaded from disk.
    ///
    /// * `image` - The per-pixel values.
    pub fn from_image(image: ScalarImage) -> Self {
        Self { image }
    }
}

impl FilteredEstimates for RawEstimates {
    fn atomic_add(&self, x: usize, y: usize, value: Float) {
        self.image.atomic_add(x, y, value);
    }

    fn prepare(&mut self) {}

    fn query(&self, x: usize, y: usize) -> Float {
        self.image.get(x, y)
    }

    fn unfiltered(&self, x: usize, y: usize) -> Float {
        self.image.get(x, y)
    }

    fn scale(&mut self, s: Float) {
        self.image.scale(s);
    }

    fn to_image(&self) -> ScalarImage {
        self.image.clone()
    }
}
