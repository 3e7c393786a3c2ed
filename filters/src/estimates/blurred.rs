//! Blurred Estimates

use super::FilteredEstimates;
use crate::repeated_box;
use common::image::ScalarImage;
use common::math::Float;

/// Full resolution estimates smoothed with a repeated box filter.
pub struct BlurredEstimates {
    /// Accumulated values.
    sums: ScalarImage,

    /// Result of the last `prepare`.
    blurred: ScalarImage,

    /// Box radius.
    radius: usize,

    /// Box repetitions.
    repetitions: usize,
}

impl BlurredEstimates {
    /// Create a new `BlurredEstimates`.
    ///
    /// * `width`       - Image width.
    /// * `height`      - Image height.
    /// * `radius`      - Box radius.
    /// * `repetitions` - Number of box passes.
    pub fn new(width: usize, height: usize, radius: usize, repetitions: usize) -> Self {
        Self {
            sums: ScalarImage::new(width, height),
            blurred: ScalarImage::new(width, height),
            radius,
            repetitions,
        }
    }
}

impl FilteredEstimates for BlurredEstimates {
    fn atomic_add(&self, x: usize, y: usize, value: Float) {
        self.sums.atomic_add(x, y, value);
    }

    fn prepare(&mut self) {
        repeated_box(&self.sums, &mut self.blurred, self.radius, self.repetitions);
    }

    fn query(&self, x: usize, y: usize) -> Float {
        self.blurred.get(x, y)
    }

    fn unfiltered(&self, x: usize, y: usize) -> Float {
        self.sums.get(x, y)
    }

    fn scale(&mut self, s: Float) {
        self.sums.scale(s);
    }

    fn to_image(&self) -> ScalarImage {
        self.blurred.clone()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
