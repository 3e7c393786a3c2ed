//! Mask Filter

use crate::{dilation, repeated_box};
use common::image::ScalarImage;

/// Post-filter for per-pixel decision masks. A dilation first keeps isolated
/// enabled pixels from being blurred away, then a repeated box turns the
/// binary or integer decisions into a smooth fractional mask.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MaskFilter {
    /// Dilation radius in pixels.
    pub dilation_radius: usize,

    /// Box radius in pixels.
    pub blur_radius: usize,

    /// Number of box passes.
    pub blur_repetitions: usize,
}

impl MaskFilter {
    /// Returns a filter that leaves masks unchanged.
    pub fn identity() -> Self {
        Self {
            dilation_radius: 0,
            blur_radius: 0,
            blur_repetitions: 0,
        }
    }

    /// Filters the mask in place.
    ///
    /// * `mask` - The decision mask.
    pub fn apply(&self, mask: &mut ScalarImage) {
        let mut buf = ScalarImage::new(mask.width(), mask.height());
        dilation(mask, &mut buf, self.dilation_radius);
        repeated_box(&buf, mask, self.blur_radius, self.blur_repetitions);
    }
}

impl Default for MaskFilter {
    fn default() -> Self {
        Self {
            dilation_radius: 8,
            blur_radius: 4,
            blur_repetitions: 3,
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use common::math::Float;
    use float_cmp::*;

    #[test]
    fn identity_filter_leaves_mask_unchanged() {
        let mut mask = ScalarImage::from_values(&[0.0, 1.0, 0.0, 4.0], 2, 2);
        MaskFilter::identity().apply(&mut mask);
        assert_eq!(mask.to_vec(), vec![0.0, 1.0, 0.0, 4.0]);
    }

    #[test]
    fn isolated_enabled_pixel_survives_filtering() {
        let mut mask = ScalarImage::new(64, 64);
        mask.set(16, 16, 1.0);
        MaskFilter::default().apply(&mut mask);
        assert!(mask.get(16, 16) > 0.9);
        assert!(mask.get(24, 16) > 0.3);
        assert!(approx_eq!(Float, mask.get(50, 50), 0.0));
    }
}
