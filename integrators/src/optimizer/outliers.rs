//! Outlier Thresholds

use common::math::*;
use order_stat::kth_by;
use ordered_float::OrderedFloat;

/// One value in this many pixels is treated as an outlier (0.002%).
pub const INV_OUTLIER_FRACTION: usize = 50000;

/// Fraction of pixels above which rejected outliers are reported.
pub const OUTLIER_WARNING_FRACTION: f64 = 0.0001;

/// Returns the number of largest values that count as outliers.
///
/// * `num_pixels` - Number of pixels in the image.
#[inline]
pub fn num_outliers_allowed(num_pixels: usize) -> usize {
    num_pixels / INV_OUTLIER_FRACTION
}

/// Returns the threshold above which a relative moment is rejected: the
/// `n`-th largest of `values`, where `n` is the outlier allowance for the
/// image. Returns infinity when no values are to be rejected.
///
/// * `values`     - Relative moments of the non-black pixels. Reordered.
/// * `num_pixels` - Number of pixels in the image.
pub fn outlier_threshold(values: &mut [Float], num_pixels: usize) -> Float {
    let n = num_outliers_allowed(num_pixels);
    if n == 0 || values.len() <= n {
        return INFINITY;
    }
    let k = values.len() - n;
    *kth_by(values, k, |a, b| OrderedFloat(*a).cmp(&OrderedFloat(*b)))
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn small_images_reject_nothing() {
        let mut values = vec![1.0, 2.0, 1e9];
        assert_eq!(outlier_threshold(&mut values, 49999), INFINITY);
    }

    #[test]
    fn too_few_values_reject_nothing() {
        let mut values = vec![1.0, 1e9];
        assert_eq!(outlier_threshold(&mut values, 100000), INFINITY);
    }

    #[test]
    fn nth_largest_is_the_threshold() {
        // Two allowed outliers.
        let mut values: Vec<Float> = (0..10).map(|i| i as Float).collect();
        values.reverse();
        assert_eq!(outlier_threshold(&mut values, 100000), 8.0);
    }

    proptest! {
        #[test]
        fn at_most_n_values_exceed_threshold(
            mut values in prop::collection::vec(0.0f32..1e6, 3..200),
        ) {
            let num_pixels = 2 * INV_OUTLIER_FRACTION;
            let original = values.clone();
            let t = outlier_threshold(&mut values, num_pixels);
            let above = original.iter().filter(|&&v| v > t).count();
            prop_assert!(above < num_outliers_allowed(num_pixels));
        }
    }
}
