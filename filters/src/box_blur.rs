//! Box Blur

use crate::separable::*;
use common::image::ScalarImage;
use common::math::*;

/// Blurs `src` into `dst` with a square box kernel of the given radius,
/// applied `repetitions` times. Repeating a box approximates a wider,
/// smoother kernel at the cost of a few cheap passes. Each pass averages over
/// the in-bounds part of the kernel so a constant image stays constant near
/// the borders.
///
/// * `src`         - Source image, read only.
/// * `dst`         - Destination image with the same size as `src`.
/// * `radius`      - Kernel radius in pixels.
/// * `repetitions` - Number of passes. 0 copies `src` to `dst`.
pub fn repeated_box(src: &ScalarImage, dst: &mut ScalarImage, radius: usize, repetitions: usize) {
    assert!(
        src.same_size(dst),
        "repeated_box(): source {}x{} and destination {}x{} differ",
        src.width(),
        src.height(),
        dst.width(),
        dst.height()
    );

    if repetitions == 0 || radius == 0 {
        copy_into(src, dst);
        return;
    }

    let tmp = ScalarImage::new(src.width(), src.height());
    horizontal_pass(src, &tmp, |line, out| box_line(line, out, radius));
    vertical_pass(&tmp, dst, |line, out| box_line(line, out, radius));
    for _ in 1..repetitions {
        horizontal_pass(dst, &tmp, |line, out| box_line(line, out, radius));
        vertical_pass(&tmp, dst, |line, out| box_line(line, out, radius));
    }
}

/// Averages each sample of `line` over its in-bounds neighbourhood.
fn box_line(line: &[Float], out: &mut [Float], radius: usize) {
    let mut prefix = Vec::with_capacity(line.len() + 1);
    prefix.push(0.0_f64);
    let mut sum = 0.0_f64;
    for &v in line {
        sum += v as f64;
        prefix.push(sum);
    }

    let last = line.len() - 1;
    for (i, o) in out.iter_mut().enumerate() {
        let lo = i.saturating_sub(radius);
        let hi = min(i + radius, last);
        let count = (hi - lo + 1) as f64;
        *o = ((prefix[hi + 1] - prefix[lo]) / count) as Float;
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::*;
    use proptest::prelude::*;

    #[test]
    fn box_blur_spreads_single_impulse() {
        let src = ScalarImage::new(5, 5);
        src.set(2, 2, 9.0);
        let mut dst = ScalarImage::new(5, 5);
        repeated_box(&src, &mut dst, 1, 1);

        assert!(approx_eq!(Float, dst.get(2, 2), 1.0, epsilon = 1e-6));
        assert!(approx_eq!(Float, dst.get(1, 1), 1.0, epsilon = 1e-6));
        assert!(approx_eq!(Float, dst.get(0, 0), 0.0, epsilon = 1e-6));
        assert!(approx_eq!(Float, dst.get(4, 2), 0.0, epsilon = 1e-6));
    }

    #[test]
    fn zero_repetitions_copies_source() {
        let src = ScalarImage::from_values(&[1.0, 2.0, 3.0, 4.0], 2, 2);
        let mut dst = ScalarImage::new(2, 2);
        repeated_box(&src, &mut dst, 3, 0);
        assert_eq!(dst.to_vec(), src.to_vec());
    }

    #[test]
    #[should_panic]
    fn mismatched_sizes_panic() {
        let src = ScalarImage::new(4, 4);
        let mut dst = ScalarImage::new(4, 3);
        repeated_box(&src, &mut dst, 1, 1);
    }

    #[test]
    fn box_blur_keeps_interior_mass() {
        let src = ScalarImage::new(21, 21);
        src.set(10, 10, 1.0);
        let mut dst = ScalarImage::new(21, 21);
        repeated_box(&src, &mut dst, 2, 3);
        assert!(approx_eq!(f64, dst.sum(), 1.0, epsilon = 1e-4));
    }

    proptest! {
        #[test]
        fn repeated_box_keeps_flat_image_flat(
            value in 0.0..100.0f32,
            w in 1..12usize,
            h in 1..12usize,
            radius in 0..6usize,
            repetitions in 0..5usize,
        ) {
            let src = ScalarImage::filled(w, h, value);
            let mut dst = ScalarImage::new(w, h);
            repeated_box(&src, &mut dst, radius, repetitions);
            for v in dst.to_vec() {
                prop_assert!(approx_eq!(Float, v, value, epsilon = 1e-3));
            }
        }
    }
}
