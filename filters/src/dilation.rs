//! Dilation

use crate::separable::*;
use common::image::ScalarImage;
use common::math::*;

/// Grayscale dilation: every pixel of `dst` receives the maximum of `src`
/// over the square neighbourhood of the given radius.
///
/// * `src`    - Source image, read only.
/// * `dst`    - Destination image with the same size as `src`.
/// * `radius` - Neighbourhood radius in pixels.
pub fn dilation(src: &ScalarImage, dst: &mut ScalarImage, radius: usize) {
    assert!(
        src.same_size(dst),
        "dilation(): source {}x{} and destination {}x{} differ",
        src.width(),
        src.height(),
        dst.width(),
        dst.height()
    );

    if radius == 0 {
        copy_into(src, dst);
        return;
    }

    let tmp = ScalarImage::new(src.width(), src.height());
    horizontal_pass(src, &tmp, |line, out| max_line(line, out, radius));
    vertical_pass(&tmp, dst, |line, out| max_line(line, out, radius));
}

fn max_line(line: &[Float], out: &mut [Float], radius: usize) {
    let last = line.len() - 1;
    for (i, o) in out.iter_mut().enumerate() {
        let lo = i.saturating_sub(radius);
        let hi = min(i + radius, last);
        *o = line[lo..=hi].iter().copied().fold(-INFINITY, max);
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
