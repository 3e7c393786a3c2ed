//! Separable passes shared by the spatial filters.

use common::image::ScalarImage;
use common::math::Float;
use common::parallel::parallel_for;

/// Applies a 1D operation to every row of `src`, writing into `dst`.
pub(crate) fn horizontal_pass<F>(src: &ScalarImage, dst: &ScalarImage, op: F)
where
    F: Fn(&[Float], &mut [Float]) + Sync,
{
    let (w, h) = (src.width(), src.height());
    if w == 0 {
        return;
    }
    parallel_for(h, 0, |y| {
        let line: Vec<Float> = (0..w).map(|x| src.get(x, y)).collect();
        let mut out = vec![0.0; w];
        op(&line, &mut out);
        for (x, v) in out.into_iter().enumerate() {
            dst.set(x, y, v);
        }
    });
}

/// Applies a 1D operation to every column of `src`, writing into `dst`.
pub(crate) fn vertical_pass<F>(src: &ScalarImage, dst: &ScalarImage, op: F)
where
    F: Fn(&[Float], &mut [Float]) + Sync,
{
    let (w, h) = (src.width(), src.height());
    if h == 0 {
        return;
    }
    parallel_for(w, 0, |x| {
        let line: Vec<Float> = (0..h).map(|y| src.get(x, y)).collect();
        let mut out = vec![0.0; h];
        op(&line, &mut out);
        for (y, v) in out.into_iter().enumerate() {
            dst.set(x, y, v);
        }
    });
}

/// Copies every pixel of `src` into `dst`.
pub(crate) fn copy_into(src: &ScalarImage, dst: &mut ScalarImage) {
    for y in 0..src.height() {
        for x in 0..src.width() {
            dst.set(x, y, src.get(x, y));
        }
    }
}
