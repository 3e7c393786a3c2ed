//! Scalar Image

use super::RgbImage;
use crate::math::*;
use crate::parallel::AtomicFloat;

/// A single channel floating point image. Every pixel is an `AtomicFloat` so
/// concurrent sample callbacks can splat into the same buffer through a
/// shared reference. Whole-image operations that take `&mut self` must not
/// overlap with splatting.
#[derive(Clone, Default)]
pub struct ScalarImage {
    /// Image width.
    width: usize,

    /// Image height.
    height: usize,

    /// Pixel values, row major.
    data: Vec<AtomicFloat>,
}

impl ScalarImage {
    /// Creates a new `ScalarImage` with all pixels set to 0.
    ///
    /// * `width`  - Width of image.
    /// * `height` - Height of image.
    pub fn new(width: usize, height: usize) -> Self {
        Self::filled(width, height, 0.0)
    }

    /// Creates a new `ScalarImage` with all pixels set to `value`.
    ///
    /// * `width`  - Width of image.
    /// * `height` - Height of image.
    /// * `value`  - Initial value.
    pub fn filled(width: usize, height: usize, value: Float) -> Self {
        Self {
            width,
            height,
            data: (0..width * height).map(|_| AtomicFloat::new(value)).collect(),
        }
    }

    /// Creates a new `ScalarImage` from row-major values.
    ///
    /// * `values` - Pixel values.
    /// * `width`  - Width of image.
    /// * `height` - Height of image.
    pub fn from_values(values: &[Float], width: usize, height: usize) -> Self {
        assert_eq!(width * height, values.len());
        Self {
            width,
            height,
            data: values.iter().map(|&v| AtomicFloat::new(v)).collect(),
        }
    }

    /// Creates a new `ScalarImage` holding the per-pixel channel average of
    /// an RGB image.
    ///
    /// * `rgb` - The RGB image.
    pub fn from_rgb(rgb: &RgbImage) -> Self {
        let (width, height) = (rgb.width(), rgb.height());
        let values: Vec<Float> = (0..height)
            .flat_map(|y| (0..width).map(move |x| rgb.average(x, y)))
            .collect();
        Self::from_values(&values, rgb.width(), rgb.height())
    }

    /// Returns the image width.
    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns the image height.
    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Returns the number of pixels.
    #[inline]
    pub fn num_pixels(&self) -> usize {
        self.data.len()
    }

    #[inline]
    fn offset(&self, x: usize, y: usize) -> usize {
        assert!(x < self.width && y < self.height, "pixel ({x}, {y}) out of bounds");
        y * self.width + x
    }

    /// Returns the value at `(x, y)`.
    ///
    /// * `x` - Column.
    /// * `y` - Row.
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> Float {
        self.data[self.offset(x, y)].get()
    }

    /// Stores a value at `(x, y)`. Safe to call from several threads as long
    /// as they write disjoint pixels.
    ///
    /// * `x`     - Column.
    /// * `y`     - Row.
    /// * `value` - New value.
    #[inline]
    pub fn set(&self, x: usize, y: usize, value: Float) {
        self.data[self.offset(x, y)].set(value);
    }

    /// Atomically adds a value at `(x, y)`.
    ///
    /// * `x`     - Column.
    /// * `y`     - Row.
    /// * `value` - Value to add.
    #[inline]
    pub fn atomic_add(&self, x: usize, y: usize, value: Float) {
        self.data[self.offset(x, y)].add(value);
    }

    /// Multiplies every pixel by `s`.
    ///
    /// * `s` - Scale factor.
    pub fn scale(&mut self, s: Float) {
        for v in self.data.iter_mut() {
            let scaled = v.get() * s;
            v.set(scaled);
        }
    }

    /// Sets every pixel to `value`.
    ///
    /// * `value` - New value.
    pub fn fill(&mut self, value: Float) {
        self.data.iter_mut().for_each(|v| v.set(value));
    }

    /// Returns the sum of all pixels.
    pub fn sum(&self) -> f64 {
        self.data.iter().map(|v| v.get() as f64).sum()
    }

    /// Returns the mean of all pixels, or 0 for an empty image.
    pub fn mean(&self) -> Float {
        if self.data.is_empty() {
            0.0
        } else {
            (self.sum() / self.data.len() as f64) as Float
        }
    }

    /// Returns a snapshot of the pixel values, row major.
    pub fn to_vec(&self) -> Vec<Float> {
        self.data.iter().map(AtomicFloat::get).collect()
    }

    /// Returns `true` if both images have the same dimensions.
    ///
    /// * `other` - The other image.
    #[inline]
    pub fn same_size(&self, other: &ScalarImage) -> bool {
        self.width == other.width && self.height == other.height
    }
}

impl std::fmt::Debug for ScalarImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScalarImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::*;

    #[test]
    fn new_image_is_black() {
        let img = ScalarImage::new(3, 2);
        assert_eq!(img.num_pixels(), 6);
        assert!(img.to_vec().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn atomic_add_accumulates_and_scale_multiplies() {
        let mut img = ScalarImage::new(2, 2);
        img.atomic_add(1, 0, 2.0);
        img.atomic_add(1, 0, 3.0);
        img.scale(0.5);
        assert!(approx_eq!(Float, img.get(1, 0), 2.5));
        assert!(approx_eq!(Float, img.get(0, 1), 0.0));
    }

    #[test]
    fn from_rgb_averages_channels() {
        let mut rgb = RgbImage::new(2, 1);
        rgb.set(1, 0, [3.0, 6.0, 0.0]);
        let img = ScalarImage::from_rgb(&rgb);
        assert!(approx_eq!(Float, img.get(1, 0), 3.0));
        assert!(approx_eq!(Float, img.get(0, 0), 0.0));
    }

    #[test]
    #[should_panic]
    fn column_out_of_range_panics() {
        // Offset (2, 0) would still land inside the buffer.
        ScalarImage::new(2, 2).get(2, 0);
    }

    #[test]
    fn from_rgb_keeps_pixel_positions() {
        let mut rgb = RgbImage::new(3, 2);
        rgb.set(2, 1, [1.0, 2.0, 3.0]);
        rgb.set(0, 1, [9.0, 0.0, 0.0]);
        let img = ScalarImage::from_rgb(&rgb);
        assert!(approx_eq!(Float, img.get(2, 1), 2.0));
        assert!(approx_eq!(Float, img.get(0, 1), 3.0));
        assert!(approx_eq!(Float, img.get(1, 0), 0.0));
    }

    #[test]
    fn mean_of_filled_image_is_fill_value() {
        let mut img = ScalarImage::new(4, 4);
        img.fill(0.25);
        assert!(approx_eq!(Float, img.mean(), 0.25));
    }
}
