//! RGB Image

use crate::math::*;

/// A plain RGB frame buffer, row major with the origin at the top-left.
#[derive(Clone, Debug, PartialEq)]
pub struct RgbImage {
    /// Image width.
    width: usize,

    /// Image height.
    height: usize,

    /// The pixels.
    pixels: Vec<[Float; 3]>,
}

impl RgbImage {
    /// Creates a new black `RgbImage`.
    ///
    /// * `width`  - Width of image.
    /// * `height` - Height of image.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            pixels: vec![[0.0; 3]; width * height],
        }
    }

    /// Creates a new `RgbImage` from pixel data.
    ///
    /// * `pixels` - RGB pixel data.
    /// * `width`  - Width of image.
    /// * `height` - Height of image.
    pub fn from_pixels(pixels: Vec<[Float; 3]>, width: usize, height: usize) -> Self {
        assert_eq!(width * height, pixels.len());
        Self { width, height, pixels }
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

    /// Returns the pixel at `(x, y)`.
    ///
    /// * `x` - Column.
    /// * `y` - Row.
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> [Float; 3] {
        debug_assert!(x < self.width && y < self.height);
        self.pixels[y * self.width + x]
    }

    /// Sets the pixel at `(x, y)`.
    ///
    /// * `x`   - Column.
    /// * `y`   - Row.
    /// * `rgb` - New value.
    #[inline]
    pub fn set(&mut self, x: usize, y: usize, rgb: [Float; 3]) {
        debug_assert!(x < self.width && y < self.height);
        self.pixels[y * self.width + x] = rgb;
    }

    /// Returns the channel average of the pixel at `(x, y)`.
    ///
    /// * `x` - Column.
    /// * `y` - Row.
    #[inline]
    pub fn average(&self, x: usize, y: usize) -> Float {
        let [r, g, b] = self.get(x, y);
        (r + g + b) / 3.0
    }
}
