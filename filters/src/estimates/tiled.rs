//! Tiled Estimates

use super::FilteredEstimates;
use common::image::ScalarImage;
use common::math::*;

/// Estimates averaged over square tiles. Values are accumulated per pixel
/// and averaged on `prepare`. When the image size is not a multiple of the
/// tile size, the last tile of each row and column grows to absorb the
/// leftover pixels so no tile is smaller than the nominal size.
pub struct TiledEstimates {
    /// Accumulated per-pixel values.
    sums: ScalarImage,

    /// Tile averages computed by the last `prepare`.
    tiles: ScalarImage,

    /// Nominal tile edge length.
    tile_size: usize,
}

impl TiledEstimates {
    /// Create a new `TiledEstimates`.
    ///
    /// * `width`     - Image width.
    /// * `height`    - Image height.
    /// * `tile_size` - Tile edge length in pixels.
    pub fn new(width: usize, height: usize, tile_size: usize) -> Self {
        assert!(tile_size > 0, "TiledEstimates::new(): tile size must be positive");
        let tiles_x = max(width / tile_size, 1);
        let tiles_y = max(height / tile_size, 1);
        Self {
            sums: ScalarImage::new(width, height),
            tiles: ScalarImage::new(tiles_x, tiles_y),
            tile_size,
        }
    }

    /// Returns the tile coordinate covering image coordinate `p`.
    #[inline]
    fn tile_index(&self, p: usize, num_tiles: usize) -> usize {
        min(p / self.tile_size, num_tiles - 1)
    }

    /// Returns the extent of tile `t` along an axis with `extent` pixels.
    #[inline]
    fn tile_extent(&self, t: usize, num_tiles: usize, extent: usize) -> usize {
        if t == num_tiles - 1 {
            extent - t * self.tile_size
        } else {
            self.tile_size
        }
    }
}

impl FilteredEstimates for TiledEstimates {
    fn atomic_add(&self, x: usize, y: usize, value: Float) {
        self.sums.atomic_add(x, y, value);
    }

    fn prepare(&mut self) {
        let (nx, ny) = (self.tiles.width(), self.tiles.height());
        let (width, height) = (self.sums.width(), self.sums.height());

        self.tiles.fill(0.0);
        for y in 0..height {
            let ty = self.tile_index(y, ny);
            for x in 0..width {
                let tx = self.tile_index(x, nx);
                self.tiles.atomic_add(tx, ty, self.sums.get(x, y));
            }
        }

        for ty in 0..ny {
            for tx in 0..nx {
                let area = self.tile_extent(tx, nx, width) * self.tile_extent(ty, ny, height);
                self.tiles.set(tx, ty, self.tiles.get(tx, ty) / area as Float);
            }
        }
    }

    fn query(&self, x: usize, y: usize) -> Float {
        let tx = self.tile_index(x, self.tiles.width());
        let ty = self.tile_index(y, self.tiles.height());
        self.tiles.get(tx, ty)
    }

    fn unfiltered(&self, x: usize, y: usize) -> Float {
        self.sums.get(x, y)
    }

    fn scale(&mut self, s: Float) {
        self.sums.scale(s);
    }

    fn to_image(&self) -> ScalarImage {
        let img = ScalarImage::new(self.sums.width(), self.sums.height());
        for y in 0..img.height() {
            for x in 0..img.width() {
                img.set(x, y, self.query(x, y));
            }
        }
        img
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
    fn query_returns_tile_average() {
        let mut e = TiledEstimates::new(8, 8, 4);
        e.atomic_add(0, 0, 8.0);
        e.atomic_add(3, 3, 8.0);
        e.prepare();
        assert!(approx_eq!(Float, e.query(1, 2), 1.0));
        assert!(approx_eq!(Float, e.query(5, 5), 0.0));
    }

    #[test]
    fn boundary_tile_grows_to_absorb_leftovers() {
        // 10 pixels with tiles of 4: tiles cover [0, 4) and [4, 10).
        let mut e = TiledEstimates::new(10, 1, 4);
        for x in 4..10 {
            e.atomic_add(x, 0, 1.0);
        }
        e.prepare();
        // The image is shorter than a tile so the single tile row spans it.
        assert!(approx_eq!(Float, e.query(9, 0), 1.0));
        assert!(approx_eq!(Float, e.query(4, 0), 1.0));
        assert!(approx_eq!(Float, e.query(0, 0), 0.0));
    }

    #[test]
    fn image_smaller_than_a_tile_uses_one_tile() {
        let mut e = TiledEstimates::new(3, 2, 8);
        e.atomic_add(2, 1, 6.0);
        e.prepare();
        assert!(approx_eq!(Float, e.query(0, 0), 1.0));
    }

    #[test]
    fn unfiltered_keeps_per_pixel_values() {
        let mut e = TiledEstimates::new(8, 8, 4);
        e.atomic_add(1, 2, 16.0);
        e.prepare();
        assert!(approx_eq!(Float, e.query(0, 0), 1.0));
        assert_eq!(e.unfiltered(1, 2), 16.0);
        assert_eq!(e.unfiltered(0, 0), 0.0);
    }

    #[test]
    fn prepare_does_not_consume_accumulated_values() {
        let mut e = TiledEstimates::new(4, 4, 2);
        e.atomic_add(0, 0, 4.0);
        e.prepare();
        e.atomic_add(1, 1, 4.0);
        e.prepare();
        assert!(approx_eq!(Float, e.query(0, 1), 2.0));
        e.scale(0.5);
        e.prepare();
        assert!(approx_eq!(Float, e.query(1, 0), 1.0));
    }

    proptest! {
        #[test]
        fn query_equals_tile_mean_of_added_values(
            w in 1..40usize,
            h in 1..40usize,
            tile_size in 1..9usize,
            value in 0.0..10.0f32,
        ) {
            let mut e = TiledEstimates::new(w, h, tile_size);
            for y in 0..h {
                for x in 0..w {
                    e.atomic_add(x, y, value);
                }
            }
            e.prepare();
            for y in 0..h {
                for x in 0..w {
                    prop_assert!(approx_eq!(Float, e.query(x, y), value, epsilon = 1e-2));
                }
            }
        }
    }
}
