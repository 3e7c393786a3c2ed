//! Sampling Knobs

use common::image::ScalarImage;
use common::math::*;

/// Sampling parameters the renderer reads for an iteration. A new snapshot
/// is published between iterations; the renderer never sees a partially
/// updated one.
#[derive(Clone, Debug, Default)]
pub struct SamplingKnobs {
    /// Number of light subpaths per iteration.
    pub num_light_paths: u32,

    /// Connections per camera vertex where no connection mask is set.
    pub num_connections: u32,

    /// Merging on or off for the whole image.
    pub merge_enabled: bool,

    /// Per-pixel merge probability.
    pub merge_mask: Option<ScalarImage>,

    /// Per-pixel fractional connection count.
    pub connect_mask: Option<ScalarImage>,
}

impl SamplingKnobs {
    /// Create a new `SamplingKnobs` without masks.
    ///
    /// * `num_light_paths` - Number of light subpaths.
    /// * `num_connections` - Connections per camera vertex.
    /// * `merge_enabled`   - Merging on or off.
    pub fn new(num_light_paths: u32, num_connections: u32, merge_enabled: bool) -> Self {
        Self {
            num_light_paths,
            num_connections,
            merge_enabled,
            merge_mask: None,
            connect_mask: None,
        }
    }

    /// Returns the merge probability at a pixel.
    ///
    /// * `x` - Column.
    /// * `y` - Row.
    pub fn merge_probability(&self, x: usize, y: usize) -> Float {
        if !self.merge_enabled {
            return 0.0;
        }
        self.merge_mask.as_ref().map_or(1.0, |mask| mask.get(x, y))
    }

    /// Returns the fractional connection count at a pixel.
    ///
    /// * `x` - Column.
    /// * `y` - Row.
    pub fn connection_count(&self, x: usize, y: usize) -> Float {
        self.connect_mask
            .as_ref()
            .map_or(self.num_connections as Float, |mask| mask.get(x, y))
    }

    /// Returns the number of connections to perform at a pixel. The
    /// fractional part of the mask value rounds up with equal probability.
    ///
    /// * `x` - Column.
    /// * `y` - Row.
    /// * `u` - Uniform random number in [0, 1).
    pub fn sample_connection_count(&self, x: usize, y: usize, u: Float) -> u32 {
        stochastic_round(self.connection_count(x, y), u)
    }

    /// Returns whether to merge at a pixel.
    ///
    /// * `x` - Column.
    /// * `y` - Row.
    /// * `u` - Uniform random number in [0, 1).
    pub fn sample_merge(&self, x: usize, y: usize, u: Float) -> bool {
        u < self.merge_probability(x, y)
    }

    /// Returns `true` if merging has a probability above `threshold` in any pixel.
    ///
    /// * `threshold` - Minimum merge probability.
    pub fn merges_anywhere(&self, threshold: Float) -> bool {
        if !self.merge_enabled {
            return false;
        }
        match &self.merge_mask {
            Some(mask) => mask.to_vec().iter().any(|&p| p > threshold),
            None => 1.0 > threshold,
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_merging_ignores_the_mask() {
        let mut knobs = SamplingKnobs::new(100, 1, false);
        knobs.merge_mask = Some(ScalarImage::filled(2, 2, 1.0));
        assert_eq!(knobs.merge_probability(1, 1), 0.0);
        assert!(!knobs.sample_merge(1, 1, 0.0));
        assert!(!knobs.merges_anywhere(0.1));
    }

    #[test]
    fn masks_override_global_values() {
        let mut knobs = SamplingKnobs::new(100, 2, true);
        assert_eq!(knobs.merge_probability(0, 0), 1.0);
        assert_eq!(knobs.connection_count(0, 0), 2.0);

        knobs.merge_mask = Some(ScalarImage::from_values(&[0.0, 0.05, 0.5, 1.0], 2, 2));
        knobs.connect_mask = Some(ScalarImage::from_values(&[0.0, 1.5, 3.0, 4.0], 2, 2));
        assert_eq!(knobs.merge_probability(1, 0), 0.05);
        assert_eq!(knobs.connection_count(1, 0), 1.5);
        assert_eq!(knobs.sample_connection_count(1, 0, 0.25), 2);
        assert_eq!(knobs.sample_connection_count(1, 0, 0.75), 1);
        assert!(knobs.sample_merge(0, 1, 0.4));
        assert!(!knobs.sample_merge(0, 1, 0.6));
        assert!(knobs.merges_anywhere(0.1));
    }
}
