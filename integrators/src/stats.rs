//! Path Statistics

use common::math::Float;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counters of path lengths and merge activity, reset at the start
/// of every iteration.
#[derive(Debug, Default)]
pub struct PathStatistics {
    total_camera_path_length: AtomicU64,
    num_light_paths: AtomicU64,
    total_light_path_length: AtomicU64,
    num_merge_queries: AtomicU64,
    num_merged_photons: AtomicU64,
}

/// Averages derived from `PathStatistics` after an iteration.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct PathAverages {
    /// Average number of edges per camera subpath, 0 if none were recorded.
    pub camera_path_length: Float,

    /// Average number of edges per light subpath, 0 if none were traced.
    pub light_path_length: Float,

    /// Average number of photons found by a merge query, 0 without queries.
    pub photons_per_query: Float,
}

impl PathStatistics {
    /// Records a terminated camera subpath.
    ///
    /// * `num_vertices` - Number of vertices along the subpath.
    pub fn record_camera_path(&self, num_vertices: usize) {
        self.total_camera_path_length
            .fetch_add(num_vertices as u64, Ordering::Relaxed);
    }

    /// Records a traced light subpath.
    ///
    /// * `num_vertices` - Number of vertices along the subpath.
    pub fn record_light_path(&self, num_vertices: usize) {
        self.num_light_paths.fetch_add(1, Ordering::Relaxed);
        self.total_light_path_length
            .fetch_add(num_vertices as u64, Ordering::Relaxed);
    }

    /// Records one photon map query.
    pub fn record_merge_query(&self) {
        self.num_merge_queries.fetch_add(1, Ordering::Relaxed);
    }

    /// Records one photon found by a query.
    pub fn record_merged_photon(&self) {
        self.num_merged_photons.fetch_add(1, Ordering::Relaxed);
    }

    /// Resets all counters.
    pub fn reset(&self) {
        self.total_camera_path_length.store(0, Ordering::Relaxed);
        self.num_light_paths.store(0, Ordering::Relaxed);
        self.total_light_path_length.store(0, Ordering::Relaxed);
        self.num_merge_queries.store(0, Ordering::Relaxed);
        self.num_merged_photons.store(0, Ordering::Relaxed);
    }

    /// Returns the averages of the current counters. One camera subpath is
    /// traced per pixel.
    ///
    /// * `num_pixels` - Number of pixels.
    pub fn averages(&self, num_pixels: usize) -> PathAverages {
        let ratio = |num: u64, den: u64| if den == 0 { 0.0 } else { (num as f64 / den as f64) as Float };
        PathAverages {
            camera_path_length: ratio(
                self.total_camera_path_length.load(Ordering::Relaxed),
                num_pixels as u64,
            ),
            light_path_length: ratio(
                self.total_light_path_length.load(Ordering::Relaxed),
                self.num_light_paths.load(Ordering::Relaxed),
            ),
            photons_per_query: ratio(
                self.num_merged_photons.load(Ordering::Relaxed),
                self.num_merge_queries.load(Ordering::Relaxed),
            ),
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
