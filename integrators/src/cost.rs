//! Cost Model

use common::math::*;

/// Relative cost weights of the individual rendering operations. Calibrated
/// once against measured render times.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CostParameters {
    /// Continuing a light subpath by one edge, including the connection to
    /// the camera (light tracing).
    pub cost_light: Float,

    /// Continuing a camera subpath by one edge, including next event.
    pub cost_camera: Float,

    /// A single bidirectional connection (one shadow ray, two BSDF evaluations).
    pub cost_connect: Float,

    /// Shading one photon found by a merge query.
    pub cost_shade: Float,

    /// Traversing the photon map for one merge query.
    pub cost_query: Float,

    /// Inserting one photon into the photon map.
    pub cost_photon_build: Float,
}

impl Default for CostParameters {
    fn default() -> Self {
        Self {
            cost_light: 1.0,
            cost_camera: 1.0,
            cost_connect: 0.3,
            cost_shade: 0.65,
            cost_query: 0.3,
            cost_photon_build: 0.1,
        }
    }
}

/// Analytical per-pixel cost of a sampling configuration, parameterized by
/// `CostParameters` and live scene statistics.
#[derive(Clone, Debug, PartialEq)]
pub struct CostModel {
    /// Hyper-parameters.
    params: CostParameters,

    /// Number of pixels, i.e. camera subpaths per iteration.
    num_pixels: Float,

    /// Average number of edges along the camera subpaths.
    avg_cam_len: Float,

    /// Average number of edges along the light subpaths.
    avg_light_len: Float,

    /// Average number of photons found per query, per light subpath.
    avg_photons_per_query_per_path: Float,
}

/// Used when no light subpaths or no merges were observed.
const INITIAL_PHOTONS_PER_QUERY_PER_PATH: Float = 1e-7;

/// Used when no camera subpath lengths were observed.
const INITIAL_CAMERA_PATH_LENGTH: Float = 5.0;

impl CostModel {
    /// Create a new `CostModel` with initial guesses for the statistics.
    ///
    /// * `params` - Hyper-parameters.
    pub fn new(params: CostParameters) -> Self {
        Self {
            params,
            num_pixels: 1.0,
            avg_cam_len: INITIAL_CAMERA_PATH_LENGTH,
            avg_light_len: INITIAL_CAMERA_PATH_LENGTH,
            avg_photons_per_query_per_path: INITIAL_PHOTONS_PER_QUERY_PER_PATH,
        }
    }

    /// Updates the scene statistics. Call once per iteration, before any
    /// `evaluate_per_pixel` calls for that iteration.
    ///
    /// * `num_pixels`            - Number of pixels.
    /// * `num_light_paths`       - Light subpaths traced by the current configuration.
    /// * `avg_cam_len`           - Average camera subpath length.
    /// * `avg_light_len`         - Average light subpath length, 0 if none were recorded.
    /// * `avg_photons_per_query` - Average number of photons found by a merge query.
    pub fn update_stats(
        &mut self,
        num_pixels: usize,
        num_light_paths: u32,
        avg_cam_len: Float,
        avg_light_len: Float,
        avg_photons_per_query: Float,
    ) {
        self.num_pixels = max(num_pixels as Float, 1.0);
        self.avg_cam_len = if avg_cam_len == 0.0 {
            INITIAL_CAMERA_PATH_LENGTH
        } else {
            avg_cam_len
        };
        self.avg_light_len = if num_light_paths == 0 || avg_light_len == 0.0 {
            self.avg_cam_len
        } else {
            avg_light_len
        };
        self.avg_photons_per_query_per_path = if num_light_paths == 0 || avg_photons_per_query == 0.0 {
            INITIAL_PHOTONS_PER_QUERY_PER_PATH
        } else {
            avg_photons_per_query / num_light_paths as Float
        };
    }

    /// Evaluates the cost of one pixel. Global work (tracing light subpaths,
    /// building the photon map) is amortized over all pixels.
    ///
    /// * `num_light_paths`   - Number of light subpaths.
    /// * `num_connections`   - Number of connections per camera vertex.
    /// * `merge_probability` - Probability of merging in this pixel.
    /// * `disable_merge`     - Excludes the photon map build and all merge costs.
    pub fn evaluate_per_pixel(
        &self,
        num_light_paths: Float,
        num_connections: Float,
        merge_probability: Float,
        disable_merge: bool,
    ) -> Float {
        let p = &self.params;

        // Light tracing, amortized.
        let mut cost = p.cost_light * self.avg_light_len * num_light_paths / self.num_pixels;

        // Path tracing with next event, then connections along the camera subpath.
        cost += self.avg_cam_len * p.cost_camera;
        cost += self.avg_cam_len * num_connections * p.cost_connect;

        if !disable_merge {
            let num_photons = num_light_paths * self.avg_light_len;
            let log_photons = if num_photons > 1.0 { num_photons.ln() } else { 0.0 };

            cost += p.cost_photon_build * num_photons * log_photons / self.num_pixels;
            cost += merge_probability
                * (p.cost_query * self.avg_cam_len * log_photons
                    + p.cost_shade * self.avg_photons_per_query_per_path * self.avg_cam_len * num_light_paths);
        }

        debug_assert!(cost.is_finite() && cost > 0.0, "invalid cost {cost}");
        cost
    }
}

impl Default for CostModel {
    fn default() -> Self {
        Self::new(CostParameters::default())
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

    fn model() -> CostModel {
        let mut m = CostModel::default();
        m.update_stats(640 * 480, 640 * 480, 4.0, 3.0, 20.0);
        m
    }

    #[test]
    fn path_tracing_costs_camera_length_times_camera_weight() {
        let m = model();
        assert!(approx_eq!(Float, m.evaluate_per_pixel(0.0, 0.0, 0.0, true), 4.0));
        assert!(approx_eq!(Float, m.evaluate_per_pixel(0.0, 0.0, 0.0, false), 4.0));
    }

    #[test]
    fn disable_merge_removes_build_cost() {
        let m = model();
        let n = 640.0 * 480.0;
        let with = m.evaluate_per_pixel(n, 0.0, 0.0, false);
        let without = m.evaluate_per_pixel(n, 0.0, 0.0, true);
        let photons = n * 3.0;
        assert!(approx_eq!(Float, with - without, 0.1 * photons * photons.ln() / n, epsilon = 1e-3));
    }

    #[test]
    fn missing_statistics_use_initial_guesses() {
        let mut m = CostModel::default();
        m.update_stats(100, 0, 0.0, 0.0, 0.0);
        // Average camera length falls back to 5, light length follows it.
        assert!(approx_eq!(Float, m.evaluate_per_pixel(0.0, 0.0, 0.0, true), 5.0));
        assert!(approx_eq!(Float, m.evaluate_per_pixel(100.0, 0.0, 0.0, true), 10.0));
    }

    proptest! {
        #[test]
        fn cost_is_positive_and_finite(
            n in 0.0..1e6f32,
            c in 0.0..16.0f32,
            m in 0.0..1.0f32,
            disable in any::<bool>(),
        ) {
            let cost = model().evaluate_per_pixel(n, c, m, disable);
            prop_assert!(cost.is_finite() && cost > 0.0);
        }

        #[test]
        fn cost_does_not_decrease_with_connections_or_merging(
            n in 0.0..1e6f32,
            c in 0.0..16.0f32,
            dc in 0.0..16.0f32,
            m in 0.0..1.0f32,
            dm in 0.0..1.0f32,
        ) {
            let model = model();
            let base = model.evaluate_per_pixel(n, c, m, false);
            prop_assert!(model.evaluate_per_pixel(n, c + dc, m, false) >= base);
            prop_assert!(model.evaluate_per_pixel(n, c, (m + dm).min(1.0), false) >= base);
        }
    }
}
