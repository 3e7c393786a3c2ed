//! Balance heuristic reciprocals and the MIS weights of the proxy strategy.

use crate::correlation::*;
use common::math::*;

/// Sample counts of a VCM configuration as seen by the balance heuristic.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TechniqueCounts {
    /// Number of light subpaths.
    pub num_light_paths: Float,

    /// Product of connection count and the probability of selecting a given
    /// light vertex for a connection.
    pub bidir_density: Float,

    /// Probability of merging.
    pub merge_probability: Float,

    /// Merges at the primary hit are enabled.
    pub merge_primary: bool,
}

/// Returns the sum of density ratios of all techniques that build the path
/// by continuing the camera subpath past `last_camera_vertex` towards the
/// camera, relative to the technique ending at `last_camera_vertex`.
///
/// Returns infinity if any camera side density along the way is 0, which
/// means the technique ending at `last_camera_vertex` cannot sample the path.
///
/// * `last_camera_vertex` - Index of the last camera subpath vertex.
/// * `pdfs`               - The path pdfs.
/// * `ratio`              - Correlation-aware merge correction.
/// * `counts`             - Technique sample counts.
/// * `radius`             - Merge radius.
pub fn camera_path_reciprocals(
    last_camera_vertex: usize,
    pdfs: &BidirPathPdfs,
    ratio: &PdfRatio,
    counts: &TechniqueCounts,
    radius: Float,
) -> Float {
    let accept_area = disc_area(radius);
    let mut sum_ri = 0.0;
    let mut ri = 1.0;
    for i in (1..=last_camera_vertex).rev() {
        if pdfs.camera_to_light[i] == 0.0 {
            return INFINITY;
        }

        // Merging at this vertex.
        sum_ri += ri
            * counts.num_light_paths
            * pdfs.light_to_camera[i]
            * accept_area
            * ratio.at(i)
            * counts.merge_probability;

        ri *= pdfs.light_to_camera[i] / pdfs.camera_to_light[i];

        // Connecting this vertex to its predecessor.
        sum_ri += ri * counts.bidir_density;
    }

    if pdfs.camera_to_light[0] == 0.0 {
        return INFINITY;
    }

    // Light tracing.
    sum_ri += ri * pdfs.light_to_camera[0] / pdfs.camera_to_light[0] * counts.num_light_paths;

    if counts.merge_primary {
        sum_ri += ri * counts.num_light_paths * pdfs.light_to_camera[0] * accept_area * counts.merge_probability;
    }

    debug_assert!(sum_ri.is_finite() && sum_ri >= 0.0);
    sum_ri
}

/// Returns the sum of density ratios of all techniques that build the path
/// by continuing the light subpath past `last_camera_vertex + 1` towards the
/// emitter. A `last_camera_vertex` of -1 means the whole path is a light
/// subpath (light tracing).
///
/// Returns infinity if any light side density along the way is 0.
///
/// * `last_camera_vertex` - Index of the last camera subpath vertex, or -1.
/// * `pdfs`               - The path pdfs.
/// * `ratio`              - Correlation-aware merge correction.
/// * `counts`             - Technique sample counts.
/// * `radius`             - Merge radius.
pub fn light_path_reciprocals(
    last_camera_vertex: isize,
    pdfs: &BidirPathPdfs,
    ratio: &PdfRatio,
    counts: &TechniqueCounts,
    radius: Float,
) -> Float {
    let accept_area = disc_area(radius);
    let num_pdfs = pdfs.num_pdfs();
    let first = (last_camera_vertex + 1).max(0) as usize;

    let mut sum_ri = 0.0;
    let mut ri = 1.0;
    for i in first..num_pdfs {
        if pdfs.light_to_camera[i] == 0.0 {
            return INFINITY;
        }

        // No merging on the emitter itself.
        if i < num_pdfs - 1 && (counts.merge_primary || i > 0) {
            sum_ri += ri
                * counts.num_light_paths
                * pdfs.camera_to_light[i]
                * accept_area
                * ratio.at(i)
                * counts.merge_probability;
        }

        ri *= pdfs.camera_to_light[i] / pdfs.light_to_camera[i];

        // Connections to the emitter are next event, counted below.
        if i + 2 < num_pdfs {
            sum_ri += ri * counts.bidir_density;
        }
    }

    // Next event and hitting the emitter.
    sum_ri += ri;

    debug_assert!(sum_ri.is_finite() && sum_ri >= 0.0);
    sum_ri
}

/// The fixed reference configuration whose MIS weights are computed for
/// every sample. Its light path count equals the pixel count.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ProxyStrategy {
    /// Number of light subpaths.
    pub num_light_paths: u32,

    /// Number of connections per camera vertex.
    pub num_connections: u32,

    /// Connection count times the light vertex selection probability.
    pub bidir_density: Float,

    /// Merges at the primary hit are enabled.
    pub merge_primary: bool,

    /// Correlation-aware merge weights are enabled.
    pub correlation_aware: bool,
}

/// Number of connections of the proxy strategy.
pub const PROXY_NUM_CONNECTIONS: u32 = 4;

/// Camera path length assumed before any statistics exist.
const INITIAL_PATH_LENGTH: Float = 5.0;

impl ProxyStrategy {
    /// Create a new `ProxyStrategy` for an image.
    ///
    /// * `num_pixels`        - Number of pixels.
    /// * `merge_primary`     - Merges at the primary hit are enabled.
    /// * `correlation_aware` - Use correlation-aware merge weights.
    pub fn new(num_pixels: usize, merge_primary: bool, correlation_aware: bool) -> Self {
        Self {
            num_light_paths: num_pixels as u32,
            num_connections: PROXY_NUM_CONNECTIONS,
            bidir_density: PROXY_NUM_CONNECTIONS as Float / INITIAL_PATH_LENGTH,
            merge_primary,
            correlation_aware,
        }
    }

    /// Updates the connection density from the observed path lengths. The
    /// selection probability of a light vertex is approximated from the
    /// average light path length, or the camera path length if no light
    /// paths were traced.
    ///
    /// * `avg_cam_len`   - Average camera subpath length, 0 if unknown.
    /// * `avg_light_len` - Average light subpath length, 0 if none were traced.
    pub fn update_density(&mut self, avg_cam_len: Float, avg_light_len: Float) {
        let c = self.num_connections as Float;
        self.bidir_density = if avg_cam_len == 0.0 {
            c / INITIAL_PATH_LENGTH
        } else if avg_light_len == 0.0 {
            c / avg_cam_len
        } else {
            c / avg_light_len
        };
    }

    /// Returns the correlation ratios of the proxy strategy for a path.
    ///
    /// * `pdfs`        - The path pdfs.
    /// * `dist_to_cam` - Distance between the camera and the primary hit.
    pub fn pdf_ratio(&self, pdfs: &BidirPathPdfs, dist_to_cam: Float) -> PdfRatio {
        if self.correlation_aware {
            PdfRatio::new(pdfs, correlation_radius(dist_to_cam), self.num_light_paths)
        } else {
            PdfRatio::disabled(self.num_light_paths)
        }
    }

    fn counts(&self) -> TechniqueCounts {
        TechniqueCounts {
            num_light_paths: self.num_light_paths as Float,
            bidir_density: self.bidir_density,
            merge_probability: 1.0,
            merge_primary: self.merge_primary,
        }
    }
}

/// MIS weights a path would receive under the proxy strategy, summed per
/// technique family.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct ProxyWeights {
    /// Next event plus hitting the emitter.
    pub path_tracing: Float,

    /// All bidirectional connections.
    pub connections: Float,

    /// Light tracing.
    pub light_tracing: Float,

    /// All merges.
    pub merges: Float,

    /// All merges, each weighted by its correlation ratio.
    pub merges_correlated: Float,
}

impl ProxyWeights {
    /// Computes the proxy weights of a path. The connection weight is the
    /// residual `1 - others`, clamped to `[0, 1]`.
    ///
    /// * `pdfs`   - The path pdfs.
    /// * `ratio`  - Correlation ratios of the proxy strategy.
    /// * `proxy`  - The proxy strategy.
    /// * `radius` - Merge radius at the path vertices.
    pub fn compute(pdfs: &BidirPathPdfs, ratio: &PdfRatio, proxy: &ProxyStrategy, radius: Float) -> Self {
        let num_pdfs = pdfs.num_pdfs();
        assert!(num_pdfs >= 2, "ProxyWeights::compute(): path needs at least two pdfs");

        let counts = proxy.counts();
        let n = counts.num_light_paths;

        // An infinite reciprocal sum gives the technique a weight of 0.
        let pt = if pdfs.camera_to_light[num_pdfs - 1] == 0.0 {
            0.0
        } else {
            let pt_recip = camera_path_reciprocals(num_pdfs - 2, pdfs, ratio, &counts, radius);
            1.0 / (1.0 + pt_recip / pdfs.camera_to_light[num_pdfs - 1])
        };

        let lt_recip = light_path_reciprocals(-1, pdfs, ratio, &counts, radius);
        let lt = 1.0 / (1.0 + lt_recip / n);

        let (vm, vm_cov) = merge_weights(pdfs, ratio, &counts, radius);

        Self {
            path_tracing: pt,
            connections: clamp(1.0 - pt - lt - vm, 0.0, 1.0),
            light_tracing: lt,
            merges: vm,
            merges_correlated: vm_cov,
        }
    }

    /// Returns the sum of the four technique families.
    pub fn total(&self) -> Float {
        self.path_tracing + self.connections + self.light_tracing + self.merges
    }
}

/// Returns the sum of the proxy MIS weights of all merges along the path,
/// and the same sum with each weight scaled by its correlation ratio.
fn merge_weights(pdfs: &BidirPathPdfs, ratio: &PdfRatio, counts: &TechniqueCounts, radius: Float) -> (Float, Float) {
    let num_pdfs = pdfs.num_pdfs();
    let accept_area = disc_area(radius);

    let mut sum = 0.0;
    let mut sum_cov = 0.0;
    for i in 1..num_pdfs - 1 {
        let r = ratio.at(i);
        let merge_approx = pdfs.light_to_camera[i] * accept_area * counts.num_light_paths * r;

        if merge_approx == 0.0 {
            continue;
        }

        let cam = camera_path_reciprocals(i, pdfs, ratio, counts, radius);
        let light = light_path_reciprocals(i as isize, pdfs, ratio, counts, radius);
        let mut sum_ri = cam / merge_approx + light / merge_approx;

        // The connection that replaces the last light subpath edge.
        if num_pdfs - i > 1 {
            sum_ri += counts.bidir_density / merge_approx;
        }

        debug_assert!(sum_ri > 0.0);
        sum += 1.0 / sum_ri;
        sum_cov += r / sum_ri;
    }
    (sum, sum_cov)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::*;
    use proptest::prelude::*;

    fn proxy() -> ProxyStrategy {
        ProxyStrategy::new(64 * 64, false, true)
    }

    #[test]
    fn direct_illumination_without_bidirectional_options_is_path_tracing() {
        // Light side density is 0: no light tracing, no merges.
        let pdfs = BidirPathPdfs::new(vec![1.0, 2.0], vec![0.0, 1.0]);
        let p = proxy();
        let w = ProxyWeights::compute(&pdfs, &p.pdf_ratio(&pdfs, 1.0), &p, 0.01);
        assert_eq!(w.path_tracing, 1.0);
        assert_eq!(w.light_tracing, 0.0);
        assert_eq!(w.merges, 0.0);
        assert_eq!(w.connections, 0.0);
    }

    #[test]
    fn light_tracing_weight_follows_balance_heuristic() {
        // Two pdfs: camera-side 1 everywhere, light side 1 everywhere.
        let pdfs = BidirPathPdfs::new(vec![1.0, 1.0], vec![1.0, 1.0]);
        let p = proxy();
        let ratio = p.pdf_ratio(&pdfs, 1.0);
        let counts = p.counts();

        // Light reciprocals: ri becomes 1 after the primary vertex, then
        // 1 after the emitter, plus next event.
        let lt_recip = light_path_reciprocals(-1, &pdfs, &ratio, &counts, 0.0);
        assert!(approx_eq!(Float, lt_recip, 1.0));

        let w = ProxyWeights::compute(&pdfs, &ratio, &p, 0.0);
        let n = p.num_light_paths as Float;
        assert!(approx_eq!(Float, w.light_tracing, 1.0 / (1.0 + 1.0 / n)));
    }

    #[test]
    fn zero_light_side_density_disables_light_tracing() {
        let pdfs = BidirPathPdfs::new(vec![1.0, 1.0, 1.0, 1.0], vec![1.0, 0.0, 1.0, 1.0]);
        let p = ProxyStrategy::new(4096, false, true);
        let w = ProxyWeights::compute(&pdfs, &p.pdf_ratio(&pdfs, 1.0), &p, 0.01);
        assert_eq!(w.light_tracing, 0.0);
        assert!(w.path_tracing > 0.0);
        assert!(approx_eq!(Float, w.total(), 1.0, epsilon = 1e-3));
    }

    #[test]
    fn zero_camera_side_density_disables_path_tracing() {
        let pdfs = BidirPathPdfs::new(vec![1.0, 0.0, 1.0, 1.0], vec![1.0, 1.0, 1.0, 1.0]);
        let p = ProxyStrategy::new(4096, false, true);
        let w = ProxyWeights::compute(&pdfs, &p.pdf_ratio(&pdfs, 1.0), &p, 0.01);
        assert_eq!(w.path_tracing, 0.0);
        assert_eq!(w.merges, 0.0);
        assert!(w.light_tracing > 0.99);
        assert!(approx_eq!(Float, w.total(), 1.0, epsilon = 1e-3));
    }

    #[test]
    fn zero_emitter_density_disables_path_tracing() {
        let pdfs = BidirPathPdfs::new(vec![1.0, 1.0, 0.0], vec![1.0, 1.0, 1.0]);
        let p = proxy();
        let w = ProxyWeights::compute(&pdfs, &p.pdf_ratio(&pdfs, 1.0), &p, 0.01);
        assert_eq!(w.path_tracing, 0.0);
        assert!(approx_eq!(Float, w.total(), 1.0, epsilon = 1e-3));
    }

    #[test]
    fn density_falls_back_to_camera_length_then_constant() {
        let mut p = proxy();
        p.update_density(0.0, 0.0);
        assert!(approx_eq!(Float, p.bidir_density, 0.8));
        p.update_density(2.0, 0.0);
        assert!(approx_eq!(Float, p.bidir_density, 2.0));
        p.update_density(2.0, 8.0);
        assert!(approx_eq!(Float, p.bidir_density, 0.5));
    }

    proptest! {
        #[test]
        fn proxy_weights_sum_to_one(
            c2l in proptest::collection::vec(prop_oneof![1 => Just(0.0f32), 4 => 0.05..20.0f32], 2..7),
            l2c in proptest::collection::vec(prop_oneof![1 => Just(0.0f32), 4 => 0.05..20.0f32], 7),
            radius in 1e-3..0.1f32,
            dist in 0.1..10.0f32,
            correlation_aware in any::<bool>(),
        ) {
            let l2c = l2c[..c2l.len()].to_vec();
            let pdfs = BidirPathPdfs::new(c2l, l2c);
            let p = ProxyStrategy::new(128 * 128, false, correlation_aware);
            let w = ProxyWeights::compute(&pdfs, &p.pdf_ratio(&pdfs, dist), &p, radius);

            prop_assert!(w.path_tracing.is_finite() && w.light_tracing.is_finite());
            prop_assert!(w.path_tracing >= 0.0 && w.light_tracing >= 0.0);
            prop_assert!(w.merges >= 0.0 && w.connections >= 0.0);
            prop_assert!(w.merges_correlated <= w.merges + 1e-5);
            let total = w.total();
            prop_assert!((1.0 - 1e-3..=1.0 + 1e-3).contains(&total), "total {}", total);
        }
    }
}
