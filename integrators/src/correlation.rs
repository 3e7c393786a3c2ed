//! Correlation-aware merge weighting.

use common::math::*;

/// Sampling densities along a complete path, indexed from the vertex next
/// to the camera (0) to the vertex on the emitter (`num_pdfs() - 1`).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BidirPathPdfs {
    /// Density of sampling vertex `i` when tracing from the camera.
    pub camera_to_light: Vec<Float>,

    /// Density of sampling vertex `i` when tracing from the light.
    pub light_to_camera: Vec<Float>,
}

impl BidirPathPdfs {
    /// Create a new `BidirPathPdfs`.
    ///
    /// * `camera_to_light` - Densities of sampling from the camera side.
    /// * `light_to_camera` - Densities of sampling from the light side.
    pub fn new(camera_to_light: Vec<Float>, light_to_camera: Vec<Float>) -> Self {
        assert_eq!(
            camera_to_light.len(),
            light_to_camera.len(),
            "BidirPathPdfs::new(): pdf sequences differ in length"
        );
        Self {
            camera_to_light,
            light_to_camera,
        }
    }

    /// Returns the number of pdfs, i.e. the number of path vertices
    /// excluding the camera.
    #[inline]
    pub fn num_pdfs(&self) -> usize {
        self.camera_to_light.len()
    }
}

/// Returns the radius used for correlation estimates, proportional to the
/// distance of the primary hit (one degree of view angle).
///
/// * `dist_to_cam` - Distance between the camera and the primary hit.
#[inline]
pub fn correlation_radius(dist_to_cam: Float) -> Float {
    dist_to_cam * (PI / 180.0).tan()
}

/// Per-vertex correction ratios for merges. The balance heuristic treats
/// all merges as independent samples, which over-counts merges whose
/// photons are strongly correlated. The ratio at a vertex estimates the
/// fraction of effectively independent merges there, in `(0, 1]`.
#[derive(Clone, Debug)]
pub struct PdfRatio {
    /// Cumulative acceptance probabilities gathered from the camera side.
    camera: Vec<Float>,

    /// Cumulative acceptance probabilities gathered from the light side.
    light: Vec<Float>,

    /// Number of light paths, 0 when merging is off.
    num_paths: u32,

    /// Always return 1 (classic balance heuristic).
    disabled: bool,
}

impl PdfRatio {
    /// Gathers the acceptance probability products along a path.
    ///
    /// * `pdfs`      - The path pdfs.
    /// * `radius`    - Radius of the acceptance disc.
    /// * `num_paths` - Number of light paths.
    pub fn new(pdfs: &BidirPathPdfs, radius: Float, num_paths: u32) -> Self {
        let num_surface_vertices = pdfs.num_pdfs().saturating_sub(1);
        let accept_area = disc_area(radius);

        let mut camera = vec![0.0; num_surface_vertices];
        let mut product = 1.0;
        for (i, c) in camera.iter_mut().enumerate() {
            product *= min(pdfs.camera_to_light[i] * accept_area, 1.0);
            *c = product;
        }

        let mut light = vec![0.0; num_surface_vertices];
        product = 1.0;
        for i in (0..num_surface_vertices).rev() {
            let mut next = pdfs.light_to_camera[i] * accept_area;
            if i == num_surface_vertices - 1 {
                // Photons on the first bounce also depend on the emitter area.
                next *= accept_area;
            }
            product *= min(next, 1.0);
            light[i] = product;
        }

        Self {
            camera,
            light,
            num_paths,
            disabled: false,
        }
    }

    /// Returns a ratio that is 1 everywhere.
    ///
    /// * `num_paths` - Number of light paths.
    pub fn disabled(num_paths: u32) -> Self {
        Self {
            camera: Vec::new(),
            light: Vec::new(),
            num_paths,
            disabled: true,
        }
    }

    /// Returns the ratio at vertex `idx`.
    ///
    /// * `idx` - Vertex index, counted from the camera.
    pub fn at(&self, idx: usize) -> Float {
        // Primary merges are not correlated.
        if idx == 0 || self.num_paths == 0 || self.disabled {
            return 1.0;
        }

        let cam = self.camera[idx];
        let light = self.light[idx];
        if cam == 0.0 && light == 0.0 {
            return 1.0;
        }

        let ratio = cam / (cam + light - cam * light);
        let ratio = max(ratio, 1.0 / self.num_paths as Float);
        debug_assert!(ratio.is_finite());
        ratio
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

    fn pdfs(c2l: &[Float], l2c: &[Float]) -> BidirPathPdfs {
        BidirPathPdfs::new(c2l.to_vec(), l2c.to_vec())
    }

    #[test]
    fn primary_vertex_ratio_is_one() {
        let p = pdfs(&[0.5, 0.5, 0.5, 0.5], &[0.5, 0.5, 0.5, 0.5]);
        assert_eq!(PdfRatio::new(&p, 0.1, 100).at(0), 1.0);
    }

    #[test]
    fn zero_light_paths_gives_one_everywhere() {
        let p = pdfs(&[2.0, 3.0, 4.0, 1.0], &[1.0, 2.0, 3.0, 1.0]);
        let r = PdfRatio::new(&p, 0.5, 0);
        assert!((0..3).all(|i| r.at(i) == 1.0));
    }

    #[test]
    fn disabled_ratio_is_one() {
        let r = PdfRatio::disabled(1000);
        assert_eq!(r.at(2), 1.0);
    }

    #[test]
    fn underflow_on_both_sides_gives_one() {
        let p = pdfs(&[0.0, 0.0, 0.0], &[0.0, 0.0, 0.0]);
        let r = PdfRatio::new(&p, 0.1, 10);
        assert_eq!(r.at(1), 1.0);
    }

    #[test]
    fn ratio_matches_hand_computed_value() {
        // Acceptance probabilities with area 1 (radius 1/sqrt(pi)).
        let radius = (1.0 / PI).sqrt();
        let p = pdfs(&[0.5, 0.5, 0.5], &[0.5, 0.5, 0.5]);
        let r = PdfRatio::new(&p, radius, 1_000_000);
        // Camera products are 0.5 then 0.25, light products 0.25 then 0.5.
        let cam: Float = 0.25;
        let light: Float = 0.5;
        let expected = cam / (cam + light - cam * light);
        assert!(approx_eq!(Float, r.at(1), expected, epsilon = 1e-5));
    }

    #[test]
    fn ratio_is_floored_at_inverse_path_count() {
        let p = pdfs(&[1e-9, 1e-9, 1e-9], &[1.0, 1.0, 1.0]);
        let r = PdfRatio::new(&p, 1.0, 10);
        assert!(approx_eq!(Float, r.at(1), 0.1));
    }

    proptest! {
        #[test]
        fn ratio_is_in_unit_interval(
            c2l in proptest::collection::vec(1e-4..1e4f32, 2..8),
            l2c_seed in 1e-4..1e4f32,
            radius in 1e-3..1.0f32,
            n in 1..1_000_000u32,
        ) {
            let l2c: Vec<Float> = c2l.iter().map(|v| v * l2c_seed / (1.0 + v)).collect();
            let p = BidirPathPdfs::new(c2l.clone(), l2c);
            let r = PdfRatio::new(&p, radius, n);
            for i in 0..p.num_pdfs() - 1 {
                let v = r.at(i);
                prop_assert!(v > 0.0 && v <= 1.0 + 1e-5, "ratio {} at {}", v, i);
            }
        }
    }
}
