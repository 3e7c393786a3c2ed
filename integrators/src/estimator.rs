//! Proxy Moment Estimator

use crate::candidate::*;
use crate::correlation::*;
use crate::mis::*;
use common::image::ScalarImage;
use common::math::*;
use filters::*;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Sample counts of the configuration that rendered the current iteration,
/// at the pixel a sample contributes to.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PilotCounts {
    /// Number of light subpaths.
    pub num_light_paths: Float,

    /// Number of connections per camera vertex at this pixel.
    pub num_connections: Float,

    /// Merge probability at this pixel.
    pub merge_probability: Float,
}

/// One sample of any VCM technique, as reported by the renderer.
#[derive(Copy, Clone, Debug)]
pub struct PathSample<'a> {
    /// Unweighted RGB contribution.
    pub contribution: [Float; 3],

    /// MIS weight of the technique that produced the sample.
    pub mis_weight: Float,

    /// Sampling densities along the full path.
    pub pdfs: &'a BidirPathPdfs,

    /// Film position of the sample.
    pub pixel: (Float, Float),

    /// Merge radius used at the path vertices.
    pub merge_radius: Float,

    /// Distance between the camera and the primary hit.
    pub dist_to_cam: Float,
}

impl PathSample<'_> {
    /// Returns the MIS weighted contribution averaged over the channels.
    #[inline]
    pub fn weighted_average(&self) -> Float {
        let [r, g, b] = self.contribution;
        (r + g + b) / 3.0 * self.mis_weight
    }

    /// Returns `true` if the contribution is black.
    #[inline]
    pub fn is_black(&self) -> bool {
        self.contribution.iter().all(|&c| c == 0.0)
    }
}

/// Returns the factor that turns a squared contribution observed under the
/// pilot configuration into a second moment estimate for `candidate`.
///
/// The mixtures `a` and `c` weight the proxy MIS weights by the pilot and
/// candidate sample counts; `b` and `d` do the same with correlation-aware
/// merge weights. The factor is `a^2 d / (c^2 b)`.
///
/// * `weights`   - Proxy MIS weights of the sample.
/// * `proxy`     - The proxy strategy.
/// * `pilot`     - Sample counts that produced the sample.
/// * `candidate` - The candidate to estimate.
pub fn correction_factor(
    weights: &ProxyWeights,
    proxy: &ProxyStrategy,
    pilot: &PilotCounts,
    candidate: &Candidate,
) -> f64 {
    let pt = weights.path_tracing as f64;
    let lt = weights.light_tracing as f64 / proxy.num_light_paths as f64;
    let con = weights.connections as f64 / proxy.num_connections as f64;
    let vm = weights.merges as f64;
    let vm_cov = weights.merges_correlated as f64;

    let pilot_base = pt + lt * pilot.num_light_paths as f64 + con * pilot.num_connections as f64;
    let pilot_merge = pilot.merge_probability as f64;
    let a = pilot_base + vm * pilot_merge;
    let b = pilot_base + vm_cov * pilot_merge;

    let cand_base = pt + lt * candidate.num_light_paths as f64 + con * candidate.num_connections as f64;
    let cand_merge = candidate.merge_probability() as f64;
    let c = cand_base + vm * cand_merge;
    let d = cand_base + vm_cov * cand_merge;

    (a * a * d) / (c * c * b)
}

/// Accumulates second moment estimates of every candidate in one rendering
/// pass, by reweighting each sample with its correction factor.
pub struct ProxyMomentEstimator {
    /// Candidates and their moment buffers, in enumeration order.
    buffers: Vec<(Candidate, Box<dyn FilteredEstimates>)>,

    /// The proxy strategy.
    proxy: ProxyStrategy,

    /// Image width.
    width: usize,

    /// Image height.
    height: usize,

    /// Number of invalid correction factors seen since the last `prepare`.
    invalid_factors: AtomicUsize,
}

impl ProxyMomentEstimator {
    /// Allocates one moment buffer per candidate.
    ///
    /// * `candidates`        - The candidate set.
    /// * `filter`            - Estimate strategy for the buffers.
    /// * `width`             - Image width.
    /// * `height`            - Image height.
    /// * `merge_primary`     - Merges at the primary hit are enabled.
    /// * `correlation_aware` - Use correlation-aware merge weights.
    pub fn new(
        candidates: &CandidateSet,
        filter: EstimateFilter,
        width: usize,
        height: usize,
        merge_primary: bool,
        correlation_aware: bool,
    ) -> Self {
        assert!(!candidates.is_empty(), "ProxyMomentEstimator::new(): no candidates");
        let buffers = candidates
            .candidates()
            .iter()
            .map(|&c| (c, filter.create(width, height)))
            .collect();
        Self {
            buffers,
            proxy: ProxyStrategy::new(width * height, merge_primary, correlation_aware),
            width,
            height,
            invalid_factors: AtomicUsize::new(0),
        }
    }

    /// Wraps already accumulated moment images, e.g. loaded from disk.
    ///
    /// * `moments` - Candidates and their moment images, all the same size.
    pub fn from_images(moments: Vec<(Candidate, ScalarImage)>) -> Self {
        assert!(!moments.is_empty(), "ProxyMomentEstimator::from_images(): no candidates");
        let (width, height) = (moments[0].1.width(), moments[0].1.height());
        assert!(
            moments.iter().all(|(_, img)| img.width() == width && img.height() == height),
            "ProxyMomentEstimator::from_images(): moment images differ in size"
        );
        let buffers = moments
            .into_iter()
            .map(|(c, img)| (c, Box::new(RawEstimates::from_image(img)) as Box<dyn FilteredEstimates>))
            .collect();
        Self {
            buffers,
            proxy: ProxyStrategy::new(width * height, false, true),
            width,
            height,
            invalid_factors: AtomicUsize::new(0),
        }
    }

    /// Returns the image width.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns the image height.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Returns the candidates and their buffers.
    pub fn buffers(&self) -> &[(Candidate, Box<dyn FilteredEstimates>)] {
        &self.buffers
    }

    /// Returns the proxy strategy.
    pub fn proxy(&self) -> &ProxyStrategy {
        &self.proxy
    }

    /// Updates the connection density of the proxy from path statistics.
    ///
    /// * `avg_cam_len`   - Average camera subpath length, 0 if unknown.
    /// * `avg_light_len` - Average light subpath length, 0 if none were traced.
    pub fn update_path_lengths(&mut self, avg_cam_len: Float, avg_light_len: Float) {
        self.proxy.update_density(avg_cam_len, avg_light_len);
    }

    /// Adds the moment contribution of one sample to every candidate.
    /// Black samples are ignored.
    ///
    /// * `sample`        - The sample.
    /// * `kernel_weight` - Photon kernel value for merges, otherwise 1.
    /// * `pilot`         - Sample counts that produced the sample.
    /// * `sample_scale`  - Running mean weight of the current iteration.
    pub fn add_sample(&self, sample: &PathSample, kernel_weight: Float, pilot: &PilotCounts, sample_scale: Float) {
        if sample.is_black() {
            return;
        }

        let x = min(sample.pixel.0.max(0.0) as usize, self.width - 1);
        let y = min(sample.pixel.1.max(0.0) as usize, self.height - 1);

        let ratio = self.proxy.pdf_ratio(sample.pdfs, sample.dist_to_cam);
        let weights = ProxyWeights::compute(sample.pdfs, &ratio, &self.proxy, sample.merge_radius);

        let avg = sample.weighted_average() as f64;
        let w2 = avg * avg * kernel_weight as f64 * sample_scale as f64;

        for (candidate, buffer) in self.buffers.iter() {
            let factor = correction_factor(&weights, &self.proxy, pilot, candidate);
            debug_assert!(
                factor.is_finite() && factor > 0.0,
                "invalid correction factor {factor} for {candidate}: {weights:?} {pilot:?}"
            );
            if !(factor.is_finite() && factor > 0.0) {
                self.invalid_factors.fetch_add(1, Ordering::Relaxed);
                continue;
            }
            buffer.atomic_add(x, y, (factor * w2) as Float);
        }
    }

    /// Filters all moment buffers. Call after accumulation has finished and
    /// before querying.
    pub fn prepare(&mut self) {
        let invalid = self.invalid_factors.swap(0, Ordering::Relaxed);
        if invalid > 0 {
            warn!("Skipped {invalid} moment updates with invalid correction factors");
        }
        for (_, buffer) in self.buffers.iter_mut() {
            buffer.prepare();
        }
    }

    /// Multiplies all accumulated moments by `s`.
    ///
    /// * `s` - Scale factor.
    pub fn scale(&mut self, s: Float) {
        for (_, buffer) in self.buffers.iter_mut() {
            buffer.scale(s);
        }
    }

    /// Returns one named image per candidate.
    pub fn to_layers(&self) -> Vec<(String, ScalarImage)> {
        self.buffers
            .iter()
            .map(|(c, buffer)| (c.to_string(), buffer.to_image()))
            .collect()
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

    fn weights() -> ProxyWeights {
        ProxyWeights {
            path_tracing: 0.4,
            connections: 0.2,
            light_tracing: 0.1,
            merges: 0.3,
            merges_correlated: 0.15,
        }
    }

    fn proxy() -> ProxyStrategy {
        ProxyStrategy::new(1000, false, true)
    }

    #[test]
    fn factor_is_one_when_candidate_matches_pilot_without_correlation() {
        let mut w = weights();
        w.merges_correlated = w.merges;
        let pilot = PilotCounts {
            num_light_paths: 500.0,
            num_connections: 2.0,
            merge_probability: 1.0,
        };
        let f = correction_factor(&w, &proxy(), &pilot, &Candidate::new(500, 2, true));
        assert!(approx_eq!(f64, f, 1.0, epsilon = 1e-9));
    }

    #[test]
    fn factor_matches_closed_form() {
        let w = weights();
        let pilot = PilotCounts {
            num_light_paths: 1000.0,
            num_connections: 4.0,
            merge_probability: 1.0,
        };
        let candidate = Candidate::PATH_TRACING;
        let a = 0.4 + 0.1 + 0.2 + 0.3;
        let b = 0.4 + 0.1 + 0.2 + 0.15;
        let c = 0.4;
        let d = 0.4;
        let expected = a * a * d / (c * c * b);
        let f = correction_factor(&w, &proxy(), &pilot, &candidate);
        assert!(approx_eq!(f64, f, expected, epsilon = 1e-6));
    }

    #[test]
    fn black_samples_are_ignored() {
        let set = CandidateSet::new(16, &[1.0], &[0, 1]);
        let mut est = ProxyMomentEstimator::new(&set, EstimateFilter::Raw, 4, 4, false, true);
        let pdfs = BidirPathPdfs::new(vec![1.0, 1.0], vec![1.0, 1.0]);
        let sample = PathSample {
            contribution: [0.0; 3],
            mis_weight: 1.0,
            pdfs: &pdfs,
            pixel: (1.5, 2.5),
            merge_radius: 0.01,
            dist_to_cam: 1.0,
        };
        let pilot = PilotCounts {
            num_light_paths: 16.0,
            num_connections: 1.0,
            merge_probability: 1.0,
        };
        est.add_sample(&sample, 1.0, &pilot, 1.0);
        est.prepare();
        assert!(est.to_layers().iter().all(|(_, img)| img.sum() == 0.0));
    }

    #[test]
    fn sample_lands_in_truncated_pixel_of_every_candidate() {
        let set = CandidateSet::new(16, &[1.0], &[0, 1]);
        let mut est = ProxyMomentEstimator::new(&set, EstimateFilter::Raw, 4, 4, false, true);
        let pdfs = BidirPathPdfs::new(vec![1.0, 2.0, 0.5], vec![0.5, 1.0, 1.0]);
        let sample = PathSample {
            contribution: [1.0, 2.0, 3.0],
            mis_weight: 0.5,
            pdfs: &pdfs,
            pixel: (1.7, 2.2),
            merge_radius: 0.05,
            dist_to_cam: 2.0,
        };
        let pilot = PilotCounts {
            num_light_paths: 16.0,
            num_connections: 1.0,
            merge_probability: 1.0,
        };
        est.add_sample(&sample, 1.0, &pilot, 1.0);
        est.prepare();

        let layers = est.to_layers();
        assert_eq!(layers.len(), set.len());
        for (name, img) in layers.iter() {
            assert!(img.get(1, 2) > 0.0, "candidate {name} has no moment");
            assert!(approx_eq!(f64, img.sum(), img.get(1, 2) as f64), "candidate {name} leaked");
        }

        // The candidate equal to the pilot sees the plain squared contribution.
        let pilot_candidate = layers.iter().find(|(n, _)| n == "n=000016,c=01,m=1").unwrap();
        assert!(pilot_candidate.1.get(1, 2) >= 1.0 - 1e-4);
    }

    proptest! {
        #[test]
        fn factor_is_finite_and_positive(
            pt in 0.01..1.0f32,
            con in 0.0..1.0f32,
            lt in 0.0..1.0f32,
            vm in 0.0..1.0f32,
            cov in 0.0..1.0f32,
            n in 0..5000u32,
            c in 0..16u32,
            m in any::<bool>(),
            pilot_n in 0.0..5000.0f32,
            pilot_c in 0.0..16.0f32,
            pilot_m in 0.0..1.0f32,
        ) {
            let w = ProxyWeights {
                path_tracing: pt,
                connections: con,
                light_tracing: lt,
                merges: vm,
                merges_correlated: vm * cov,
            };
            let pilot = PilotCounts {
                num_light_paths: pilot_n,
                num_connections: pilot_c,
                merge_probability: pilot_m,
            };
            let f = correction_factor(&w, &proxy(), &pilot, &Candidate::new(n, c, m));
            prop_assert!(f.is_finite() && f > 0.0);
        }

        #[test]
        fn factor_from_path_densities_is_finite_and_positive(
            c2l in proptest::collection::vec(prop_oneof![1 => Just(0.0f32), 4 => 0.05..20.0f32], 2..7),
            l2c in proptest::collection::vec(prop_oneof![1 => Just(0.0f32), 4 => 0.05..20.0f32], 7),
            radius in 1e-3..0.1f32,
            dist in 0.1..10.0f32,
            correlation_aware in any::<bool>(),
            n in 1..5000u32,
            c in 1..16u32,
            pilot_n in 1.0..5000.0f32,
            pilot_c in 0.5..16.0f32,
            pilot_m in 0.1..1.0f32,
        ) {
            let l2c = l2c[..c2l.len()].to_vec();
            let pdfs = BidirPathPdfs::new(c2l, l2c);
            let p = ProxyStrategy::new(128 * 128, false, correlation_aware);
            let w = ProxyWeights::compute(&pdfs, &p.pdf_ratio(&pdfs, dist), &p, radius);
            let total = w.total();
            prop_assert!((1.0 - 1e-3..=1.0 + 1e-3).contains(&total), "total {}", total);

            let pilot = PilotCounts {
                num_light_paths: pilot_n,
                num_connections: pilot_c,
                merge_probability: pilot_m,
            };
            let f = correction_factor(&w, &p, &pilot, &Candidate::new(n, c, true));
            prop_assert!(f.is_finite() && f > 0.0, "factor {} for {:?}", f, w);
        }
    }
}
