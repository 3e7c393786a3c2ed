//! Per-image candidate search.

use super::outliers::*;
use crate::candidate::*;
use crate::cost::*;
use crate::knobs::*;
use common::image::ScalarImage;
use common::math::*;
use common::parallel::{parallel_for, AtomicFloat};
use filters::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Pixels whose merge probability exceeds this value count as merging.
pub const MERGE_DECISION_THRESHOLD: Float = 0.1;

/// Settings of the per-image search.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PerImageSettings {
    /// Connections are controlled by a per-pixel mask.
    pub per_pixel_connect: bool,

    /// Merging is controlled by a per-pixel mask.
    pub per_pixel_merge: bool,

    /// Number of worker threads, 0 for all cores.
    pub num_threads: usize,
}

/// Outcome of the per-image search.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PerImageDecision {
    /// Number of light subpaths per iteration.
    pub num_light_paths: u32,

    /// Global connection count, `None` if controlled per pixel.
    pub num_connections: Option<u32>,

    /// Global merge decision, `None` if controlled per pixel.
    pub merge: Option<bool>,

    /// Relative moment times cost of the chosen bucket.
    pub work: f64,

    /// Number of rejected per-pixel contributions.
    pub num_outliers: usize,
}

impl PerImageDecision {
    /// Returns the chosen bucket.
    pub fn candidate(&self) -> GlobalCandidate {
        GlobalCandidate {
            num_light_paths: self.num_light_paths,
            num_connections: self.num_connections.map_or(Dimension::PerPixel, Dimension::Fixed),
            merge: self.merge.map_or(Dimension::PerPixel, Dimension::Fixed),
        }
    }
}

/// Picks the global light path count, and connection count and merge
/// decision where those are not controlled per pixel, by minimizing the
/// product of summed relative moments and summed costs over the image.
///
/// In each pixel only candidates that agree with the per-pixel masks
/// contribute; path tracing always does. Black reference pixels are
/// skipped. Relative moments above a per-candidate threshold are rejected.
/// Sums and thresholds use the unfiltered per-pixel moments, so a firefly
/// is rejected as one pixel instead of being spread over its neighborhood.
///
/// * `moments`           - Moment buffers per candidate.
/// * `reference`         - Denoised reference intensity.
/// * `connection_counts` - Ascending connection count options.
/// * `cost`              - The cost model.
/// * `knobs`             - Current sampling knobs, read for per-pixel decisions.
/// * `settings`          - Which dimensions are per pixel.
pub fn optimize_per_image(
    moments: &[(Candidate, Box<dyn FilteredEstimates>)],
    reference: &ScalarImage,
    connection_counts: &[u32],
    cost: &CostModel,
    knobs: &SamplingKnobs,
    settings: &PerImageSettings,
) -> PerImageDecision {
    assert!(!moments.is_empty(), "optimize_per_image(): no candidates");

    let width = reference.width();
    let height = reference.height();
    let num_pixels = reference.num_pixels();
    let per_pixel_connect = settings.per_pixel_connect;
    let per_pixel_merge = settings.per_pixel_merge;

    // Buckets in first-seen order, path tracing first.
    let mut buckets: Vec<GlobalCandidate> = Vec::new();
    let bucket_of: Vec<usize> = moments
        .iter()
        .map(|(c, _)| {
            let g = GlobalCandidate::project(c, per_pixel_connect, per_pixel_merge);
            buckets.iter().position(|&b| b == g).unwrap_or_else(|| {
                buckets.push(g);
                buckets.len() - 1
            })
        })
        .collect();

    // The photon map is built whenever some pixel may merge.
    let merges_anywhere = knobs.merges_anywhere(MERGE_DECISION_THRESHOLD);
    let costs: Vec<Float> = moments
        .iter()
        .map(|(c, _)| {
            let disable_merge = if per_pixel_merge { !merges_anywhere } else { !c.merge };
            let value = cost.evaluate_per_pixel(
                c.num_light_paths as Float,
                c.num_connections as Float,
                c.merge_probability(),
                disable_merge,
            );
            assert!(value.is_finite() && value > 0.0, "invalid cost {value} for {c}");
            value
        })
        .collect();

    let thresholds: Vec<AtomicFloat> = (0..moments.len()).map(|_| AtomicFloat::new(INFINITY)).collect();
    parallel_for(moments.len(), settings.num_threads, |i| {
        let moment = &moments[i].1;
        let mut values = Vec::with_capacity(num_pixels);
        for y in 0..height {
            for x in 0..width {
                let mean = reference.get(x, y);
                if mean != 0.0 {
                    values.push(moment.unfiltered(x, y) / (mean * mean));
                }
            }
        }
        thresholds[i].set(outlier_threshold(&mut values, num_pixels));
    });
    let thresholds: Vec<Float> = thresholds.iter().map(|t| t.get()).collect();

    // Per-pixel averages keep the sums resolution independent.
    let recip_num_pixels = 1.0 / num_pixels as f64;
    let num_outliers = AtomicUsize::new(0);
    let totals = Mutex::new((vec![0.0_f64; buckets.len()], vec![0.0_f64; buckets.len()]));

    parallel_for(height, settings.num_threads, |y| {
        let mut line_moments = vec![0.0_f64; buckets.len()];
        let mut line_costs = vec![0.0_f64; buckets.len()];

        for x in 0..width {
            let mean = reference.get(x, y);
            if mean == 0.0 {
                continue;
            }
            let recip_mean_sqr = 1.0 / (mean * mean);

            let merge_decision = knobs.merge_probability(x, y) > MERGE_DECISION_THRESHOLD;
            let connect_decision = round_up_to_candidate(connection_counts, knobs.connection_count(x, y));

            for (i, (candidate, moment)) in moments.iter().enumerate() {
                if !candidate.is_path_tracing()
                    && ((per_pixel_merge && candidate.merge != merge_decision)
                        || (per_pixel_connect && candidate.num_connections != connect_decision))
                {
                    continue;
                }

                let mut rel_moment = moment.unfiltered(x, y) * recip_mean_sqr;
                if rel_moment > thresholds[i] {
                    rel_moment = 0.0;
                    num_outliers.fetch_add(1, Ordering::Relaxed);
                }

                let b = bucket_of[i];
                line_moments[b] += rel_moment as f64 * recip_num_pixels;
                line_costs[b] += costs[i] as f64 * recip_num_pixels;
            }
        }

        match totals.lock() {
            Ok(mut totals) => {
                let (moment_sums, cost_sums) = &mut *totals;
                for (b, (m, c)) in line_moments.iter().zip(line_costs.iter()).enumerate() {
                    moment_sums[b] += m;
                    cost_sums[b] += c;
                }
            }
            Err(e) => error!("Row {y} not accumulated: {e}"),
        }
    });

    let num_outliers = num_outliers.into_inner();
    if num_outliers as f64 > num_pixels as f64 * OUTLIER_WARNING_FRACTION {
        warn!(
            "Rejected {} outliers, which is more than {}% of all pixels",
            num_outliers,
            OUTLIER_WARNING_FRACTION * 100.0
        );
    }

    let (moment_sums, cost_sums) = match totals.into_inner() {
        Ok(totals) => totals,
        Err(e) => e.into_inner(),
    };

    let mut best_work = f64::INFINITY;
    let mut best = GlobalCandidate::PATH_TRACING;
    for (b, bucket) in buckets.iter().enumerate() {
        let work = moment_sums[b] * cost_sums[b];
        debug!("{bucket}: moment {:.6e} cost {:.4} work {:.6e}", moment_sums[b], cost_sums[b], work);
        if work < best_work {
            best_work = work;
            best = *bucket;
        }
    }

    PerImageDecision {
        num_light_paths: best.num_light_paths,
        num_connections: if per_pixel_connect { None } else { best.num_connections.fixed() },
        merge: if per_pixel_merge { None } else { best.merge.fixed() },
        work: best_work,
        num_outliers,
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
