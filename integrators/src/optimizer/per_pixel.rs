//! Per-pixel candidate search.

use crate::candidate::*;
use crate::cost::*;
use common::image::ScalarImage;
use common::math::*;
use common::parallel::parallel_for;
use filters::*;

/// Decision masks produced by the per-pixel search.
#[derive(Clone, Debug, Default)]
pub struct DecisionMasks {
    /// Merge enable probability per pixel.
    pub merge: Option<ScalarImage>,

    /// Fractional connection count per pixel.
    pub connect: Option<ScalarImage>,
}

/// Settings of the per-pixel search.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PerPixelSettings {
    /// Produce a merge mask.
    pub per_pixel_merge: bool,

    /// Produce a connection mask.
    pub per_pixel_connect: bool,

    /// Post-filter for the merge mask.
    pub merge_filter: MaskFilter,

    /// Post-filter for the connection mask.
    pub connect_filter: MaskFilter,

    /// Number of worker threads, 0 for all cores.
    pub num_threads: usize,
}

/// Finds the candidate with the lowest `moment * cost` in every pixel and
/// extracts the requested per-pixel dimensions into masks. Ties go to the
/// candidate listed first. Pixels where the best value is exactly 0 get
/// every technique turned off. The masks are dilated and then blurred.
///
/// * `moments`  - Prepared moment buffers per candidate.
/// * `width`    - Image width.
/// * `height`   - Image height.
/// * `cost`     - The cost model.
/// * `settings` - Which masks to produce and how to filter them.
pub fn optimize_per_pixel(
    moments: &[(Candidate, Box<dyn FilteredEstimates>)],
    width: usize,
    height: usize,
    cost: &CostModel,
    settings: &PerPixelSettings,
) -> DecisionMasks {
    if !settings.per_pixel_merge && !settings.per_pixel_connect {
        return DecisionMasks::default();
    }
    assert!(!moments.is_empty(), "optimize_per_pixel(): no candidates");

    // Merging only costs something in pixels whose candidate merges.
    let costs: Vec<Float> = moments
        .iter()
        .map(|(c, _)| {
            let value = cost.evaluate_per_pixel(
                c.num_light_paths as Float,
                c.num_connections as Float,
                c.merge_probability(),
                !c.merge,
            );
            assert!(value.is_finite() && value > 0.0, "invalid cost {value} for {c}");
            value
        })
        .collect();

    let merge = settings.per_pixel_merge.then(|| ScalarImage::new(width, height));
    let connect = settings.per_pixel_connect.then(|| ScalarImage::new(width, height));

    parallel_for(height, settings.num_threads, |y| {
        for x in 0..width {
            let mut best_work = INFINITY;
            let mut best = Candidate::PATH_TRACING;
            for ((candidate, moment), &c) in moments.iter().zip(costs.iter()) {
                let work = moment.query(x, y) * c;
                if work < best_work {
                    best_work = work;
                    best = *candidate;
                }
            }

            // Black pixel: disable everything.
            if best_work == 0.0 {
                best = Candidate::PATH_TRACING;
            }

            if let Some(mask) = &merge {
                mask.set(x, y, best.merge_probability());
            }
            if let Some(mask) = &connect {
                mask.set(x, y, best.num_connections as Float);
            }
        }
    });

    let mut masks = DecisionMasks { merge, connect };
    if let Some(mask) = masks.merge.as_mut() {
        settings.merge_filter.apply(mask);
    }
    if let Some(mask) = masks.connect.as_mut() {
        settings.connect_filter.apply(mask);
    }
    masks
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(merge: bool, connect: bool) -> PerPixelSettings {
        PerPixelSettings {
            per_pixel_merge: merge,
            per_pixel_connect: connect,
            merge_filter: MaskFilter::identity(),
            connect_filter: MaskFilter::identity(),
            num_threads: 2,
        }
    }

    fn buffer(values: &[Float], w: usize, h: usize) -> Box<dyn FilteredEstimates> {
        Box::new(RawEstimates::from_image(ScalarImage::from_values(values, w, h)))
    }

    #[test]
    fn no_masks_requested_returns_none() {
        let moments = vec![(Candidate::PATH_TRACING, buffer(&[1.0], 1, 1))];
        let masks = optimize_per_pixel(&moments, 1, 1, &CostModel::default(), &settings(false, false));
        assert!(masks.merge.is_none() && masks.connect.is_none());
    }

    #[test]
    fn black_pixels_turn_everything_off() {
        let moments = vec![
            (Candidate::new(10, 4, true), buffer(&[0.0, 0.0], 2, 1)),
            (Candidate::PATH_TRACING, buffer(&[0.0, 5.0], 2, 1)),
            (Candidate::new(10, 8, true), buffer(&[0.0, 1.0], 2, 1)),
        ];
        let masks = optimize_per_pixel(&moments, 2, 1, &CostModel::default(), &settings(true, true));
        let merge = masks.merge.unwrap();
        let connect = masks.connect.unwrap();

        // Pixel 0 is black under every candidate.
        assert_eq!(merge.get(0, 0), 0.0);
        assert_eq!(connect.get(0, 0), 0.0);

        // Pixel 1 has a zero moment for the first candidate, which also
        // makes the best work 0.
        assert_eq!(merge.get(1, 0), 0.0);
        assert_eq!(connect.get(1, 0), 0.0);
    }

    #[test]
    fn lowest_work_candidate_sets_the_masks() {
        let moments = vec![
            (Candidate::PATH_TRACING, buffer(&[100.0, 1.0], 2, 1)),
            (Candidate::new(10, 2, true), buffer(&[1.0, 100.0], 2, 1)),
        ];
        let masks = optimize_per_pixel(&moments, 2, 1, &CostModel::default(), &settings(true, true));
        let merge = masks.merge.unwrap();
        let connect = masks.connect.unwrap();
        assert_eq!((merge.get(0, 0), connect.get(0, 0)), (1.0, 2.0));
        assert_eq!((merge.get(1, 0), connect.get(1, 0)), (0.0, 0.0));
    }
}
